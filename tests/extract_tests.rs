use http::Method;
use routewire::{
    responds, Body, HeaderBag, Headers, Middleware, OptBody, OptPath, Path, Payload, RawRequest,
    Router, Shared, Status,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing_util::TestTracing;

#[derive(Debug, Clone, Default, Deserialize)]
struct AuthHeaders {
    #[serde(rename = "x-token")]
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct PetInput {
    name: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Pet {
    name: String,
    tags: Vec<String>,
}

responds!(Pet);

#[test]
fn test_headers_decode_once_and_are_shared() {
    let _tracing = TestTracing::init();
    let seen = Arc::new(AtomicUsize::new(0));

    let observe = {
        let seen = seen.clone();
        move |HeaderBag(auth): HeaderBag<AuthHeaders>| {
            if auth.borrow().token.is_some() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        }
    };
    let stamp = |HeaderBag(auth): HeaderBag<AuthHeaders>| {
        auth.borrow_mut().token.get_or_insert_with(|| "anon".into());
    };

    let mut router = Router::new();
    router
        .with(Middleware::new().before(stamp))
        .with(Middleware::new().before(observe))
        .get("/whoami", |HeaderBag(auth): HeaderBag<AuthHeaders>| {
            let token = auth.borrow().token.clone().unwrap_or_default();
            if token == "anon" {
                Status(401)
            } else {
                Status(200)
            }
        });

    // no header: the first middleware stamps "anon", everyone sees it
    let response = router.handle(RawRequest::new(Method::GET, "/whoami"));
    assert_eq!(response.status, 401);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    let response = router.handle(RawRequest::new(Method::GET, "/whoami").with_header("X-Token", "abc"));
    assert_eq!(response.status, 200);
}

#[test]
fn test_untyped_headers_see_middleware_edits() {
    let stamp = |HeaderBag(bag): HeaderBag<Headers>| {
        bag.borrow_mut().insert("x-request-id", "7");
    };

    let mut router = Router::new();
    router
        .with(Middleware::new().before(stamp))
        .get("/trace", |headers: Headers| {
            Status(if headers.get("x-request-id") == Some("7") {
                200
            } else {
                500
            })
        });

    let response = router.handle(RawRequest::new(Method::GET, "/trace"));
    assert_eq!(response.status, 200);

    // the generic bag has no named fields to document
    let endpoint = router
        .docs()
        .endpoint(&Method::GET, "/trace")
        .expect("documented endpoint");
    assert!(endpoint.header_types.is_empty());
}

#[test]
fn test_body_mutation_is_visible_downstream() {
    let normalize = |Body(pet): Body<PetInput>| {
        let mut pet = pet.borrow_mut();
        pet.name = pet.name.to_ascii_lowercase();
    };

    let mut router = Router::new();
    router
        .with(Middleware::new().before(normalize))
        .post("/pets", |Body(pet): Body<PetInput>| {
            let pet = pet.borrow();
            Pet {
                name: pet.name.clone(),
                tags: pet.tags.clone(),
            }
        });

    let raw = RawRequest::new(Method::POST, "/pets").with_json(&PetInput {
        name: "REX".into(),
        tags: vec!["good".into()],
    });
    let response = router.handle(raw);
    assert_eq!(response.status, 200);
    assert_eq!(response.body.unwrap()["name"], "rex");
}

#[test]
fn test_optional_path_param_absent_is_none() {
    let mut router = Router::new();
    router.get("/pets/{id}", |OptPath(id): OptPath<u32>| {
        Status(if id.is_some() { 200 } else { 204 })
    });

    // matched through the router, the segment is always present
    let response = router.handle(RawRequest::new(Method::GET, "/pets/5"));
    assert_eq!(response.status, 200);

    // a host server may match a broader pattern and omit the segment
    let route = router
        .route(&Method::GET, "/pets/{id}")
        .expect("registered route");
    let response = route.handle(RawRequest::new(Method::GET, "/pets"));
    assert_eq!(response.status, 204);
}

#[test]
fn test_unparsable_required_path_param_is_404() {
    let mut router = Router::new();
    router.get("/pets/{id}", |Path(_id): Path<u32>| Status(200));

    let response = router.handle(RawRequest::new(Method::GET, "/pets/rex"));
    assert_eq!(response.status, 404);
    let body = response.body.expect("default error body");
    assert_eq!(body["success"], serde_json::json!(false));
    assert!(body["message"].as_str().unwrap().contains("'id'"));
}

#[test]
fn test_optional_body_tolerates_an_empty_request() {
    let mut router = Router::new();
    router.post("/pets/search", |OptBody(input): OptBody<PetInput>| {
        Status(if input.borrow().is_some() { 200 } else { 204 })
    });

    let response = router.handle(RawRequest::new(Method::POST, "/pets/search"));
    assert_eq!(response.status, 204);

    let raw = RawRequest::new(Method::POST, "/pets/search").with_json(&PetInput::default());
    assert_eq!(router.handle(raw).status, 200);
}

#[test]
fn test_payload_category_follows_the_method() {
    let list = |Payload(input): Payload<PetInput>| Pet {
        name: input.borrow().name.clone(),
        tags: Vec::new(),
    };
    let create = |Payload(input): Payload<PetInput>| Pet {
        name: input.borrow().name.clone(),
        tags: Vec::new(),
    };

    let mut router = Router::new();
    router.get("/pets", list);
    router.post("/pets", create);

    let response = router.handle(RawRequest::new(Method::GET, "/pets?name=rex"));
    assert_eq!(response.body.unwrap()["name"], "rex");

    let raw = RawRequest::new(Method::POST, "/pets").with_json(&PetInput {
        name: "bella".into(),
        tags: Vec::new(),
    });
    let response = router.handle(raw);
    assert_eq!(response.body.unwrap()["name"], "bella");
}

#[test]
fn test_shared_value_flows_from_producer_to_consumer() {
    #[derive(Debug, Clone, Default)]
    struct Caller {
        id: u32,
    }

    let identify = || routewire::Provide(Caller { id: 42 });

    let mut router = Router::new();
    router
        .with(Middleware::new().before(identify))
        .get("/me", |caller: Shared<Caller>| Status(200 + caller.borrow().id as u16));

    let response = router.handle(RawRequest::new(Method::GET, "/me"));
    assert_eq!(response.status, 242);
}
