use http::Method;
use routewire::{responds, Headers, Path, Query, RawRequest, Router, Status};
use serde::{Deserialize, Serialize};

use tracing_util::TestTracing;

#[derive(Debug, Default, Deserialize)]
struct ShopQuery {
    search: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Shop {
    name: String,
    search: Option<String>,
    limit: u32,
}

responds!(Shop);

#[derive(Debug, Serialize)]
struct Created {
    id: u32,
}

responds!(Created, default_status = 201);

fn get_shop(Path(name): Path<String>, Query(query): Query<ShopQuery>) -> Shop {
    let query = query.borrow();
    Shop {
        name,
        search: query.search.clone(),
        limit: query.limit.unwrap_or(10),
    }
}

#[test]
fn test_route_builds_json_from_path_and_query() {
    let _tracing = TestTracing::init();
    let mut router = Router::new();
    router.get("/shop/{name}/", get_shop);

    let response = router.handle(RawRequest::new(
        Method::GET,
        "/shop/corner/?search=tea&limit=3",
    ));
    assert_eq!(response.status, 200);
    let body = response.body.expect("json body");
    assert_eq!(body["name"], "corner");
    assert_eq!(body["search"], "tea");
    assert_eq!(body["limit"], 3);
}

#[test]
fn test_status_only_handler_sends_empty_body() {
    let mut router = Router::new();
    router.delete("/shop/{name}", |Path(_name): Path<String>| Status(204));

    let response = router.handle(RawRequest::new(Method::DELETE, "/shop/corner"));
    assert_eq!(response.status, 204);
    assert!(response.body.is_none());
}

#[test]
fn test_response_type_default_status_applies() {
    let mut router = Router::new();
    router.post("/shop", || Created { id: 7 });

    let response = router.handle(RawRequest::new(Method::POST, "/shop"));
    assert_eq!(response.status, 201);
    assert_eq!(response.body.unwrap()["id"], 7);
}

#[test]
fn test_returned_headers_merge_into_the_response() {
    let mut router = Router::new();
    router.get("/cached", || {
        let mut headers = Headers::new();
        headers.insert("Cache-Control", "max-age=60");
        (Status(200), headers)
    });

    let response = router.handle(RawRequest::new(Method::GET, "/cached"));
    assert_eq!(response.status, 200);
    assert_eq!(
        response.headers.get("cache-control").map(String::as_str),
        Some("max-age=60")
    );
}

#[test]
fn test_status_return_overrides_the_response_default() {
    let mut router = Router::new();
    router.post("/shop/maybe", || (Status(202), Created { id: 1 }));

    let response = router.handle(RawRequest::new(Method::POST, "/shop/maybe"));
    assert_eq!(response.status, 202);
    assert_eq!(response.body.unwrap()["id"], 1);
}

#[test]
fn test_unmatched_path_is_a_bare_404() {
    let mut router = Router::new();
    router.get("/shop/{name}", get_shop);

    let response = router.handle(RawRequest::new(Method::GET, "/nothing/here"));
    assert_eq!(response.status, 404);
    assert!(response.body.is_none());
}
