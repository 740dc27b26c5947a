use http::Method;
use routewire::{Body, Middleware, RawRequest, Router, Status};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use tracing_util::TestTracing;

#[derive(Debug, Error)]
#[error("refused")]
struct Refused;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn record(log: &Log, entry: &'static str) {
    log.lock().unwrap().push(entry);
}

/// A middleware whose before/after units append to the log; `fail_before`
/// makes the before unit return an error.
fn traced(log: &Log, before: &'static str, after: &'static str, fail_before: bool) -> Middleware {
    let mut mw = Middleware::new();
    if !before.is_empty() {
        let log = log.clone();
        if fail_before {
            mw = mw.before(move || -> Result<(), Refused> {
                record(&log, before);
                Err(Refused)
            });
        } else {
            mw = mw.before(move || record(&log, before));
        }
    }
    if !after.is_empty() {
        let log = log.clone();
        mw = mw.after(move || record(&log, after));
    }
    mw
}

fn run(router: &Router, method: Method, path: &str) -> u16 {
    router.handle(RawRequest::new(method, path)).status
}

#[test]
fn test_chain_order_brackets_the_target() {
    let _tracing = TestTracing::init();
    let log: Log = Arc::default();

    let mut router = Router::new();
    router
        .with(traced(&log, "b1", "a1", false))
        .with(traced(&log, "b2", "a2", false))
        .get("/ordered", {
            let log = log.clone();
            move || record(&log, "target")
        });

    assert_eq!(run(&router, Method::GET, "/ordered"), 200);
    assert_eq!(*log.lock().unwrap(), vec!["b1", "b2", "target", "a2", "a1"]);
}

#[test]
fn test_failing_before_skips_target_but_runs_scheduled_cleanup() {
    let log: Log = Arc::default();

    let mut router = Router::new();
    router
        .with(traced(&log, "b1", "a1", false))
        .with(traced(&log, "b2", "a2", true))
        .get("/guarded", {
            let log = log.clone();
            move || record(&log, "target")
        });

    assert_eq!(run(&router, Method::GET, "/guarded"), 500);
    assert_eq!(*log.lock().unwrap(), vec!["b1", "b2", "a2", "a1"]);
}

#[test]
fn test_failing_before_never_wakes_later_middlewares() {
    let log: Log = Arc::default();

    let mut router = Router::new();
    router
        .with(traced(&log, "b1", "a1", true))
        .with(traced(&log, "", "a2", false))
        .get("/guarded", {
            let log = log.clone();
            move || record(&log, "target")
        });

    // b1 fails before the second middleware ever ran, so a2 must not run
    assert_eq!(run(&router, Method::GET, "/guarded"), 500);
    assert_eq!(*log.lock().unwrap(), vec!["b1", "a1"]);
}

#[test]
fn test_failing_before_without_cleanup_aborts_the_chain() {
    let log: Log = Arc::default();

    let mut router = Router::new();
    router
        .with(traced(&log, "b1", "", true))
        .get("/guarded", {
            let log = log.clone();
            move || record(&log, "target")
        });

    assert_eq!(run(&router, Method::GET, "/guarded"), 500);
    assert_eq!(*log.lock().unwrap(), vec!["b1"]);
}

#[test]
fn test_failing_target_still_runs_every_after() {
    let log: Log = Arc::default();

    let mut router = Router::new();
    router
        .with(traced(&log, "b1", "a1", false))
        .with(traced(&log, "", "a2", false))
        .get("/flaky", {
            let log = log.clone();
            move || -> Result<(), Refused> {
                record(&log, "target");
                Err(Refused)
            }
        });

    assert_eq!(run(&router, Method::GET, "/flaky"), 500);
    assert_eq!(*log.lock().unwrap(), vec!["b1", "target", "a2", "a1"]);
}

#[test]
fn test_panicking_after_lets_remaining_afters_run() {
    let log: Log = Arc::default();

    let panicking = Middleware::new().after(|| -> () { panic!("cleanup blew up") });

    let mut router = Router::new();
    router
        .with(traced(&log, "b1", "a1", false))
        .with(panicking)
        .get("/fragile", {
            let log = log.clone();
            move || record(&log, "target")
        });

    assert_eq!(run(&router, Method::GET, "/fragile"), 500);
    assert_eq!(*log.lock().unwrap(), vec!["b1", "target", "a1"]);
}

static MANIFEST_DECODES: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
struct Manifest {
    tag: String,
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Fields {
            tag: String,
        }
        MANIFEST_DECODES.fetch_add(1, Ordering::SeqCst);
        Fields::deserialize(deserializer).map(|f| Manifest { tag: f.tag })
    }
}

#[test]
fn test_cached_body_survives_recovery_reentry() {
    let observed = Arc::new(Mutex::new(String::new()));

    let audit = {
        let observed = observed.clone();
        Middleware::new().after(move |Body(manifest): Body<Manifest>| {
            *observed.lock().unwrap() = manifest.borrow().tag.clone();
        })
    };
    let annotate = Middleware::new().before(|Body(manifest): Body<Manifest>| {
        manifest.borrow_mut().tag.push_str("-seen");
    });

    let mut router = Router::new();
    router
        .with(audit)
        .with(annotate)
        .post("/manifests", |Body(_): Body<Manifest>| -> Result<(), Refused> {
            Err(Refused)
        });

    let raw = RawRequest::new(Method::POST, "/manifests").with_body(r#"{"tag":"base"}"#);
    assert_eq!(router.handle(raw).status, 500);

    // the recovery path re-enters via the after unit, which must read the
    // mutated cell rather than decode the body a second time
    assert_eq!(*observed.lock().unwrap(), "base-seen");
    assert_eq!(MANIFEST_DECODES.load(Ordering::SeqCst), 1);
}

#[test]
fn test_after_middleware_can_rebind_the_status() {
    let mut router = Router::new();
    router
        .with(Middleware::new().after(|| Status(203)))
        .get("/rewritten", || Status(200));

    assert_eq!(run(&router, Method::GET, "/rewritten"), 203);
}

#[test]
fn test_middleware_is_scoped_to_its_group() {
    let log: Log = Arc::default();

    let mut router = Router::new();
    {
        let mut admin = router.group("/admin");
        admin.with(traced(&log, "guard", "", false));
        admin.get("/panel", || Status(200));
    }
    router.get("/public", || Status(200));

    assert_eq!(run(&router, Method::GET, "/admin/panel"), 200);
    assert_eq!(*log.lock().unwrap(), vec!["guard"]);

    assert_eq!(run(&router, Method::GET, "/public"), 200);
    assert_eq!(*log.lock().unwrap(), vec!["guard"]);
}
