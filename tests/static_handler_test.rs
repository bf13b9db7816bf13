mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{pipeline, FakeStore, MTIME_MILLIS};
use tunnelweb::{validator::etag, Flow, HttpRequestMethod, Request, Response};

fn get(url: &str) -> Request {
    Request::new(HttpRequestMethod::Get, url, 0)
}

async fn respond(router: &tunnelweb::Router, mut request: Request) -> Response {
    match router.dispatch(&mut request).await {
        Flow::Respond(r) => r,
        other => panic!("Expected a response for {}, got {:?}", request.url(), other),
    }
}

#[tokio::test]
async fn test_other_methods_pass_through() {
    let store = Arc::new(FakeStore::new());
    let (router, cache) = pipeline(store.clone());

    for method in [
        HttpRequestMethod::Post,
        HttpRequestMethod::Put,
        HttpRequestMethod::Delete,
        HttpRequestMethod::Options,
        HttpRequestMethod::Patch,
    ] {
        let mut request = Request::new(method, "/static/app.css", 0);
        assert!(matches!(router.dispatch(&mut request).await, Flow::Next));
    }
    assert_eq!(store.reads(), 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_parent_segments_are_forbidden() {
    let store = Arc::new(FakeStore::new());
    let (router, _) = pipeline(store.clone());

    for url in ["/static/../secret", "/..", "/static/a/..%2fapp.css", "//static//..//app.css"] {
        let response = respond(&router, get(url)).await;
        assert_eq!(response.status_code(), 403, "{}", url);
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.content().unwrap().as_ref(), b"Forbidden");
    }
    assert_eq!(store.reads(), 0);
}

#[tokio::test]
async fn test_head_with_parent_segment_is_forbidden() {
    let (router, _) = pipeline(Arc::new(FakeStore::new()));
    let request = Request::new(HttpRequestMethod::Head, "/static/../app.css", 0);
    assert_eq!(respond(&router, request).await.status_code(), 403);
}

#[tokio::test]
async fn test_unknown_path_passes_through() {
    let store = Arc::new(FakeStore::new());
    let (router, _) = pipeline(store.clone());

    let mut request = get("/static/missing.css");
    assert!(matches!(router.dispatch(&mut request).await, Flow::Next));
    assert_eq!(store.reads(), 0);
}

#[tokio::test]
async fn test_first_request_sets_validators() {
    let (router, _) = pipeline(Arc::new(FakeStore::new()));
    let response = respond(&router, get("/static/app.css")).await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("ETag"), Some(format!("10-{}", MTIME_MILLIS).as_str()));
    assert_eq!(response.header("Content-Type"), Some("text/css; charset=UTF-8"));
    assert_eq!(response.header("Content-Length"), Some("10"));
    assert_eq!(response.header("Last-Modified"), Some("Tue, 14 Nov 2023 22:13:20 GMT"));
    assert_eq!(response.header("Cache-Control"), Some("public max-age=0"));
    assert_eq!(response.content().unwrap().as_ref(), b"1234567890");
}

#[tokio::test]
async fn test_etag_depends_only_on_length_and_mtime() {
    let store = Arc::new(FakeStore::new());
    let (router, cache) = pipeline(store.clone());

    let first = respond(&router, get("/static/app.css")).await;
    cache.clear(None);
    let second = respond(&router, get("/static/app.css")).await;

    let expected = etag(10, FakeStore::mtime());
    assert_eq!(first.header("ETag"), Some(expected.as_str()));
    assert_eq!(second.header("ETag"), Some(expected.as_str()));
    assert_eq!(store.reads(), 2);
}

#[tokio::test]
async fn test_revalidation_returns_not_modified() {
    let store = Arc::new(FakeStore::new());
    let (router, _) = pipeline(store.clone());

    let first = respond(&router, get("/static/app.css")).await;
    let tag = first.header("ETag").unwrap().to_string();

    let second = respond(&router, get("/static/app.css").with_header("If-None-Match", &tag)).await;
    assert_eq!(second.status_code(), 304);
    assert!(second.content().is_none());
    assert!(second
        .headers()
        .iter()
        .all(|(name, _)| !name.starts_with("Content")));
    assert_eq!(second.header("ETag"), Some(tag.as_str()));
    assert_eq!(second.header("Cache-Control"), Some("public max-age=0"));
    // 第二次从缓存返回
    assert_eq!(store.reads(), 1);
}

#[tokio::test]
async fn test_stale_etag_gets_full_response() {
    let (router, _) = pipeline(Arc::new(FakeStore::new()));
    let response =
        respond(&router, get("/static/app.css").with_header("If-None-Match", "10-1")).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.content().unwrap().len(), 10);
}

#[tokio::test]
async fn test_if_modified_since_revalidation() {
    let (router, _) = pipeline(Arc::new(FakeStore::new()));

    let fresh = get("/static/app.css").with_header("If-Modified-Since", "Tue, 14 Nov 2023 22:13:20 GMT");
    assert_eq!(respond(&router, fresh).await.status_code(), 304);

    let older = get("/static/app.css").with_header("If-Modified-Since", "Mon, 13 Nov 2023 00:00:00 GMT");
    assert_eq!(respond(&router, older).await.status_code(), 200);

    let garbage = get("/static/app.css").with_header("If-Modified-Since", "yesterday-ish");
    assert_eq!(respond(&router, garbage).await.status_code(), 200);
}

#[tokio::test]
async fn test_force_update_never_returns_not_modified() {
    let mut fake = FakeStore::new();
    fake.options.force_update = true;
    let (router, _) = pipeline(Arc::new(fake));

    let first = respond(&router, get("/static/app.css")).await;
    let tag = first.header("ETag").unwrap().to_string();
    let modified = first.header("Last-Modified").unwrap().to_string();
    assert_ne!(modified, "Tue, 14 Nov 2023 22:13:20 GMT");

    let second = respond(
        &router,
        get("/static/app.css")
            .with_header("If-None-Match", &tag)
            .with_header("If-Modified-Since", &modified),
    )
    .await;
    assert_eq!(second.status_code(), 200);
    assert_eq!(second.content().unwrap().as_ref(), b"1234567890");
}

#[tokio::test]
async fn test_cache_disabled_reads_every_time() {
    let mut fake = FakeStore::new();
    fake.options.cache = false;
    let store = Arc::new(fake);
    let (router, cache) = pipeline(store.clone());

    respond(&router, get("/static/app.css")).await;
    respond(&router, get("/static/app.css")).await;
    assert_eq!(store.reads(), 2);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_max_age_in_cache_control() {
    let mut fake = FakeStore::new();
    fake.options.max_age = 3_600_000;
    let (router, _) = pipeline(Arc::new(fake));
    let response = respond(&router, get("/static/app.js")).await;
    assert_eq!(response.header("Cache-Control"), Some("public max-age=3600"));
    assert_eq!(response.header("Content-Type"), Some("text/javascript; charset=UTF-8"));
}

#[tokio::test]
async fn test_head_omits_body() {
    let (router, _) = pipeline(Arc::new(FakeStore::new()));
    let response = respond(&router, Request::new(HttpRequestMethod::Head, "/static/app.css", 0)).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("Content-Length"), Some("10"));
    assert!(response.content().is_none());
}

#[tokio::test]
async fn test_duplicate_slashes_are_collapsed() {
    let (router, cache) = pipeline(Arc::new(FakeStore::new()));
    let response = respond(&router, get("//static///app.css")).await;
    assert_eq!(response.status_code(), 200);
    assert!(cache.contains("/static/app.css"));
}

#[tokio::test]
async fn test_store_failure_is_reported_downstream() {
    let mut fake = FakeStore::new();
    fake.fail_reads = true;
    let store = Arc::new(fake);
    let (router, cache) = pipeline(store.clone());

    let mut request = get("/static/app.css");
    match router.dispatch(&mut request).await {
        Flow::Fail(e) => assert_eq!(e.status_code(), 500),
        other => panic!("Expected a failure, got {:?}", other),
    }
    assert!(cache.is_empty());
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);
}
