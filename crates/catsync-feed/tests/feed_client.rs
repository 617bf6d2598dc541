//! Integration tests for `FeedClient::fetch` against a local `wiremock`
//! server, plus an end-to-end fetch → parse → map pass.

use catsync_core::{PriceTypeCode, ProductTypeId};
use catsync_feed::{parse_feed, CatalogMapper, FeedClient, FetchError};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<catalog>
  <categories>
    <category id="1">Doors</category>
    <category id="2" parentId="1">Interior</category>
  </categories>
  <offers>
    <offer id="D-1" categoryId="2">
      <name>Oak door</name>
      <stock>3</stock>
      <price type="1">1500</price>
    </offer>
  </offers>
</catalog>"#;

fn test_client() -> FeedClient {
    FeedClient::new(5, "catsync-test/0.1", 0, 0).expect("failed to build test FeedClient")
}

fn test_client_with_retries(max_retries: u32) -> FeedClient {
    FeedClient::new(5, "catsync-test/0.1", max_retries, 0).expect("failed to build test FeedClient")
}

#[tokio::test]
async fn fetch_returns_body_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export/doors.xml"))
        .and(header("user-agent", "catsync-test/0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED_XML))
        .mount(&server)
        .await;

    let url = format!("{}/export/doors.xml", server.uri());
    let body = test_client().fetch(&url).await.expect("fetch should succeed");
    assert_eq!(body, FEED_XML.as_bytes());
}

#[tokio::test]
async fn fetched_feed_parses_and_maps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED_XML))
        .mount(&server)
        .await;

    let body = test_client()
        .fetch(&format!("{}/export", server.uri()))
        .await
        .unwrap();
    let product_type = ProductTypeId::new(1).unwrap();
    let parsed = parse_feed(&body, product_type, None).unwrap();
    let mapped = CatalogMapper::new([PriceTypeCode::new(1)], "UAH")
        .map(&parsed)
        .unwrap();

    assert_eq!(mapped.categories.len(), 2);
    assert_eq!(mapped.products.len(), 1);
    assert_eq!(mapped.products[0].category_path.to_string(), "1.2");
    assert_eq!(mapped.products[0].prices[0].currency, "UAH");
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = test_client_with_retries(3)
        .fetch(&format!("{}/missing", server.uri()))
        .await;
    assert!(
        matches!(result, Err(FetchError::NotFound { .. })),
        "expected NotFound, got: {result:?}"
    );
}

#[tokio::test]
async fn forbidden_maps_to_unexpected_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let result = test_client_with_retries(3).fetch(&server.uri()).await;
    assert!(
        matches!(result, Err(FetchError::UnexpectedStatus { status: 403, .. })),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn server_errors_are_retried_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let result = test_client_with_retries(2).fetch(&server.uri()).await;
    assert!(
        matches!(result, Err(FetchError::ServerError { status: 503, .. })),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn rate_limit_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let body = test_client_with_retries(1).fetch(&server.uri()).await.unwrap();
    assert_eq!(body, b"{}");
}
