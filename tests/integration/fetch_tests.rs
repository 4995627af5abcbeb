//! Retry protocol against a misbehaving server

use sitesnap::config::{RetryConfig, UserAgentConfig};
use sitesnap::crawler::{build_http_client, FetchOutcome, FetchRetry, RateLimiter, RetryPolicy};
use std::time::{Duration, Instant};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_fetcher(max_retries: u32) -> FetchRetry {
    let retry = RetryConfig {
        max_retries,
        backoff_unit_ms: 10,
        jitter_ms: 0,
        ..RetryConfig::default()
    };
    FetchRetry::new(
        build_http_client(&UserAgentConfig::default()).unwrap(),
        RetryPolicy::from_config(&retry),
        retry.soft_block_markers.clone(),
        Duration::from_secs(5),
    )
}

fn page_url(server: &MockServer, page: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), page)).unwrap()
}

#[tokio::test]
async fn test_retry_after_is_honored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy/"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html"))
        .mount(&server)
        .await;

    let fetcher = create_test_fetcher(5);
    let limiter = RateLimiter::new("page", 100.0);
    let started = Instant::now();
    let outcome = fetcher
        .fetch(&page_url(&server, "/busy/"), &limiter)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    match outcome {
        FetchOutcome::Success(page) => assert_eq!(page.status, 200),
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_soft_block_is_retried_then_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blocked/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><h1>429 Too Many Requests</h1></html>",
            "text/html",
        ))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = create_test_fetcher(3);
    let limiter = RateLimiter::new("page", 100.0);
    let outcome = fetcher
        .fetch(&page_url(&server, "/blocked/"), &limiter)
        .await
        .unwrap();

    match outcome {
        FetchOutcome::Dropped { reason } => assert_eq!(reason, "429 body after retries"),
        other => panic!("expected drop, got {:?}", other),
    }
}

#[tokio::test]
async fn test_redirects_are_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old/"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>new</html>", "text/html"))
        .mount(&server)
        .await;

    let fetcher = create_test_fetcher(2);
    let limiter = RateLimiter::new("page", 100.0);
    let outcome = fetcher
        .fetch(&page_url(&server, "/old/"), &limiter)
        .await
        .unwrap();

    let FetchOutcome::Success(page) = outcome else {
        panic!("expected success");
    };
    assert_eq!(page.final_url, page_url(&server, "/new/"));
    assert_eq!(page.redirect_chain.len(), 1);
    assert_eq!(page.redirect_chain[0].status, 301);
    assert_eq!(page.redirect_chain[0].from, page_url(&server, "/old/").to_string());
    assert_eq!(page.redirect_chain[0].to, page_url(&server, "/new/").to_string());
}

#[tokio::test]
async fn test_non_html_and_not_found_abort_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("%PDF-1.4", "application/pdf"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = create_test_fetcher(5);
    let limiter = RateLimiter::new("page", 100.0);

    for page in ["/report.pdf", "/gone/"] {
        let outcome = fetcher
            .fetch(&page_url(&server, page), &limiter)
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::Aborted { .. }), "{}", page);
    }
}
