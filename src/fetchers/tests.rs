use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use regex::Regex;
use url::Url;

use super::validators::{reject_body_matching, require_status};
use super::{fetch_all, Fetcher, MockFetcher, MockResponse};
use crate::http::{Request, RequestConfig, RetryHook};

fn request_for(url: &str, config: RequestConfig) -> Request {
    Request::parse(url).unwrap().with_config(config)
}

#[tokio::test]
async fn budget_of_n_allows_n_plus_one_attempts() {
    let fetcher = MockFetcher::with_default(MockResponse::status(500));
    let request = request_for("https://mock.test/a", RequestConfig::default().with_retries(2));

    let response = fetcher.fetch(request).await;

    assert_eq!(fetcher.attempts(), 3);
    assert!(!response.ok);
    assert_eq!(response.status, None);
    assert!(response.headers.is_empty());
    assert!(response.body.is_empty());
    assert_eq!(response.retries, 2);
}

#[tokio::test]
async fn first_attempt_success_skips_retries() {
    let fetcher = MockFetcher::new();
    let response = fetcher
        .fetch(request_for("https://mock.test/ok", RequestConfig::default()))
        .await;

    assert!(response.ok);
    assert_eq!(response.status, Some(200));
    assert_eq!(response.retries, 0);
    assert_eq!(fetcher.attempts(), 1);
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn transient_failures_recover_within_budget() {
    let fetcher = MockFetcher::new().script(
        "https://mock.test/flaky",
        vec![
            MockResponse::status(500),
            MockResponse::error(),
            MockResponse::ok("recovered"),
        ],
    );

    let response = fetcher
        .fetch(request_for(
            "https://mock.test/flaky",
            RequestConfig::default(),
        ))
        .await;

    assert!(response.ok);
    assert_eq!(response.retries, 2);
    assert_eq!(fetcher.attempts(), 3);
    assert_eq!(response.text(), "recovered");
}

#[tokio::test]
async fn rejecting_validator_with_zero_budget_attempts_once() {
    let fetcher = MockFetcher::new();
    let config = RequestConfig::default()
        .with_retries(0)
        .with_validator(require_status(&[418]));

    let response = fetcher
        .fetch(request_for("https://mock.test/v", config))
        .await;

    assert_eq!(fetcher.attempts(), 1);
    assert!(!response.ok);
    assert_eq!(response.status, None);
}

#[tokio::test]
async fn timed_out_attempts_count_against_the_budget() {
    let fetcher = MockFetcher::with_default(
        MockResponse::ok("slow").with_delay(Duration::from_millis(200)),
    );
    let config = RequestConfig::default()
        .with_retries(1)
        .with_timeout(Duration::from_millis(20));

    let start = Instant::now();
    let response = fetcher
        .fetch(request_for("https://mock.test/slow", config))
        .await;

    assert!(!response.ok);
    assert_eq!(fetcher.attempts(), 2);
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn pre_fetch_delay_applies_to_first_attempt_only() {
    let fetcher = MockFetcher::new().script(
        "https://mock.test/delayed",
        vec![MockResponse::status(500), MockResponse::ok("done")],
    );
    let config = RequestConfig::default().with_delay(Duration::from_millis(80));

    let start = Instant::now();
    let response = fetcher
        .fetch(request_for("https://mock.test/delayed", config))
        .await;
    let elapsed = start.elapsed();

    assert!(response.ok);
    assert_eq!(fetcher.attempts(), 2);
    assert!(elapsed >= Duration::from_millis(80));
    assert!(
        elapsed < Duration::from_millis(160),
        "delay must not repeat on retries: {elapsed:?}"
    );
}

#[tokio::test]
async fn retry_delay_spaces_attempts() {
    let fetcher = MockFetcher::new().script(
        "https://mock.test/spaced",
        vec![MockResponse::status(500), MockResponse::ok("done")],
    );
    let config = RequestConfig::default().with_retry_delay(Duration::from_millis(60));

    let start = Instant::now();
    let response = fetcher
        .fetch(request_for("https://mock.test/spaced", config))
        .await;

    assert!(response.ok);
    assert!(start.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn retry_hook_may_rewrite_the_request() {
    let fetcher = MockFetcher::new()
        .script("https://mock.test/old", vec![MockResponse::status(503)])
        .script("https://mock.test/new", vec![MockResponse::ok("moved")]);

    let hook: RetryHook = Arc::new(|request: &mut Request| {
        async move {
            request.url = Url::parse("https://mock.test/new").unwrap();
        }
        .boxed()
    });
    let config = RequestConfig::default()
        .with_retries(2)
        .with_retry_hook(hook);

    let response = fetcher
        .fetch(request_for("https://mock.test/old", config))
        .await;

    assert!(response.ok);
    assert_eq!(response.url.as_str(), "https://mock.test/new");
    assert_eq!(fetcher.attempts_for("https://mock.test/old"), 1);
    assert_eq!(fetcher.attempts_for("https://mock.test/new"), 1);
}

#[tokio::test]
async fn body_validator_reclassifies_success() {
    let fetcher = MockFetcher::with_default(MockResponse::ok("bot detected, go away"));
    let config = RequestConfig::default()
        .with_retries(1)
        .with_validator(reject_body_matching(Regex::new("bot detected").unwrap()));

    let response = fetcher
        .fetch(request_for("https://mock.test/soft", config))
        .await;

    assert!(!response.ok);
    assert_eq!(fetcher.attempts(), 2);
    assert_eq!(response.status, None);
}

#[tokio::test]
async fn batch_fetch_stamps_indexes_in_request_order() {
    let fetcher = MockFetcher::new()
        .script(
            "https://mock.test/0",
            vec![MockResponse::ok("zero").with_delay(Duration::from_millis(40))],
        )
        .script("https://mock.test/1", vec![MockResponse::ok("one")]);

    let requests = vec![
        Request::parse("https://mock.test/0").unwrap(),
        Request::parse("https://mock.test/1").unwrap(),
        Request::parse("https://mock.test/2").unwrap(),
    ];
    let responses = fetch_all(&fetcher, requests).await;

    assert_eq!(responses.len(), 3);
    for (index, response) in responses.iter().enumerate() {
        assert_eq!(response.index, Some(index));
    }
    assert_eq!(responses[0].text(), "zero");
    assert_eq!(responses[1].text(), "one");
}

#[tokio::test]
async fn exhausted_fetch_echoes_request_metadata() {
    let fetcher = MockFetcher::with_default(MockResponse::error());
    let request = Request::parse("https://mock.test/meta")
        .unwrap()
        .with_meta(serde_json::json!({ "seed": true }))
        .unwrap()
        .with_config(RequestConfig::default().with_retries(1));

    let response = fetcher.fetch(request).await;

    assert!(!response.ok);
    assert_eq!(response.meta, Some(serde_json::json!({ "seed": true })));
}

#[tokio::test]
async fn charset_is_read_from_content_type() {
    let fetcher = MockFetcher::new();
    let response = fetcher
        .fetch(Request::parse("https://mock.test/enc").unwrap())
        .await;

    assert_eq!(response.encoding.as_deref(), Some("utf-8"));
}
