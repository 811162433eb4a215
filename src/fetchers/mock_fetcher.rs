use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::sleep;

use super::fetcher::{Fetcher, RawFetch};
use crate::core::errors::{CrawlError, CrawlResult};
use crate::http::Request;

/// One scripted exchange outcome.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub delay: Option<Duration>,
    pub error: bool,
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: None,
            error: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            delay: None,
            error: false,
        }
    }

    /// Simulates a transport failure instead of producing a response.
    pub fn error() -> Self {
        Self {
            status: 0,
            body: String::new(),
            delay: None,
            error: true,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Decrements the in-flight gauge even when the attempt future is dropped by
/// the timeout guard.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted fetcher for tests and examples. Outcomes are queued per URL and
/// consumed in order, with the last entry repeating; unscripted URLs get the
/// default outcome. Tracks attempts per URL and the high-water mark of
/// concurrent exchanges.
#[derive(Clone)]
pub struct MockFetcher {
    default: MockResponse,
    latency: Option<Duration>,
    scripts: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    attempts: Arc<AtomicUsize>,
    attempts_by_url: Arc<Mutex<HashMap<String, usize>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::with_default(MockResponse::ok("ok"))
    }

    pub fn with_default(default: MockResponse) -> Self {
        Self {
            default,
            latency: None,
            scripts: Arc::new(Mutex::new(HashMap::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
            attempts_by_url: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Artificial latency applied to every exchange without its own delay.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn script(self, url: &str, outcomes: Vec<MockResponse>) -> Self {
        self.scripts.lock().insert(url.to_string(), outcomes);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, url: &str) -> usize {
        self.attempts_by_url
            .lock()
            .get(url)
            .copied()
            .unwrap_or_default()
    }

    /// Highest number of exchanges observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch_raw(&self, request: &Request) -> CrawlResult<RawFetch> {
        let url_key = request.url.to_string();
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *self
            .attempts_by_url
            .lock()
            .entry(url_key.clone())
            .or_insert(0) += 1;

        let outcome = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(&url_key) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) if queue.len() == 1 => queue[0].clone(),
                _ => self.default.clone(),
            }
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        if let Some(delay) = outcome.delay.or(self.latency) {
            sleep(delay).await;
        }

        if outcome.error {
            return Err(CrawlError::Message(format!(
                "mock transport error for {url_key}"
            )));
        }

        Ok(RawFetch {
            url: request.url.clone(),
            status: outcome.status,
            headers: HashMap::from([(
                "content-type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )]),
            cookies: HashMap::new(),
            history: Vec::new(),
            body: Bytes::from(outcome.body),
        })
    }

    fn box_clone(&self) -> Box<dyn Fetcher> {
        Box::new(self.clone())
    }
}
