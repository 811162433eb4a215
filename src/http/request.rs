use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::core::errors::{CrawlError, CrawlResult};
use crate::core::spider::Callback;
use crate::http::response::Response;

/// Supported HTTP verbs. Anything else is a configuration error at
/// construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            other => Err(CrawlError::InvalidMethod(other.to_string())),
        }
    }
}

/// Outcome validation hook. Runs after each attempt and may transform the
/// response, e.g. clear the success flag on a 200 whose body is an error page.
pub type Validator = Arc<dyn Fn(Response) -> BoxFuture<'static, Response> + Send + Sync>;

/// Custom retry decision hook. Borrows the request between attempts and may
/// rewrite it (raise the timeout, swap the URL) before the next try. The
/// borrow ends before the next attempt starts.
pub type RetryHook = Arc<dyn for<'a> Fn(&'a mut Request) -> BoxFuture<'a, ()> + Send + Sync>;

/// Per-request fetch knobs.
#[derive(Clone)]
pub struct RequestConfig {
    /// Retry budget. Counts retries, not attempts: a budget of N allows at
    /// most N + 1 attempts.
    pub retries: usize,
    /// Pre-fetch delay, applied before the first attempt only, never before
    /// retries.
    pub delay: Duration,
    /// Sleep between attempts.
    pub retry_delay: Duration,
    /// Per-attempt guard.
    pub timeout: Duration,
    pub validator: Option<Validator>,
    pub retry_hook: Option<RetryHook>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            timeout: Duration::from_secs(10),
            validator: None,
            retry_hook: None,
        }
    }
}

impl RequestConfig {
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_retry_hook(mut self, retry_hook: RetryHook) -> Self {
        self.retry_hook = Some(retry_hook);
        self
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("retries", &self.retries)
            .field("delay", &self.delay)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("validator", &self.validator.is_some())
            .field("retry_hook", &self.retry_hook.is_some())
            .finish()
    }
}

/// Describes one fetch: where to go, how to ask, and which callback
/// interprets the outcome.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: Uuid,
    pub url: Url,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub meta: Option<Value>,
    pub encoding: Option<String>,
    /// `None` means fetch-only: the response is counted but not dispatched.
    pub callback: Option<Callback>,
    pub config: RequestConfig,
}

impl Request {
    pub fn new(url: Url) -> Self {
        Self {
            id: Uuid::now_v7(),
            url,
            method: Method::Get,
            headers: HashMap::new(),
            body: None,
            meta: None,
            encoding: None,
            callback: None,
            config: RequestConfig::default(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(url)
    }

    pub fn post(url: Url, body: impl Into<String>) -> Self {
        let mut request = Self::new(url);
        request.method = Method::Post;
        request.body = Some(body.into());
        request
    }

    /// Parse and build in one step; fails on malformed URLs.
    pub fn parse(url: &str) -> CrawlResult<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_meta<T: serde::Serialize>(mut self, meta: T) -> CrawlResult<Self> {
        self.meta = Some(serde_json::to_value(meta)?);
        Ok(self)
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_config(mut self, config: RequestConfig) -> Self {
        self.config = config;
        self
    }
}
