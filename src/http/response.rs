use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::core::errors::{CrawlError, CrawlResult};
use crate::http::request::{Method, Request};

/// Outcome of one fetch, successful or not. The fetch layer produces one of
/// these for every request it is handed; a fetch that exhausted its retry
/// budget yields the synthetic [`Response::failed`] shape.
#[derive(Clone)]
pub struct Response {
    /// Final URL of the exchange (after redirects).
    pub url: Url,
    pub method: Method,
    /// HTTP status; `None` when no real exchange completed (synthetic
    /// responses, exhausted retries).
    pub status: Option<u16>,
    /// Success flag, computed from the status at construction. Validators
    /// and middleware may overwrite it to reclassify the outcome; synthetic
    /// producers without a status may declare success directly.
    pub ok: bool,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    /// Prior URLs when the fetch was redirected.
    pub history: Vec<Url>,
    pub body: Bytes,
    pub meta: Option<Value>,
    pub encoding: Option<String>,
    /// Position within a batch fetch, stamped by `fetch_all`.
    pub index: Option<usize>,
    /// Retries the fetch consumed before settling.
    pub retries: usize,
    pub fetched_at: DateTime<Utc>,
    callback_result: Option<Arc<dyn Any + Send + Sync>>,
    text_cache: OnceCell<String>,
    json_cache: OnceCell<Value>,
}

impl Response {
    pub fn new(url: Url, method: Method, status: Option<u16>) -> Self {
        let ok = matches!(status, Some(s) if (200..=299).contains(&s));
        Self {
            url,
            method,
            status,
            ok,
            headers: HashMap::new(),
            cookies: HashMap::new(),
            history: Vec::new(),
            body: Bytes::new(),
            meta: None,
            encoding: None,
            index: None,
            retries: 0,
            fetched_at: Utc::now(),
            callback_result: None,
            text_cache: OnceCell::new(),
            json_cache: OnceCell::new(),
        }
    }

    /// Synthetic response for a fetch that exhausted its retry budget: no
    /// status, empty maps and body, `ok` false.
    pub fn failed(request: &Request) -> Self {
        let mut response = Self::new(request.url.clone(), request.method, None);
        response.meta = request.meta.clone();
        response.encoding = request.encoding.clone();
        response
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn set_ok(&mut self, ok: bool) {
        self.ok = ok;
    }

    /// Body decoded as UTF-8 (lossy), computed once and cached.
    pub fn text(&self) -> &str {
        self.text_cache
            .get_or_init(|| String::from_utf8_lossy(&self.body).into_owned())
    }

    /// Body parsed as JSON, parsed once and cached.
    pub fn json_value(&self) -> CrawlResult<&Value> {
        self.json_cache
            .get_or_try_init(|| serde_json::from_slice(&self.body).map_err(CrawlError::from))
    }

    pub fn json<T: DeserializeOwned>(&self) -> CrawlResult<T> {
        Ok(serde_json::from_value(self.json_value()?.clone())?)
    }

    /// Hands data back to whoever awaited the fetch. Written by the engine
    /// when a scheduled computation resolves to a custom value.
    pub fn set_callback_result(&mut self, value: Arc<dyn Any + Send + Sync>) {
        self.callback_result = Some(value);
    }

    pub fn callback_result(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.callback_result.as_ref()
    }

    pub fn callback_result_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.callback_result.clone()?.downcast::<T>().ok()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("status", &self.status)
            .field("ok", &self.ok)
            .field("body_length", &self.body.len())
            .field("retries", &self.retries)
            .field("index", &self.index)
            .finish()
    }
}
