use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use log::{debug, info, trace, warn};
use tokio::time::{sleep, timeout};
use url::Url;

use crate::core::errors::{CrawlError, CrawlResult};
use crate::http::{Request, Response};

/// Raw outcome of a single network exchange, before retry accounting.
#[derive(Debug)]
pub struct RawFetch {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub history: Vec<Url>,
    pub body: Bytes,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// One network exchange. No timeout or retry logic here; [`fetch`] wraps
    /// every call with the per-attempt guard.
    ///
    /// [`fetch`]: Fetcher::fetch
    async fn fetch_raw(&self, request: &Request) -> CrawlResult<RawFetch>;

    fn box_clone(&self) -> Box<dyn Fetcher>;

    /// Full fetch algorithm: first-attempt delay, per-attempt timeout,
    /// outcome validation, retry budget, exhaustion fallback. Always settles
    /// on a response; network errors never escape this method.
    async fn fetch(&self, request: Request) -> Response {
        let mut request = request;
        let mut retries_used = 0;

        // The pre-fetch delay applies to the first attempt only.
        if !request.config.delay.is_zero() {
            trace!(
                "Delaying fetch of {} by {:?}",
                request.url,
                request.config.delay
            );
            sleep(request.config.delay).await;
        }

        loop {
            info!("Fetching URL: {}", request.url);
            let attempt = timeout(request.config.timeout, self.fetch_raw(&request)).await;

            let outcome = match attempt {
                Ok(Ok(raw)) => Ok(build_response(&request, raw, retries_used)),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(CrawlError::Timeout(request.config.timeout)),
            };

            match outcome {
                Ok(response) => {
                    let response = match &request.config.validator {
                        Some(validator) => validator(response).await,
                        None => response,
                    };
                    if response.ok {
                        debug!(
                            "Request completed for URL: {} (retries={}, status={:?})",
                            response.url, retries_used, response.status
                        );
                        return response;
                    }
                    warn!(
                        "Unsuccessful response for {} (status={:?})",
                        request.url, response.status
                    );
                }
                Err(err) => {
                    warn!("Fetch attempt failed for {}: {}", request.url, err);
                }
            }

            if retries_used >= request.config.retries {
                break;
            }
            retries_used += 1;

            if !request.config.retry_delay.is_zero() {
                sleep(request.config.retry_delay).await;
            }
            // The hook may rewrite the request (raise the timeout, swap the
            // URL) before the next attempt.
            if let Some(retry_hook) = request.config.retry_hook.clone() {
                retry_hook(&mut request).await;
            }
            debug!(
                "Retrying {} (attempt {}/{})",
                request.url,
                retries_used + 1,
                request.config.retries + 1
            );
        }

        warn!(
            "Retry budget exhausted for {} after {} attempts",
            request.url,
            retries_used + 1
        );
        let mut response = Response::failed(&request);
        response.retries = retries_used;
        response
    }
}

fn build_response(request: &Request, raw: RawFetch, retries: usize) -> Response {
    let mut response = Response::new(raw.url, request.method, Some(raw.status));
    response.headers = raw.headers;
    response.cookies = raw.cookies;
    response.history = raw.history;
    response.body = raw.body;
    response.meta = request.meta.clone();
    response.encoding = request
        .encoding
        .clone()
        .or_else(|| charset_from_headers(&response.headers));
    response.retries = retries;
    response
}

fn charset_from_headers(headers: &HashMap<String, String>) -> Option<String> {
    let content_type = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value)?;
    content_type
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("charset="))
        .map(|charset| charset.trim_matches('"').to_string())
        .next()
}

/// Fetch a batch concurrently. Responses come back in request order, each
/// stamped with its position in the batch.
pub async fn fetch_all(fetcher: &dyn Fetcher, requests: Vec<Request>) -> Vec<Response> {
    let futures = requests.into_iter().map(|request| fetcher.fetch(request));
    let mut responses = join_all(futures).await;
    for (index, response) in responses.iter_mut().enumerate() {
        response.index = Some(index);
    }
    responses
}
