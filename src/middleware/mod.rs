use std::collections::VecDeque;
use std::ops::Add;

use futures::future::BoxFuture;
use log::{debug, error};

use crate::core::errors::{CrawlError, CrawlResult};
use crate::http::{Request, Response};

pub type RequestHandler =
    Box<dyn for<'a> Fn(&'a mut Request) -> BoxFuture<'a, CrawlResult<()>> + Send + Sync>;
pub type ResponseHandler = Box<
    dyn for<'a> Fn(&'a Request, &'a mut Response) -> BoxFuture<'a, CrawlResult<()>> + Send + Sync,
>;

struct NamedRequestHandler {
    name: &'static str,
    handler: RequestHandler,
}

struct NamedResponseHandler {
    name: &'static str,
    handler: ResponseHandler,
}

/// Two ordered chains of async functions wrapped around the fetch: the
/// request chain runs before it, the response chain after. A failing entry
/// is logged and skipped; it never stops the chain or the crawl.
///
/// Pipelines compose with `+`. The sum keeps the left side's request entries
/// ahead of the right side's, while on the response side the right side's
/// entries run first.
#[derive(Default)]
pub struct Middleware {
    request_chain: VecDeque<NamedRequestHandler>,
    response_chain: VecDeque<NamedResponseHandler>,
}

impl Middleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-fetch middleware. Entries run oldest-first.
    pub fn on_request<F>(mut self, name: &'static str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request) -> BoxFuture<'a, CrawlResult<()>> + Send + Sync + 'static,
    {
        self.request_chain.push_back(NamedRequestHandler {
            name,
            handler: Box::new(handler),
        });
        self
    }

    /// Register a post-fetch middleware. Entries run newest-first.
    pub fn on_response<F>(mut self, name: &'static str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a Request, &'a mut Response) -> BoxFuture<'a, CrawlResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.response_chain.push_front(NamedResponseHandler {
            name,
            handler: Box::new(handler),
        });
        self
    }

    pub fn request_count(&self) -> usize {
        self.request_chain.len()
    }

    pub fn response_count(&self) -> usize {
        self.response_chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.request_chain.is_empty() && self.response_chain.is_empty()
    }

    /// Drive the request chain. Entry failures are isolated: logged, then
    /// the rest of the chain still runs.
    pub async fn run_request(&self, request: &mut Request) {
        for entry in &self.request_chain {
            debug!("Running request middleware {} for {}", entry.name, request.url);
            if let Err(err) = (entry.handler)(request).await {
                let wrapped = CrawlError::middleware(entry.name, err);
                error!("Request middleware failed for {}: {}", request.url, wrapped);
            }
        }
    }

    /// Drive the response chain. Same isolation rules as [`run_request`].
    ///
    /// [`run_request`]: Middleware::run_request
    pub async fn run_response(&self, request: &Request, response: &mut Response) {
        for entry in &self.response_chain {
            debug!(
                "Running response middleware {} for {}",
                entry.name, response.url
            );
            if let Err(err) = (entry.handler)(request, response).await {
                let wrapped = CrawlError::middleware(entry.name, err);
                error!("Response middleware failed for {}: {}", response.url, wrapped);
            }
        }
    }
}

impl Add for Middleware {
    type Output = Middleware;

    fn add(self, rhs: Middleware) -> Middleware {
        let Middleware {
            mut request_chain,
            response_chain: lhs_responses,
        } = self;
        let Middleware {
            request_chain: mut rhs_requests,
            mut response_chain,
        } = rhs;

        request_chain.append(&mut rhs_requests);
        response_chain.extend(lhs_responses);

        Middleware {
            request_chain,
            response_chain,
        }
    }
}
