use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::dispatch::CallbackResult;
use crate::core::errors::{CrawlError, CrawlResult};
use crate::http::{Request, RequestConfig, Response};
use crate::item::Item;

/// Routes a response to the spider entry point that interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Parse,
    Named(String),
}

impl Callback {
    pub fn named(name: impl Into<String>) -> Self {
        Callback::Named(name.into())
    }
}

/// User surface of the engine: seeds, callbacks, and hooks. Everything but
/// [`parse`] has a default.
///
/// [`parse`]: Spider::parse
#[async_trait]
pub trait Spider: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn start_urls(&self) -> Vec<String> {
        Vec::new()
    }

    /// Seed requests for a run. The default builds one GET per entry of
    /// [`start_urls`], wired to [`Callback::Parse`] and carrying the
    /// spider's default headers and request config.
    ///
    /// [`start_urls`]: Spider::start_urls
    fn start_requests(&self) -> CrawlResult<Vec<Request>> {
        let headers = self.default_headers();
        let config = self.request_config();
        self.start_urls()
            .iter()
            .map(|url| {
                Ok(Request::parse(url)?
                    .with_headers(headers.clone())
                    .with_config(config.clone())
                    .with_callback(Callback::Parse))
            })
            .collect()
    }

    /// Main callback for responses routed to [`Callback::Parse`].
    async fn parse(&self, response: &Response) -> CrawlResult<CallbackResult>;

    /// Callback for responses routed to [`Callback::Named`]. The default
    /// rejects every name, which the engine reports as a configuration
    /// error; the response then produces no result.
    async fn parse_named(&self, name: &str, _response: &Response) -> CrawlResult<CallbackResult> {
        Err(CrawlError::UnknownCallback(name.to_string()))
    }

    /// Receives every record a callback produced, unless its ignore flag is
    /// set.
    async fn process_item(&self, _item: Item) -> CrawlResult<()> {
        Ok(())
    }

    /// Runs once per completed fetch whose final response is successful.
    async fn process_succeed_response(
        &self,
        _request: &Request,
        _response: &Response,
    ) -> CrawlResult<()> {
        Ok(())
    }

    /// Runs once per completed fetch whose final response is not successful.
    async fn process_failed_response(
        &self,
        _request: &Request,
        _response: &Response,
    ) -> CrawlResult<()> {
        Ok(())
    }

    /// Runs before the first seed is enqueued. An error here aborts the run;
    /// no other hook can do that.
    async fn after_start(&self) -> CrawlResult<()> {
        Ok(())
    }

    /// Runs when the queue drains, before the workers shut down. An error
    /// here aborts the run.
    async fn before_stop(&self) -> CrawlResult<()> {
        Ok(())
    }

    /// Headers merged into every seed request.
    fn default_headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Fetch config applied to every seed request.
    fn request_config(&self) -> RequestConfig {
        RequestConfig::default()
    }
}
