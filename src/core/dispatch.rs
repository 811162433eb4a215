use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use log::{debug, error, warn};

use crate::core::engine::RunContext;
use crate::core::errors::{CrawlError, CrawlResult};
use crate::core::spider::{Callback, Spider};
use crate::http::{Request, Response};

pub type CallbackStream = BoxStream<'static, CallbackResult>;
pub type CallbackFuture = BoxFuture<'static, CallbackResult>;

/// Everything a callback may hand back to the engine, as one closed type.
pub enum CallbackResult {
    /// New fetches to enqueue, one task per element.
    Requests(Vec<Request>),
    /// A nested asynchronous sequence, drained depth-first: every element is
    /// fully dispatched before the next one is pulled.
    Stream(CallbackStream),
    /// A bare asynchronous computation, scheduled as its own queue task; its
    /// output is dispatched when it resolves.
    Task(CallbackFuture),
    /// A structured record, routed to `process_item` unless ignored.
    Record(crate::item::Item),
    /// A tagged custom value, resolved through the handler registry.
    Custom(CustomValue),
    /// Nothing further.
    Done,
}

impl CallbackResult {
    pub fn request(request: Request) -> Self {
        CallbackResult::Requests(vec![request])
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = CallbackResult> + Send + 'static,
    {
        CallbackResult::Stream(stream.boxed())
    }

    /// Eager sequence helper: the values are yielded in order from an
    /// already-materialized stream.
    pub fn sequence(values: Vec<CallbackResult>) -> Self {
        CallbackResult::Stream(futures::stream::iter(values).boxed())
    }

    pub fn task<F>(future: F) -> Self
    where
        F: Future<Output = CallbackResult> + Send + 'static,
    {
        CallbackResult::Task(Box::pin(future))
    }

    fn kind(&self) -> &'static str {
        match self {
            CallbackResult::Requests(_) => "requests",
            CallbackResult::Stream(_) => "stream",
            CallbackResult::Task(_) => "task",
            CallbackResult::Record(_) => "record",
            CallbackResult::Custom(_) => "custom",
            CallbackResult::Done => "done",
        }
    }
}

impl fmt::Debug for CallbackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallbackResult").field(&self.kind()).finish()
    }
}

/// An arbitrary user value carrying a type tag for registry lookup. The
/// payload is shared, so the value clones cheaply.
#[derive(Clone)]
pub struct CustomValue {
    tag: String,
    data: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(tag: impl Into<String>, data: T) -> Self {
        Self {
            tag: tag.into(),
            data: Arc::new(data),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn data(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.data)
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue").field("tag", &self.tag).finish()
    }
}

pub type CustomHandler =
    Arc<dyn Fn(CustomValue) -> BoxFuture<'static, CrawlResult<()>> + Send + Sync>;

/// Maps custom-result tags to handler functions. A dispatch resolves the tag
/// once; an unregistered tag is reported as an invalid callback result.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, CustomHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(mut self, tag: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CustomValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CrawlResult<()>> + Send + 'static,
    {
        self.handlers
            .insert(tag.into(), Arc::new(move |value| Box::pin(handler(value))));
        self
    }

    pub fn get(&self, tag: &str) -> Option<&CustomHandler> {
        self.handlers.get(tag)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Interprets callback products for one run. Owned by the workers; every
/// error is logged against the originating response and consumed here, so a
/// bad callback can never take the run down.
pub(crate) struct Dispatcher<S: Spider> {
    spider: Arc<S>,
    handlers: Arc<HandlerRegistry>,
    ctx: Arc<RunContext>,
}

impl<S: Spider> Dispatcher<S> {
    pub(crate) fn new(spider: Arc<S>, handlers: Arc<HandlerRegistry>, ctx: Arc<RunContext>) -> Self {
        Self {
            spider,
            handlers,
            ctx,
        }
    }

    /// Run the request's callback against the final response, then dispatch
    /// whatever it produced.
    pub(crate) async fn run_callback(&self, request: &Request, response: &Response) {
        let result = match &request.callback {
            None => return,
            Some(Callback::Parse) => self.spider.parse(response).await,
            Some(Callback::Named(name)) => self.spider.parse_named(name, response).await,
        };

        match result {
            Ok(value) => self.dispatch(value, response).await,
            Err(err) => self.log_dispatch_error(err, response),
        }
    }

    /// Interpret one callback product. Never fails: errors are logged with
    /// the originating URL and the task still completes.
    pub(crate) async fn dispatch(&self, result: CallbackResult, response: &Response) {
        debug!("Dispatching {} result from {}", result.kind(), response.url);
        if let Err(err) = self.dispatch_value(result, response).await {
            self.log_dispatch_error(err, response);
        }
    }

    fn dispatch_value<'a>(
        &'a self,
        result: CallbackResult,
        response: &'a Response,
    ) -> BoxFuture<'a, CrawlResult<()>> {
        Box::pin(async move {
            match result {
                CallbackResult::Done => {}
                CallbackResult::Requests(requests) => {
                    for request in requests {
                        self.ctx.enqueue_fetch(request);
                    }
                }
                CallbackResult::Stream(mut stream) => {
                    while let Some(value) = stream.next().await {
                        self.dispatch_value(value, response).await?;
                    }
                }
                CallbackResult::Task(future) => {
                    self.ctx.enqueue_run(future, response.clone());
                }
                CallbackResult::Record(item) => {
                    if item.is_ignored() {
                        debug!("Dropping ignored item {} from {}", item.name(), response.url);
                        self.ctx.stats().record_ignored();
                    } else {
                        self.spider.process_item(item).await?;
                        self.ctx.stats().record_item();
                    }
                }
                CallbackResult::Custom(value) => match self.handlers.get(value.tag()) {
                    Some(handler) => handler(value).await?,
                    None => {
                        return Err(CrawlError::InvalidCallbackResult(value.tag().to_string()))
                    }
                },
            }
            Ok(())
        })
    }

    fn log_dispatch_error(&self, err: CrawlError, response: &Response) {
        match err {
            CrawlError::NothingMatched { .. } => {
                warn!("Extraction missed for {}: {}", response.url, err);
            }
            CrawlError::UnknownCallback(_) => {
                error!("Callback configuration error for {}: {}", response.url, err);
            }
            CrawlError::InvalidCallbackResult(_) => {
                error!("Invalid callback result from {}: {}", response.url, err);
            }
            other => {
                error!("Callback dispatch failed for {}: {}", response.url, other);
            }
        }
    }
}
