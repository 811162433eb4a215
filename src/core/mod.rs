pub(crate) mod dispatch;
pub(crate) mod engine;
pub(crate) mod errors;
pub(crate) mod spider;

pub use dispatch::{
    CallbackFuture, CallbackResult, CallbackStream, CustomHandler, CustomValue, HandlerRegistry,
};
pub use engine::{CrawlConfig, Crawler, RunState};
pub use errors::{CrawlError, CrawlResult};
pub use spider::{Callback, Spider};
