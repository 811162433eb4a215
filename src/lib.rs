pub mod core;
pub mod fetchers;
pub mod http;
pub mod item;
pub mod middleware;
pub mod stats;

pub mod examples;

pub use crate::core::Crawler;
pub use crate::core::{
    Callback, CallbackResult, CrawlConfig, CrawlError, CrawlResult, CustomValue, HandlerRegistry,
    RunState, Spider,
};
pub use fetchers::{Fetcher, HttpFetcher, MockFetcher};
pub use http::{Method, Request, RequestConfig, Response};
pub use item::{Cleaned, Item};
pub use middleware::Middleware;
pub use stats::{RunStats, StatsTracker};
