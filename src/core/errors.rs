use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("invalid request method: {0}")]
    InvalidMethod(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("nothing matched for selector: {selector}")]
    NothingMatched { selector: String },

    #[error("invalid callback result type: {0}")]
    InvalidCallbackResult(String),

    #[error("unknown callback: {0}")]
    UnknownCallback(String),

    #[error("middleware {name} failed: {source}")]
    MiddlewareError {
        name: &'static str,
        source: Box<CrawlError>,
    },

    #[error("{name} hook failed: {source}")]
    HookError {
        name: &'static str,
        source: Box<CrawlError>,
    },

    #[error("spider has no seed requests")]
    NoSeeds,

    #[error("task failed: {0}")]
    TaskError(String),

    #[error("{0}")]
    Message(String),
}

impl CrawlError {
    /// Wrap an error raised by a lifecycle hook. Hook failures are the only
    /// errors that abort a run.
    pub fn hook(name: &'static str, source: CrawlError) -> Self {
        CrawlError::HookError {
            name,
            source: Box::new(source),
        }
    }

    pub fn middleware(name: &'static str, source: CrawlError) -> Self {
        CrawlError::MiddlewareError {
            name,
            source: Box::new(source),
        }
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;
