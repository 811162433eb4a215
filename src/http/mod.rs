pub(crate) mod request;
pub(crate) mod response;

pub use request::{Method, Request, RequestConfig, RetryHook, Validator};
pub use response::Response;
