mod fetcher;
pub mod http_fetcher;
pub mod mock_fetcher;
pub mod validators;

#[cfg(test)]
mod tests;

pub use fetcher::{fetch_all, Fetcher, RawFetch};
pub use http_fetcher::HttpFetcher;
pub use mock_fetcher::{MockFetcher, MockResponse};
