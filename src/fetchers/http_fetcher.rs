use async_trait::async_trait;
use log::trace;
use reqwest::{Client, ClientBuilder};

use super::fetcher::{Fetcher, RawFetch};
use crate::core::errors::CrawlResult;
use crate::http::{Method, Request};

const DEFAULT_USER_AGENT: &str = concat!("spinneret/", env!("CARGO_PKG_VERSION"));

/// Real HTTP transport over a shared reqwest client. Adding retry, timeout,
/// or validation here would double up the trait's default `fetch`; this type
/// only performs the exchange.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> CrawlResult<Self> {
        let client = ClientBuilder::new()
            .user_agent(DEFAULT_USER_AGENT)
            .cookie_store(true)
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an externally configured client (proxies, TLS settings).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new().expect("failed to build default HTTP client")
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_raw(&self, request: &Request) -> CrawlResult<RawFetch> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.clone()),
            Method::Post => self.client.post(request.url.clone()),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();
        let cookies = response
            .cookies()
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();
        let history = if final_url != request.url {
            vec![request.url.clone()]
        } else {
            Vec::new()
        };

        let body = response.bytes().await?;
        trace!("Fetched {} bytes from {}", body.len(), final_url);

        Ok(RawFetch {
            url: final_url,
            status,
            headers,
            cookies,
            history,
            body,
        })
    }

    fn box_clone(&self) -> Box<dyn Fetcher> {
        Box::new(self.clone())
    }
}
