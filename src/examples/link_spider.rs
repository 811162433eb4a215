use std::collections::HashMap;

use async_trait::async_trait;
use log::info;
use scraper::{Html, Selector};
use serde_json::json;

use crate::core::{Callback, CallbackResult, CrawlError, CrawlResult, CustomValue, Spider};
use crate::http::{Request, RequestConfig, Response};
use crate::item::Item;

/// Payload emitted once per listing page, resolved through the handler
/// registry under the `page_visit` tag.
#[derive(Debug)]
pub struct PageVisit {
    pub url: String,
    pub quotes: usize,
}

/// Demo spider for quotes.toscrape.com: extracts quote records from each
/// listing page, follows pagination up to a page cap, and fetches author
/// pages through a named callback.
pub struct LinkSpider {
    start_urls: Vec<String>,
    max_pages: u64,
}

impl LinkSpider {
    pub fn new() -> Self {
        Self {
            start_urls: vec!["https://quotes.toscrape.com/".to_string()],
            max_pages: 3,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u64) -> Self {
        self.max_pages = max_pages;
        self
    }

    fn quote_records(&self, response: &Response) -> Vec<CallbackResult> {
        let document = Html::parse_document(response.text());
        let quote_selector = Selector::parse("div.quote").unwrap();
        let text_selector = Selector::parse("span.text").unwrap();
        let author_selector = Selector::parse("small.author").unwrap();

        let mut records = Vec::new();
        for quote in document.select(&quote_selector) {
            let text = quote
                .select(&text_selector)
                .next()
                .map(|e| e.text().collect::<String>())
                .unwrap_or_default();
            let author = quote
                .select(&author_selector)
                .next()
                .map(|e| e.text().collect::<String>())
                .unwrap_or_default();

            let mut item = Item::new("quote")
                .with_field("text", text.trim())
                .with_field("author", author.trim())
                .with_field("source", response.url.as_str());
            // Placeholder quotes on some mirrors come through empty.
            if text.trim().is_empty() {
                item.ignore();
            }
            records.push(CallbackResult::Record(item));
        }
        records
    }

    fn author_requests(&self, response: &Response) -> CrawlResult<Vec<Request>> {
        let document = Html::parse_document(response.text());
        let link_selector = Selector::parse("div.quote span a[href^='/author']").unwrap();

        let mut requests = Vec::new();
        for link in document.select(&link_selector) {
            if let Some(href) = link.value().attr("href") {
                let url = response.url.join(href)?;
                requests.push(
                    Request::new(url)
                        .with_callback(Callback::named("author"))
                        .with_config(self.request_config()),
                );
            }
        }
        Ok(requests)
    }

    fn next_page(&self, response: &Response) -> CrawlResult<Option<Request>> {
        let page = response
            .meta
            .as_ref()
            .and_then(|meta| meta["page"].as_u64())
            .unwrap_or(1);
        if page >= self.max_pages {
            info!("Page cap reached at {}", response.url);
            return Ok(None);
        }

        let document = Html::parse_document(response.text());
        let next_selector = Selector::parse("li.next a").unwrap();
        let Some(href) = document
            .select(&next_selector)
            .next()
            .and_then(|e| e.value().attr("href"))
        else {
            return Ok(None);
        };

        let request = Request::new(response.url.join(href)?)
            .with_callback(Callback::Parse)
            .with_config(self.request_config())
            .with_meta(json!({ "page": page + 1 }))?;
        Ok(Some(request))
    }

    fn parse_author(&self, response: &Response) -> CrawlResult<CallbackResult> {
        let document = Html::parse_document(response.text());
        let name_selector = Selector::parse("h3.author-title").unwrap();
        let born_selector = Selector::parse("span.author-born-date").unwrap();

        let name = document
            .select(&name_selector)
            .next()
            .map(|e| e.text().collect::<String>())
            .ok_or_else(|| CrawlError::NothingMatched {
                selector: "h3.author-title".to_string(),
            })?;
        let born = document
            .select(&born_selector)
            .next()
            .map(|e| e.text().collect::<String>())
            .unwrap_or_default();

        let item = Item::new("author")
            .with_field("name", name.trim())
            .with_field("born", born.trim())
            .with_field("source", response.url.as_str());
        Ok(CallbackResult::Record(item))
    }
}

impl Default for LinkSpider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Spider for LinkSpider {
    fn name(&self) -> &str {
        "link_spider"
    }

    fn start_urls(&self) -> Vec<String> {
        self.start_urls.clone()
    }

    async fn parse(&self, response: &Response) -> CrawlResult<CallbackResult> {
        if !response.ok {
            return Ok(CallbackResult::Done);
        }

        let mut results = self.quote_records(response);
        let visit = PageVisit {
            url: response.url.to_string(),
            quotes: results.len(),
        };

        for request in self.author_requests(response)? {
            results.push(CallbackResult::request(request));
        }
        if let Some(next) = self.next_page(response)? {
            results.push(CallbackResult::request(next));
        }
        results.push(CallbackResult::Custom(CustomValue::new("page_visit", visit)));

        Ok(CallbackResult::sequence(results))
    }

    async fn parse_named(&self, name: &str, response: &Response) -> CrawlResult<CallbackResult> {
        match name {
            "author" => self.parse_author(response),
            other => Err(CrawlError::UnknownCallback(other.to_string())),
        }
    }

    async fn process_item(&self, item: Item) -> CrawlResult<()> {
        info!("{}", serde_json::to_string(&item)?);
        Ok(())
    }

    async fn after_start(&self) -> CrawlResult<()> {
        info!("LinkSpider starting with a cap of {} pages", self.max_pages);
        Ok(())
    }

    fn default_headers(&self) -> HashMap<String, String> {
        HashMap::from([(
            "Accept".to_string(),
            "text/html,application/xhtml+xml".to_string(),
        )])
    }

    fn request_config(&self) -> RequestConfig {
        RequestConfig::default().with_retries(2)
    }
}
