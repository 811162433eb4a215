use log::info;
use spinneret::examples::{LinkSpider, PageVisit};
use spinneret::fetchers::HttpFetcher;
use spinneret::{
    CrawlConfig, Crawler, CrawlResult, CustomValue, HandlerRegistry, Middleware, Request, Response,
};

#[tokio::main]
async fn main() -> CrawlResult<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .filter_module("selectors", log::LevelFilter::Warn)
        .filter_module("html5ever", log::LevelFilter::Error)
        .init();

    let middleware = Middleware::new()
        .on_request("user_agent", |request: &mut Request| {
            request
                .headers
                .entry("User-Agent".to_string())
                .or_insert_with(|| {
                    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
                });
            Box::pin(async { Ok(()) })
        })
        .on_response("log_status", |_request: &Request, response: &mut Response| {
            Box::pin(async move {
                info!(
                    "{} {} ({} bytes)",
                    response.status.map_or_else(|| "---".to_string(), |s| s.to_string()),
                    response.url,
                    response.body.len()
                );
                Ok(())
            })
        });

    let handlers = HandlerRegistry::new().register("page_visit", |value: CustomValue| async move {
        if let Some(visit) = value.downcast::<PageVisit>() {
            info!("Visited {} ({} quotes)", visit.url, visit.quotes);
        }
        Ok(())
    });

    let fetcher = Box::new(HttpFetcher::new()?);
    let crawler = Crawler::new(fetcher)
        .with_config(CrawlConfig::default().with_concurrency(10).with_workers(4))
        .with_middleware(middleware)
        .with_handlers(handlers);

    let stats = crawler.run(LinkSpider::new()).await?;
    stats.print_summary();

    Ok(())
}
