pub mod link_spider;

pub use link_spider::{LinkSpider, PageVisit};
