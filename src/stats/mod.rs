use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Totals for one run. Snapshots are cheap clones; the live copy sits behind
/// the tracker's lock.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub items_processed: usize,
    pub items_ignored: usize,
    pub retry_count: usize,
    pub bytes_downloaded: usize,
    pub status_codes: HashMap<u16, usize>,
    pub average_fetch_ms: f64,
}

impl RunStats {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            requests_succeeded: 0,
            requests_failed: 0,
            items_processed: 0,
            items_ignored: 0,
            retry_count: 0,
            bytes_downloaded: 0,
            status_codes: HashMap::new(),
            average_fetch_ms: 0.0,
        }
    }

    pub fn total_requests(&self) -> usize {
        self.requests_succeeded + self.requests_failed
    }

    /// Wall time of the run; open-ended until `finish` is called.
    pub fn elapsed(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn print_summary(&self) {
        println!("\nCrawl Statistics:");
        println!("=================");
        println!("Duration: {} seconds", self.elapsed().as_secs());
        println!("Total Requests: {}", self.total_requests());
        println!("Successful Requests: {}", self.requests_succeeded);
        println!("Failed Requests: {}", self.requests_failed);
        println!("Items Processed: {}", self.items_processed);
        println!("Items Ignored: {}", self.items_ignored);
        println!("Retry Count: {}", self.retry_count);
        println!(
            "Data Downloaded: {:.2} MB",
            self.bytes_downloaded as f64 / 1_000_000.0
        );
        println!("Average Fetch Time: {:.2}ms", self.average_fetch_ms);

        println!("\nStatus Codes:");
        for (code, count) in &self.status_codes {
            println!("  {}: {}", code, count);
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsTracker {
    stats: Arc<RwLock<RunStats>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(RunStats::new())),
        }
    }

    pub fn record_success(&self, status: Option<u16>, bytes: usize, duration: Duration) {
        let mut stats = self.stats.write();
        stats.requests_succeeded += 1;
        if let Some(status) = status {
            *stats.status_codes.entry(status).or_insert(0) += 1;
        }
        stats.bytes_downloaded += bytes;
        Self::fold_duration(&mut stats, duration);
    }

    pub fn record_failure(&self, status: Option<u16>, duration: Duration) {
        let mut stats = self.stats.write();
        stats.requests_failed += 1;
        if let Some(status) = status {
            *stats.status_codes.entry(status).or_insert(0) += 1;
        }
        Self::fold_duration(&mut stats, duration);
    }

    pub fn record_item(&self) {
        self.stats.write().items_processed += 1;
    }

    pub fn record_ignored(&self) {
        self.stats.write().items_ignored += 1;
    }

    pub fn record_retries(&self, count: usize) {
        self.stats.write().retry_count += count;
    }

    pub fn finish(&self) {
        self.stats.write().finished_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> RunStats {
        self.stats.read().clone()
    }

    fn fold_duration(stats: &mut RunStats, duration: Duration) {
        let total = stats.total_requests();
        let current_total = stats.average_fetch_ms * (total - 1) as f64;
        let new_duration = duration.as_secs_f64() * 1_000.0;
        stats.average_fetch_ms = (current_total + new_duration) / total as f64;
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
