pub mod app;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod scraper;
pub mod stats;
pub mod tracker;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use app::App;
pub use pipeline::{ProcessPipeline, ScrapePipeline};
pub use processor::{Aggregation, BatchProcessor, ProcessOutcome, Snapshot};
pub use registry::TopicRegistry;
pub use scraper::Scraper;
pub use stats::{ProcessStats, ScrapeStats};
pub use tracker::IncrementalTracker;
