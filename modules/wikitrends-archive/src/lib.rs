pub mod extract;
pub mod fetcher;
mod fs;
pub mod links;
pub mod locator;
pub mod locks;
pub mod processed_store;
pub mod raw_store;
pub mod state_store;

pub use extract::parse_page;
pub use fs::write_atomic;
pub use fetcher::{FetchFailure, FetchedPage, HttpPageFetcher, PageFetcher};
pub use links::extract_wiki_links;
pub use locator::resolve_locator;
pub use locks::PartitionLocks;
pub use processed_store::ProcessedStore;
pub use raw_store::{PartitionIter, RawStore};
pub use state_store::{FileStateStore, MemoryStateStore, StateStore};
pub use wikitrends_common::{Result, TrendsError};
