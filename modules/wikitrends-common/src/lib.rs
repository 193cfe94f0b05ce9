pub mod config;
pub mod error;
pub mod file_config;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, TrendsError};
pub use file_config::{FileConfig, ProcessConfig, ScrapeConfig, StorageConfig};
pub use types::*;
