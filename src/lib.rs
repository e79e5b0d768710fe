pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod migration;
pub mod shutdown;
pub mod stats;
pub mod store;

pub use config::AppConfig;
pub use error::{MigrationError, Result};
pub use migration::{MigrationPipeline, MigrationPlan};
pub use store::{MarketSink, MarketSource, PageInvalidator};
