// Saved repositories, categories and views - the dashboard's domain logic
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod filter;
pub mod memory;
pub mod models;
pub mod source;
pub mod store;

pub use config::Config;
pub use dashboard::Dashboard;
pub use error::Error;
pub use export::{ExportFormat, Exporter};
pub use filter::{evaluate, CategoryFilter};
pub use memory::MemoryStore;
pub use models::{Category, FilterMode, Repository, RepositoryPayload, SortBy, View};
pub use source::{GitHubSource, RepositorySource, TrendingPeriod};
pub use store::{CategoryStore, DashboardStore, RepositoryStore, ViewStore};

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
