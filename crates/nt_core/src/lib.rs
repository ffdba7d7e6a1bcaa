pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod logging;
pub mod storage;
pub mod types;

pub use config::{DriverKind, RetryBudget, Settings, SnapshotSettings};
pub use document::{from_document, to_document, Document, Filter};
pub use error::Error;
pub use storage::DbDriver;
pub use types::{Article, Cluster, StatusTimestamp, Task, TaskStatus};

pub type Result<T> = std::result::Result<T, Error>;

pub mod tables {
    pub const ARTICLES: &str = "articles";
    pub const CLUSTERS: &str = "clusters";
    pub const TASKS: &str = "tasks";
}
