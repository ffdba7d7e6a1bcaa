//! Consistency operations over the storage driver.
//!
//! Every helper takes the driver as an `Arc<dyn DbDriver>` and never builds
//! one itself; get it from `nt_storage::DriverSelector`.

pub mod articles;
pub mod clusters;
pub mod general;
pub mod retry;
pub mod tasks;

use std::sync::Arc;

use nt_core::{DbDriver, Settings};

pub use articles::{ArticleRecords, DeletionSummary};
pub use clusters::ClusterRecords;
pub use general::GeneralRecords;
pub use tasks::TaskRecords;

/// All record helpers sharing one driver.
#[derive(Clone)]
pub struct Records {
    pub articles: ArticleRecords,
    pub clusters: ClusterRecords,
    pub tasks: TaskRecords,
    pub general: GeneralRecords,
}

impl Records {
    pub fn new(db: Arc<dyn DbDriver>, settings: &Settings) -> Self {
        Self {
            articles: ArticleRecords::new(db.clone(), settings.retry),
            clusters: ClusterRecords::new(db.clone(), settings.retry),
            tasks: TaskRecords::new(db.clone(), settings.retry).with_max_time_failed(settings.max_time_failed),
            general: GeneralRecords::new(db),
        }
    }
}
