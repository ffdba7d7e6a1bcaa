use async_trait::async_trait;
use nt_core::{Result, Settings};

pub mod backends;
pub mod selector;
pub mod source;

pub use backends::*;
pub use selector::{ActiveDriver, DriverSelector};
pub use source::{HttpSnapshotSource, SnapshotSource};

/// A backend that can build itself from process settings.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn get_error_message() -> &'static str;
    async fn connect(settings: &Settings) -> Result<Self>
    where
        Self: Sized;
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{DriverSelector, SnapshotSource, StorageBackend};
    pub use nt_core::{DbDriver, Document, Filter};
}
