//! Resolves the backend for this process and hands out one shared instance.

use std::sync::Arc;

use nt_core::{DbDriver, DriverKind, Error, Result, Settings};
use tokio::sync::OnceCell;
use tracing::info;

use crate::backends::snapshot::SnapshotDriver;
use crate::backends::transactional::{DocumentClient, TransactionalDriver};
use crate::source::{HttpSnapshotSource, SnapshotSource};

/// The driver variant that was built.
#[derive(Clone)]
pub enum ActiveDriver {
    Transactional(Arc<TransactionalDriver>),
    Snapshot(Arc<SnapshotDriver>),
}

impl ActiveDriver {
    pub fn driver(&self) -> Arc<dyn DbDriver> {
        match self {
            ActiveDriver::Transactional(driver) => driver.clone(),
            ActiveDriver::Snapshot(driver) => driver.clone(),
        }
    }

    pub fn kind(&self) -> DriverKind {
        match self {
            ActiveDriver::Transactional(_) => DriverKind::Transactional,
            ActiveDriver::Snapshot(_) => DriverKind::Snapshot,
        }
    }
}

/// Builds the configured driver on first use and returns the same instance
/// afterwards. Construct one per process and pass it to whoever needs a
/// driver.
pub struct DriverSelector {
    settings: Settings,
    document_client: Option<Arc<dyn DocumentClient>>,
    snapshot_source: Option<Arc<dyn SnapshotSource>>,
    active: OnceCell<ActiveDriver>,
}

impl DriverSelector {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            document_client: None,
            snapshot_source: None,
            active: OnceCell::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(Settings::from_env())
    }

    /// Use this client instead of connecting to MongoDB.
    pub fn with_document_client(mut self, client: Arc<dyn DocumentClient>) -> Self {
        self.document_client = Some(client);
        self
    }

    /// Use this source instead of fetching the snapshot over HTTP.
    pub fn with_snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshot_source = Some(source);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn kind(&self) -> DriverKind {
        self.settings.driver
    }

    pub async fn active(&self) -> Result<&ActiveDriver> {
        self.active.get_or_try_init(|| self.build()).await
    }

    pub async fn driver(&self) -> Result<Arc<dyn DbDriver>> {
        Ok(self.active().await?.driver())
    }

    async fn build(&self) -> Result<ActiveDriver> {
        let active = match self.settings.driver {
            DriverKind::Snapshot => {
                let source: Arc<dyn SnapshotSource> = match &self.snapshot_source {
                    Some(source) => source.clone(),
                    None => Arc::new(HttpSnapshotSource::new(&self.settings.snapshot.base_url)?),
                };
                let driver = SnapshotDriver::connect_with_source(self.settings.snapshot.clone(), source).await?;
                ActiveDriver::Snapshot(Arc::new(driver))
            }
            DriverKind::Transactional => {
                let driver = match &self.document_client {
                    Some(client) => TransactionalDriver::new(client.clone(), self.settings.db_name.clone()),
                    None => self.connect_transactional().await?,
                };
                ActiveDriver::Transactional(Arc::new(driver))
            }
        };
        info!("🏦 Storage driver initialized (using {})", active.driver().name());
        Ok(active)
    }

    #[cfg(feature = "mongodb")]
    async fn connect_transactional(&self) -> Result<TransactionalDriver> {
        use crate::StorageBackend;
        TransactionalDriver::connect(&self.settings).await
    }

    #[cfg(not(feature = "mongodb"))]
    async fn connect_transactional(&self) -> Result<TransactionalDriver> {
        self.settings.connection_string()?;
        Err(Error::Config(
            "The transactional backend needs the `mongodb` feature or an injected document client".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryClient;
    use async_trait::async_trait;
    use nt_core::Document;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl SnapshotSource for CountingSource {
        async fn fetch_table(&self, _table: &str) -> Result<Vec<Document>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_snapshot_driver_is_built_once() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let settings = Settings {
            driver: DriverKind::Snapshot,
            ..Settings::default()
        };
        let selector = DriverSelector::new(settings).with_snapshot_source(source.clone());

        let first = selector.driver().await.unwrap();
        let second = selector.driver().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "snapshot");
        // one fetch per configured table, from the single initial load
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transactional_with_injected_client() {
        let selector = DriverSelector::new(Settings::default()).with_document_client(Arc::new(MemoryClient::new()));
        let active = selector.active().await.unwrap();
        assert_eq!(active.kind(), DriverKind::Transactional);
        assert_eq!(active.driver().name(), "transactional");
    }

    #[tokio::test]
    async fn test_missing_credentials_is_config_error() {
        let selector = DriverSelector::new(Settings::default());
        assert!(matches!(selector.driver().await, Err(Error::Config(_))));
    }
}
