//! Remote origin of the snapshot tables.

use async_trait::async_trait;
use nt_core::{Document, Error, Result};
use reqwest::Client;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch every document of `table`, in published order.
    async fn fetch_table(&self, table: &str) -> Result<Vec<Document>>;
}

/// Reads `{base_url}{table}.json`, expecting a JSON array of objects.
pub struct HttpSnapshotSource {
    client: Client,
    base_url: String,
}

impl HttpSnapshotSource {
    pub fn new(base_url: &str) -> Result<Self> {
        Url::parse(base_url).map_err(|e| Error::Config(format!("Invalid snapshot base url `{}`: {}", base_url, e)))?;
        Ok(Self {
            client: Client::new(),
            base_url: base_url.to_string(),
        })
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}{}.json", self.base_url, table)
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_table(&self, table: &str) -> Result<Vec<Document>> {
        let url = self.table_url(table);
        debug!("Trying to get snapshot data for `{}` from {}", table, url);
        let fail = |e: reqwest::Error| Error::Connect(format!("Error getting snapshot data for `{}`: {}", table, e));
        let response = self.client.get(&url).send().await.map_err(fail)?;
        let response = response.error_for_status().map_err(fail)?;
        response.json::<Vec<Document>>().await.map_err(fail)
    }
}
