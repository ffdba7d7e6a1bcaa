//! Driver backed by an external document database.
//!
//! Every driver call maps onto exactly one [`DocumentClient`] call. Client
//! failures arrive as `anyhow::Error` and are logged and wrapped into the
//! matching [`nt_core::Error`] kind here, so callers never see them raw.

use std::sync::Arc;

use async_trait::async_trait;
use nt_core::{DbDriver, Document, Error, Filter, Result};
use tracing::{debug, error, info, warn};

/// Operations the driver needs from the document database client.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    async fn insert_one(&self, collection: &str, document: Document) -> anyhow::Result<String>;
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> anyhow::Result<Vec<String>>;
    async fn find_one(&self, collection: &str, filter: &Filter) -> anyhow::Result<Option<Document>>;
    async fn find(&self, collection: &str, filter: &Filter) -> anyhow::Result<Vec<Document>>;
    /// `$set`-merge into the first match; returns the matched count.
    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> anyhow::Result<u64>;
    /// `$set`-merge into every match; returns the matched count.
    async fn update_many(&self, collection: &str, filter: &Filter, set: Document) -> anyhow::Result<u64>;
    async fn delete_one(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64>;
    async fn delete_many(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64>;
    async fn count_documents(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64>;
}

pub struct TransactionalDriver {
    client: Arc<dyn DocumentClient>,
    db_name: String,
}

impl TransactionalDriver {
    pub fn new(client: Arc<dyn DocumentClient>, db_name: impl Into<String>) -> Self {
        let db_name = db_name.into();
        debug!("Transactional driver ready for db: '{}'", db_name);
        Self { client, db_name }
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

#[async_trait]
impl DbDriver for TransactionalDriver {
    fn name(&self) -> &'static str {
        "transactional"
    }

    #[tracing::instrument(skip(self, data), fields(db = %self.db_name))]
    async fn insert_one(&self, table: &str, data: Document) -> Result<String> {
        debug!("Trying to insert data to table: '{}'", table);
        match self.client.insert_one(table, data).await {
            Ok(id) => {
                info!("Successfully inserted data to db, object id: '{}'", id);
                Ok(id)
            }
            Err(e) => {
                let desc = format!("Error insert data to table: '{}', db: '{}' - {}", table, self.db_name, e);
                error!("{}", desc);
                Err(Error::Insert(desc))
            }
        }
    }

    #[tracing::instrument(skip(self, data), fields(db = %self.db_name, count = data.len()))]
    async fn insert_many(&self, table: &str, data: Vec<Document>) -> Result<Vec<String>> {
        if data.is_empty() {
            warn!("Error insert many to db, data list is empty");
            return Ok(Vec::new());
        }
        debug!("Trying to insert {} to table: '{}'", data.len(), table);
        match self.client.insert_many(table, data).await {
            Ok(ids) => {
                info!("Successfully inserted {} documents to table: '{}'", ids.len(), table);
                Ok(ids)
            }
            Err(e) => {
                let desc = format!("Error insert many to table: '{}', db: '{}' - {}", table, self.db_name, e);
                error!("{}", desc);
                Err(Error::Insert(desc))
            }
        }
    }

    #[tracing::instrument(skip(self, filter), fields(db = %self.db_name))]
    async fn get_one(&self, table: &str, filter: &Filter) -> Result<Document> {
        debug!("Trying to get one data from table: '{}'", table);
        match self.client.find_one(table, filter).await {
            Ok(Some(document)) => {
                info!("Got data from db: '{}', table_name: '{}'", self.db_name, table);
                Ok(document)
            }
            Ok(None) => {
                let desc = format!(
                    "Error find data with filter: {:?}, table: '{}', db: '{}'",
                    filter, table, self.db_name
                );
                warn!("{}", desc);
                Err(Error::NotFound(desc))
            }
            Err(e) => {
                let desc = format!("Error get one from table: '{}' - {}", table, e);
                error!("{}", desc);
                Err(Error::Database(desc))
            }
        }
    }

    #[tracing::instrument(skip(self, filter), fields(db = %self.db_name))]
    async fn get_many(&self, table: &str, filter: &Filter) -> Result<Vec<Document>> {
        debug!("Trying to get many data from table: '{}'", table);
        match self.client.find(table, filter).await {
            Ok(documents) if !documents.is_empty() => {
                info!("Got {} data from db: '{}', table_name: '{}'", documents.len(), self.db_name, table);
                Ok(documents)
            }
            Ok(_) => {
                let desc = format!(
                    "Error find data with filter: {:?}, table: '{}', db: '{}'",
                    filter, table, self.db_name
                );
                warn!("{}", desc);
                Err(Error::NotFound(desc))
            }
            Err(e) => {
                let desc = format!("Error get many from table: '{}' - {}", table, e);
                error!("{}", desc);
                Err(Error::Database(desc))
            }
        }
    }

    #[tracing::instrument(skip(self, filter, new_data), fields(db = %self.db_name))]
    async fn update_one(&self, table: &str, filter: &Filter, new_data: Document) -> Result<u64> {
        debug!("Trying to update one data from table: '{}'", table);
        match self.client.update_one(table, filter, new_data).await {
            Ok(matched) => {
                if matched == 0 {
                    warn!("Update matched nothing with filter: {:?}, table: '{}'", filter, table);
                } else {
                    info!("Updated one data from db: '{}', table_name: '{}'", self.db_name, table);
                }
                Ok(matched)
            }
            Err(e) => {
                let desc = format!("Error update data with filter: {:?}, table: '{}' - {}", filter, table, e);
                error!("{}", desc);
                Err(Error::Update(desc))
            }
        }
    }

    #[tracing::instrument(skip(self, filter, new_data), fields(db = %self.db_name))]
    async fn update_many(&self, table: &str, filter: &Filter, new_data: Document) -> Result<u64> {
        debug!("Trying to update {} fields in table: '{}'", new_data.len(), table);
        match self.client.update_many(table, filter, new_data).await {
            Ok(matched) => {
                info!("Updated {} records from db: '{}', table_name: '{}'", matched, self.db_name, table);
                Ok(matched)
            }
            Err(e) => {
                let desc = format!("Error update data with filter: {:?}, table: '{}' - {}", filter, table, e);
                error!("{}", desc);
                Err(Error::Update(desc))
            }
        }
    }

    #[tracing::instrument(skip(self, filter), fields(db = %self.db_name))]
    async fn delete_one(&self, table: &str, filter: &Filter) -> Result<bool> {
        debug!("Trying to delete one data from table: '{}'", table);
        match self.client.delete_one(table, filter).await {
            Ok(0) => {
                warn!("Nothing deleted with filter: {:?}, table: '{}'", filter, table);
                Ok(false)
            }
            Ok(_) => {
                info!("Deleted data from db: '{}', table_name: '{}'", self.db_name, table);
                Ok(true)
            }
            Err(e) => {
                let desc = format!("Error delete one from table: '{}' - {}", table, e);
                error!("{}", desc);
                Err(Error::Delete(desc))
            }
        }
    }

    #[tracing::instrument(skip(self, filter), fields(db = %self.db_name))]
    async fn delete_many(&self, table: &str, filter: &Filter) -> Result<u64> {
        debug!("Trying to delete collection of data from table: '{}'", table);
        match self.client.delete_many(table, filter).await {
            Ok(deleted) => {
                info!("Deleted {} records from db: '{}', table_name: '{}'", deleted, self.db_name, table);
                Ok(deleted)
            }
            Err(e) => {
                let desc = format!("Error delete many from table: '{}' - {}", table, e);
                error!("{}", desc);
                Err(Error::Delete(desc))
            }
        }
    }

    #[tracing::instrument(skip(self, filter), fields(db = %self.db_name))]
    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        debug!("Trying to count table: '{}'", table);
        self.client.count_documents(table, filter).await.map_err(|e| {
            let desc = format!("Error counting from table: '{}' - {}", table, e);
            error!("{}", desc);
            Error::Database(desc)
        })
    }

    async fn exists(&self, table: &str, filter: &Filter) -> Result<bool> {
        Ok(self.count(table, filter).await? > 0)
    }
}
