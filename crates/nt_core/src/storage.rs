use async_trait::async_trait;

use crate::document::{Document, Filter};
use crate::Result;

/// Uniform CRUD contract implemented by every storage backend.
///
/// Read-only backends still implement the mutating methods and answer them
/// with [`crate::Error::Unsupported`].
#[async_trait]
pub trait DbDriver: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Insert one document, returning the store-generated identifier.
    async fn insert_one(&self, table: &str, data: Document) -> Result<String>;

    /// Insert many documents. An empty input inserts nothing and returns no ids.
    async fn insert_many(&self, table: &str, data: Vec<Document>) -> Result<Vec<String>>;

    /// First matching document, or `NotFound`.
    async fn get_one(&self, table: &str, filter: &Filter) -> Result<Document>;

    /// All matching documents, or `NotFound` when nothing matches.
    async fn get_many(&self, table: &str, filter: &Filter) -> Result<Vec<Document>>;

    /// Merge `new_data` into the first matching document. Returns how many
    /// documents matched.
    async fn update_one(&self, table: &str, filter: &Filter, new_data: Document) -> Result<u64>;

    /// Merge `new_data` into every matching document. Returns how many matched.
    async fn update_many(&self, table: &str, filter: &Filter, new_data: Document) -> Result<u64>;

    /// `false` when nothing was deleted.
    async fn delete_one(&self, table: &str, filter: &Filter) -> Result<bool>;

    /// Number of deleted documents.
    async fn delete_many(&self, table: &str, filter: &Filter) -> Result<u64>;

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64>;

    async fn exists(&self, table: &str, filter: &Filter) -> Result<bool>;
}
