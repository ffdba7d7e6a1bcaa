use std::sync::Arc;

use nt_core::{DbDriver, Document, Filter, Result};
use serde_json::Value;
use tracing::{info, warn};

/// Table-agnostic maintenance helpers.
#[derive(Clone)]
pub struct GeneralRecords {
    db: Arc<dyn DbDriver>,
}

impl GeneralRecords {
    pub fn new(db: Arc<dyn DbDriver>) -> Self {
        Self { db }
    }

    pub async fn get_all_collection_data(&self, table: &str) -> Result<Vec<Document>> {
        self.db.get_many(table, &Filter::new()).await
    }

    /// Distinct values of `field`, in first-seen order. Rows without the
    /// field are skipped.
    pub async fn get_all_unique_values_by_field(&self, table: &str, field: &str) -> Result<Vec<Value>> {
        let mut unique: Vec<Value> = Vec::new();
        for row in self.get_all_collection_data(table).await? {
            match row.get(field) {
                Some(value) if !unique.contains(value) => unique.push(value.clone()),
                Some(_) => {}
                None => warn!("Row in `{}` has no `{}` field", table, field),
            }
        }
        Ok(unique)
    }

    /// Keeps one row per distinct `field` value and returns how many rows
    /// were deleted.
    #[tracing::instrument(skip(self))]
    pub async fn remove_duplicates_by_field(&self, table: &str, field: &str) -> Result<u64> {
        let mut removed = 0;
        for value in self.get_all_unique_values_by_field(table, field).await? {
            let mut filter = Filter::new();
            filter.insert(field.to_string(), value.clone());

            let mut count = self.db.count(table, &filter).await?;
            info!("Found {} of data filter: {}:{}", count, field, value);
            while count > 1 {
                if !self.db.delete_one(table, &filter).await? {
                    break;
                }
                removed += 1;
                count -= 1;
            }
        }
        Ok(removed)
    }
}
