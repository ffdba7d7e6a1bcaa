use async_trait::async_trait;
use nt_core::document::STORE_ID_KEY;
use nt_core::filter::matches_nullable;
use nt_core::{Document, Filter};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backends::transactional::DocumentClient;

/// In-process document store with the same matching rules as the external
/// database. Backs local runs and tests of the transactional driver.
#[derive(Clone, Default)]
pub struct MemoryClient {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a collection in insertion order.
    pub async fn dump(&self, collection: &str) -> Vec<Document> {
        let collections = self.collections.read().await;
        collections.get(collection).cloned().unwrap_or_default()
    }

    fn assign_id(document: &mut Document) -> String {
        match document.get(STORE_ID_KEY).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                document.insert(STORE_ID_KEY.to_string(), Value::String(id.clone()));
                id
            }
        }
    }

    async fn update(&self, collection: &str, filter: &Filter, set: Document, limit: Option<usize>) -> u64 {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return 0;
        };
        let mut matched = 0;
        for document in documents.iter_mut().filter(|d| matches_nullable(d, filter)) {
            if limit.map_or(false, |limit| matched >= limit) {
                break;
            }
            for (key, value) in &set {
                document.insert(key.clone(), value.clone());
            }
            matched += 1;
        }
        matched as u64
    }

    async fn delete(&self, collection: &str, filter: &Filter, limit: Option<usize>) -> u64 {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(collection) else {
            return 0;
        };
        let mut deleted = 0;
        documents.retain(|document| {
            let within_limit = limit.map_or(true, |limit| deleted < limit);
            if within_limit && matches_nullable(document, filter) {
                deleted += 1;
                false
            } else {
                true
            }
        });
        deleted as u64
    }
}

#[async_trait]
impl DocumentClient for MemoryClient {
    async fn insert_one(&self, collection: &str, mut document: Document) -> anyhow::Result<String> {
        let id = Self::assign_id(&mut document);
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().push(document);
        Ok(id)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> anyhow::Result<Vec<String>> {
        let mut collections = self.collections.write().await;
        let target = collections.entry(collection.to_string()).or_default();
        let mut ids = Vec::with_capacity(documents.len());
        for mut document in documents {
            ids.push(Self::assign_id(&mut document));
            target.push(document);
        }
        Ok(ids)
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> anyhow::Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.iter().find(|d| matches_nullable(d, filter)).cloned()))
    }

    async fn find(&self, collection: &str, filter: &Filter) -> anyhow::Result<Vec<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|documents| documents.iter().filter(|d| matches_nullable(d, filter)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> anyhow::Result<u64> {
        Ok(self.update(collection, filter, set, Some(1)).await)
    }

    async fn update_many(&self, collection: &str, filter: &Filter, set: Document) -> anyhow::Result<u64> {
        Ok(self.update(collection, filter, set, None).await)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        Ok(self.delete(collection, filter, Some(1)).await)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        Ok(self.delete(collection, filter, None).await)
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        Ok(self.find(collection, filter).await?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_core::document::document;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_client() {
        let client = MemoryClient::new();
        client
            .insert_many(
                "tasks",
                vec![
                    document(json!({"task_id": "t1", "status": "pending"})),
                    document(json!({"task_id": "t2", "status": "pending"})),
                    document(json!({"task_id": "t3", "status": "failed"})),
                ],
            )
            .await
            .unwrap();

        let pending = document(json!({"status": "pending"}));
        assert_eq!(client.count_documents("tasks", &pending).await.unwrap(), 2);

        let updated = client
            .update_one("tasks", &pending, document(json!({"status": "running"})))
            .await
            .unwrap();
        assert_eq!(updated, 1);
        let first = client.find_one("tasks", &document(json!({"task_id": "t1"}))).await.unwrap().unwrap();
        assert_eq!(first["status"], json!("running"));

        assert_eq!(client.delete_many("tasks", &Filter::new()).await.unwrap(), 3);
        assert!(client.dump("tasks").await.is_empty());
    }

    #[tokio::test]
    async fn test_null_filter_matches_missing_field() {
        let client = MemoryClient::new();
        client.insert_one("articles", document(json!({"article_id": "a1"}))).await.unwrap();
        client
            .insert_one("articles", document(json!({"article_id": "a2", "cluster_id": "c1"})))
            .await
            .unwrap();
        let unclassified = client.find("articles", &document(json!({"cluster_id": null}))).await.unwrap();
        assert_eq!(unclassified.len(), 1);
        assert_eq!(unclassified[0]["article_id"], json!("a1"));
    }
}
