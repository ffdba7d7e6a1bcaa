#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use nt_core::{Article, DbDriver, Document, Filter, RetryBudget};
use nt_storage::{DocumentClient, MemoryClient, TransactionalDriver};

/// Memory client whose first `n` inserts and updates fail.
pub struct FlakyClient {
    pub inner: MemoryClient,
    insert_failures: AtomicUsize,
    update_failures: AtomicUsize,
    pub insert_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
}

impl FlakyClient {
    pub fn new(inner: MemoryClient, insert_failures: usize, update_failures: usize) -> Self {
        Self {
            inner,
            insert_failures: AtomicUsize::new(insert_failures),
            update_failures: AtomicUsize::new(update_failures),
            insert_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
        }
    }

    /// Makes the next `n` updates fail, whatever was configured at construction.
    pub fn fail_next_updates(&self, n: usize) {
        self.update_failures.store(n, Ordering::SeqCst);
    }

    fn should_fail(budget: &AtomicUsize) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentClient for FlakyClient {
    async fn insert_one(&self, collection: &str, document: Document) -> anyhow::Result<String> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if Self::should_fail(&self.insert_failures) {
            return Err(anyhow!("insert timed out"));
        }
        self.inner.insert_one(collection, document).await
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> anyhow::Result<Vec<String>> {
        self.inner.insert_many(collection, documents).await
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> anyhow::Result<Option<Document>> {
        self.inner.find_one(collection, filter).await
    }

    async fn find(&self, collection: &str, filter: &Filter) -> anyhow::Result<Vec<Document>> {
        self.inner.find(collection, filter).await
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> anyhow::Result<u64> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if Self::should_fail(&self.update_failures) {
            return Err(anyhow!("update timed out"));
        }
        self.inner.update_one(collection, filter, set).await
    }

    async fn update_many(&self, collection: &str, filter: &Filter, set: Document) -> anyhow::Result<u64> {
        self.inner.update_many(collection, filter, set).await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        self.inner.delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        self.inner.delete_many(collection, filter).await
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        self.inner.count_documents(collection, filter).await
    }
}

pub fn memory_driver() -> (MemoryClient, Arc<dyn DbDriver>) {
    let client = MemoryClient::new();
    let driver = TransactionalDriver::new(Arc::new(client.clone()), "test");
    (client, Arc::new(driver))
}

pub fn flaky_driver(insert_failures: usize, update_failures: usize) -> (Arc<FlakyClient>, Arc<dyn DbDriver>) {
    let client = Arc::new(FlakyClient::new(MemoryClient::new(), insert_failures, update_failures));
    let driver = TransactionalDriver::new(client.clone(), "test");
    (client, Arc::new(driver))
}

pub fn retry() -> RetryBudget {
    RetryBudget::default()
}

pub fn article(id: &str, domain: &str) -> Article {
    Article {
        article_id: id.to_string(),
        url: format!("https://{}/{}", domain, id),
        domain: domain.to_string(),
        title: format!("title {}", id),
        content: format!("content {}", id),
        collecting_time: Utc.with_ymd_and_hms(2023, 5, 4, 12, 0, 0).unwrap(),
        publishing_time: None,
        cluster_id: None,
        task_id: None,
        images: None,
    }
}
