//! Cluster bookkeeping.
//!
//! Articles and clusters reference each other by id only: `cluster_id` on the
//! article, `articles_id` on the cluster. Every write that touches both sides
//! updates the cluster first and back-links the article second, so an
//! interrupted sequence leaves a cluster listing an article that does not yet
//! point back, never the reverse.

use std::sync::Arc;

use chrono::Utc;
use nt_core::document::document;
use nt_core::{from_document, tables, to_document, Article, Cluster, DbDriver, Error, Result, RetryBudget};
use rand::seq::SliceRandom;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::articles::ArticleRecords;
use crate::retry::retry_bounded;

#[derive(Clone)]
pub struct ClusterRecords {
    db: Arc<dyn DbDriver>,
    retry: RetryBudget,
    articles: ArticleRecords,
}

impl ClusterRecords {
    pub fn new(db: Arc<dyn DbDriver>, retry: RetryBudget) -> Self {
        let articles = ArticleRecords::new(db.clone(), retry);
        Self { db, retry, articles }
    }

    /// Creates a cluster seeded with `article` and points the article at it.
    ///
    /// Not atomic: if the back-link fails after the insert, the cluster stays
    /// in place and the error is reported as [`Error::CreateCluster`].
    #[tracing::instrument(skip(self, article, categories), fields(article_id = %article.article_id))]
    pub async fn create_new_cluster(&self, article: &Article, categories: Option<Vec<String>>) -> Result<Cluster> {
        let now = Utc::now();
        let cluster = Cluster {
            cluster_id: Uuid::new_v4().to_string(),
            articles_id: vec![article.article_id.clone()],
            main_article_id: article.article_id.clone(),
            creation_time: now,
            last_updated: now,
            domains: vec![article.domain.clone()],
            categories: Some(categories.unwrap_or_default()),
        };
        let data = to_document(&cluster)?;

        let inserted = retry_bounded("insert cluster", self.retry.insert_cluster, || {
            self.db.insert_one(tables::CLUSTERS, data.clone())
        })
        .await
        .map_err(|e| Error::CreateCluster(format!("Error insert cluster - {}", e)))?;
        info!("Inserted cluster inserted_id: `{}`, cluster_id: `{}`", inserted, cluster.cluster_id);

        self.articles
            .update_cluster_id(&article.article_id, &cluster.cluster_id)
            .await
            .map_err(|e| {
                Error::CreateCluster(format!(
                    "Cluster `{}` inserted but article `{}` was not linked - {}",
                    cluster.cluster_id, article.article_id, e
                ))
            })?;
        Ok(cluster)
    }

    /// Adds `article` to the cluster. Returns `false` when it was already a
    /// member; nothing is written in that case, not even the article's
    /// back-link.
    #[tracing::instrument(skip(self, article), fields(article_id = %article.article_id))]
    pub async fn add_article_to_cluster(&self, cluster_id: &str, article: &Article) -> Result<bool> {
        let mut cluster = self.get_cluster(cluster_id).await?;
        if cluster.contains(&article.article_id) {
            debug!("Article `{}` already in cluster `{}`", article.article_id, cluster_id);
            return Ok(false);
        }

        cluster.articles_id.push(article.article_id.clone());
        if !cluster.domains.contains(&article.domain) {
            cluster.domains.push(article.domain.clone());
        }
        cluster.last_updated = Utc::now();

        let filter = document(json!({"cluster_id": cluster_id}));
        let attempts = self.retry.update_cluster;
        retry_bounded("update cluster members", attempts, || {
            let new_data = document(json!({
                "articles_id": cluster.articles_id,
                "domains": cluster.domains,
                "last_updated": cluster.last_updated,
            }));
            self.db.update_one(tables::CLUSTERS, &filter, new_data)
        })
        .await
        .map_err(|e| Error::Update(format!("Error updating cluster `{}` after {} tries - {}", cluster_id, attempts, e)))?;
        info!("Added article `{}` to cluster `{}`", article.article_id, cluster_id);

        self.articles.update_cluster_id(&article.article_id, cluster_id).await?;
        Ok(true)
    }

    /// Removes `article_id` from the cluster, electing a random new main
    /// article when needed. Returns `false` when the cluster or the membership
    /// does not exist. Removing the last member is refused with
    /// [`Error::InvalidState`]; the caller should delete the cluster instead.
    #[tracing::instrument(skip(self))]
    pub async fn remove_article_from_cluster(&self, cluster_id: &str, article_id: &str) -> Result<bool> {
        let cluster = match self.get_cluster(cluster_id).await {
            Ok(cluster) => cluster,
            Err(Error::NotFound(e)) => {
                warn!("Cannot remove article from missing cluster - {}", e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if !cluster.contains(article_id) {
            warn!("Article `{}` is not a member of cluster `{}`", article_id, cluster_id);
            return Ok(false);
        }

        let remaining: Vec<String> = cluster.articles_id.into_iter().filter(|id| id != article_id).collect();
        if remaining.is_empty() {
            return Err(Error::InvalidState(format!(
                "Cluster `{}` would be left without members",
                cluster_id
            )));
        }

        let mut new_data = document(json!({
            "articles_id": remaining,
            "last_updated": Utc::now(),
        }));
        if cluster.main_article_id == article_id {
            let main = remaining
                .choose(&mut rand::thread_rng())
                .cloned()
                .unwrap_or_default();
            info!("Replacing main article of cluster `{}` with `{}`", cluster_id, main);
            new_data.insert("main_article_id".to_string(), json!(main));
        }

        self.db
            .update_one(tables::CLUSTERS, &document(json!({"cluster_id": cluster_id})), new_data)
            .await?;
        Ok(true)
    }

    pub async fn get_cluster(&self, cluster_id: &str) -> Result<Cluster> {
        let data = self
            .db
            .get_one(tables::CLUSTERS, &document(json!({"cluster_id": cluster_id})))
            .await?;
        from_document(data)
    }

    pub async fn get_all_clusters(&self) -> Result<Vec<Cluster>> {
        self.db
            .get_many(tables::CLUSTERS, &Default::default())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn delete_cluster(&self, cluster_id: &str) -> Result<bool> {
        let deleted = self
            .db
            .delete_one(tables::CLUSTERS, &document(json!({"cluster_id": cluster_id})))
            .await?;
        if deleted {
            info!("Deleted cluster `{}`", cluster_id);
        }
        Ok(deleted)
    }
}
