use std::sync::Arc;

use nt_core::document::document;
use nt_core::{from_document, tables, to_document, Article, DbDriver, Error, Filter, Result, RetryBudget};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use tracing::{info, warn};

use crate::clusters::ClusterRecords;
use crate::retry::retry_bounded;

/// Outcome of a bulk article deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub articles_deleted: usize,
    pub detached_from_clusters: usize,
    pub clusters_deleted: usize,
}

#[derive(Clone)]
pub struct ArticleRecords {
    db: Arc<dyn DbDriver>,
    retry: RetryBudget,
}

impl ArticleRecords {
    pub fn new(db: Arc<dyn DbDriver>, retry: RetryBudget) -> Self {
        Self { db, retry }
    }

    #[tracing::instrument(skip(self, article), fields(article_id = %article.article_id))]
    pub async fn insert_article(&self, article: &Article) -> Result<()> {
        let data = to_document(article)?;
        let attempts = self.retry.insert_article;
        let inserted = retry_bounded("insert article", attempts, || {
            self.db.insert_one(tables::ARTICLES, data.clone())
        })
        .await
        .map_err(|e| Error::Insert(format!("Error inserting article into db after {} tries - {}", attempts, e)))?;
        info!("Inserted article inserted_id: `{}`, article_id: `{}`", inserted, article.article_id);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_cluster_id(&self, article_id: &str, cluster_id: &str) -> Result<()> {
        let filter = document(json!({"article_id": article_id}));
        let attempts = self.retry.update_cluster_id;
        retry_bounded("update article cluster id", attempts, || {
            self.db
                .update_one(tables::ARTICLES, &filter, document(json!({"cluster_id": cluster_id})))
        })
        .await
        .map_err(|e| {
            Error::Update(format!(
                "Error updating article `{}` cluster id after {} tries - {}",
                article_id, attempts, e
            ))
        })?;
        info!("Updated article article_id: `{}`, cluster_id: `{}`", article_id, cluster_id);
        Ok(())
    }

    /// An article with no cluster yet, optionally narrowed by `required`.
    /// Picks the first match in store order, or a uniformly random one.
    #[tracing::instrument(skip(self, required))]
    pub async fn get_unclassified_article(&self, required: Option<Filter>, random: bool) -> Result<Article> {
        let mut filter = document(json!({"cluster_id": null}));
        if let Some(required) = required {
            filter.extend(required);
        }

        let article = if random {
            let mut articles = self.db.get_many(tables::ARTICLES, &filter).await?;
            let index = rand::thread_rng().gen_range(0..articles.len());
            articles.swap_remove(index)
        } else {
            self.db.get_one(tables::ARTICLES, &filter).await?
        };
        from_document(article)
    }

    pub async fn get_article_by_id(&self, article_id: &str) -> Result<Option<Article>> {
        self.find_article(document(json!({"article_id": article_id}))).await
    }

    pub async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>> {
        self.find_article(document(json!({"url": url}))).await
    }

    async fn find_article(&self, filter: Filter) -> Result<Option<Article>> {
        match self.db.get_one(tables::ARTICLES, &filter).await {
            Ok(data) => {
                let article: Article = from_document(data)?;
                info!("Got article from db, article_id: `{}`, url: `{}`", article.article_id, article.url);
                Ok(Some(article))
            }
            Err(Error::NotFound(e)) => {
                warn!("Error get article - {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_articles(&self, articles_id: &[String]) -> Result<Vec<Article>> {
        let filter = document(json!({"article_id": {"$in": articles_id}}));
        self.load_all(&filter).await
    }

    /// Articles for the given urls; no match yields an empty list.
    pub async fn get_articles_by_urls(&self, urls: &[String]) -> Result<Vec<Article>> {
        let filter = document(json!({"url": {"$in": urls}}));
        match self.load_all(&filter).await {
            Err(Error::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    pub async fn get_all_articles(&self, filter: Option<Filter>) -> Result<Vec<Article>> {
        self.load_all(&filter.unwrap_or_default()).await
    }

    async fn load_all(&self, filter: &Filter) -> Result<Vec<Article>> {
        self.db
            .get_many(tables::ARTICLES, filter)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn delete_article(&self, article_id: &str) -> Result<bool> {
        let deleted = self
            .db
            .delete_one(tables::ARTICLES, &document(json!({"article_id": article_id})))
            .await?;
        if deleted {
            info!("Deleted article by id: `{}`", article_id);
        } else {
            warn!("Error to delete article by id: `{}`", article_id);
        }
        Ok(deleted)
    }

    /// Deletes `amount` randomly chosen articles matching `filter`, detaching
    /// each from its cluster. A cluster whose last member goes is deleted too.
    #[tracing::instrument(skip(self, filter))]
    pub async fn delete_random_articles(&self, amount: usize, filter: Option<Filter>) -> Result<DeletionSummary> {
        let articles = self.get_all_articles(filter).await?;
        if amount > articles.len() {
            warn!("Asked to delete {} articles but only {} match", amount, articles.len());
        }
        let chosen: Vec<Article> = articles
            .choose_multiple(&mut rand::thread_rng(), amount)
            .cloned()
            .collect();

        let clusters = ClusterRecords::new(self.db.clone(), self.retry);
        let mut summary = DeletionSummary::default();
        for article in chosen {
            if !self.delete_article(&article.article_id).await? {
                continue;
            }
            summary.articles_deleted += 1;
            let Some(cluster_id) = article.cluster_id.as_deref() else {
                continue;
            };
            match clusters.remove_article_from_cluster(cluster_id, &article.article_id).await {
                Ok(true) => summary.detached_from_clusters += 1,
                Ok(false) => {}
                Err(Error::InvalidState(reason)) => {
                    info!("Cluster `{}` left empty ({}), deleting it", cluster_id, reason);
                    summary.detached_from_clusters += 1;
                    if clusters.delete_cluster(cluster_id).await? {
                        summary.clusters_deleted += 1;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Deleted {} articles, delete from clusters: {}, clusters removed: {}",
            summary.articles_deleted, summary.detached_from_clusters, summary.clusters_deleted
        );
        Ok(summary)
    }
}

