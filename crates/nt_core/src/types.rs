use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub article_id: String,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub content: String,
    pub collecting_time: DateTime<Utc>,
    #[serde(default)]
    pub publishing_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(domain: `{}`, url: `{}`, title: `{}`)", self.domain, self.url, self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: String,
    pub articles_id: Vec<String>,
    pub main_article_id: String,
    pub creation_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub domains: Vec<String>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

impl Cluster {
    pub fn contains(&self, article_id: &str) -> bool {
        self.articles_id.iter().any(|id| id == article_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Failed,
    FailedConstantly,
    FailedGetUrl,
    Succeeded,
    Unwanted,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Failed => "failed",
            TaskStatus::FailedConstantly => "failed_constantly",
            TaskStatus::FailedGetUrl => "failed_get_url",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Unwanted => "unwanted",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a task's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTimestamp {
    pub status: TaskStatus,
    pub time_changed: DateTime<Utc>,
    #[serde(default)]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub url: String,
    pub domain: String,
    pub status: TaskStatus,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub status_timestamp: Vec<StatusTimestamp>,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
}
