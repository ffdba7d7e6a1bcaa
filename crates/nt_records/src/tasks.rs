use std::sync::Arc;

use chrono::Utc;
use nt_core::config::DEFAULT_MAX_TIME_FAILED;
use nt_core::document::document;
use nt_core::{from_document, tables, to_document, DbDriver, Error, Result, RetryBudget};
use nt_core::{StatusTimestamp, Task, TaskStatus};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::retry::retry_bounded;

#[derive(Clone)]
pub struct TaskRecords {
    db: Arc<dyn DbDriver>,
    retry: RetryBudget,
    max_time_failed: u32,
}

impl TaskRecords {
    pub fn new(db: Arc<dyn DbDriver>, retry: RetryBudget) -> Self {
        Self {
            db,
            retry,
            max_time_failed: DEFAULT_MAX_TIME_FAILED,
        }
    }

    pub fn with_max_time_failed(mut self, max_time_failed: u32) -> Self {
        self.max_time_failed = max_time_failed;
        self
    }

    /// Inserts a pending task whose history starts with the pending entry.
    /// Each attempt gets a fresh task id.
    #[tracing::instrument(skip(self))]
    pub async fn create_new_task(&self, url: &str, domain: &str, task_type: &str) -> Result<Task> {
        let attempts = self.retry.create_task;
        let (task, inserted) = retry_bounded("create new task", attempts, move || async move {
            let creation_time = Utc::now();
            let task = Task {
                task_id: Uuid::new_v4().to_string(),
                url: url.to_string(),
                domain: domain.to_string(),
                status: TaskStatus::Pending,
                task_type: task_type.to_string(),
                status_timestamp: vec![StatusTimestamp {
                    status: TaskStatus::Pending,
                    time_changed: creation_time,
                    desc: None,
                }],
                creation_time: Some(creation_time),
            };
            let inserted = self.db.insert_one(tables::TASKS, to_document(&task)?).await?;
            Ok::<_, Error>((task, inserted))
        })
        .await
        .map_err(|e| Error::Insert(format!("Error creating new task into db after {} tries - {}", attempts, e)))?;
        info!("Created new task inserted_id: `{}`, task_id: `{}`", inserted, task.task_id);
        Ok(task)
    }

    /// Records a transition: appends to the history and sets the status in a
    /// single update. `task` is only changed once the store accepted it.
    #[tracing::instrument(skip(self, task), fields(task_id = %task.task_id))]
    pub async fn update_task_status(&self, task: &mut Task, status: TaskStatus, desc: Option<&str>) -> Result<()> {
        let mut history = task.status_timestamp.clone();
        history.push(StatusTimestamp {
            status,
            time_changed: Utc::now(),
            desc: desc.map(str::to_string),
        });

        let filter = document(json!({"task_id": task.task_id}));
        let new_data = document(json!({"status": status, "status_timestamp": history}));
        if let Err(e) = self.db.update_one(tables::TASKS, &filter, new_data).await {
            error!("Error updating task task_id: `{}` as status: `{}`", task.task_id, status);
            return Err(e);
        }

        task.status = status;
        task.status_timestamp = history;
        Ok(())
    }

    pub async fn get_task_by_status(&self, status: TaskStatus) -> Result<Option<Task>> {
        debug!("Trying get task by status: `{}`", status);
        match self.db.get_one(tables::TASKS, &document(json!({"status": status}))).await {
            Ok(data) => Ok(Some(from_document(data)?)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The next task to work on: a pending one, else a failed one.
    pub async fn get_new_task(&self) -> Result<Option<Task>> {
        for status in [TaskStatus::Pending, TaskStatus::Failed] {
            if let Some(task) = self.get_task_by_status(status).await? {
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    pub async fn get_unwanted_tasks_by_domain(&self, domain: &str) -> Result<Vec<Task>> {
        let filter = document(json!({"status": TaskStatus::Unwanted, "domain": domain}));
        self.load_all(&filter).await
    }

    pub async fn get_tasks_by_url(&self, url: &str) -> Result<Vec<Task>> {
        self.load_all(&document(json!({"url": url}))).await
    }

    async fn load_all(&self, filter: &nt_core::Filter) -> Result<Vec<Task>> {
        match self.db.get_many(tables::TASKS, filter).await {
            Ok(tasks) => tasks.into_iter().map(from_document).collect(),
            Err(Error::NotFound(e)) => {
                warn!("Didn't find any task - {}", e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// How many times the task went through `failed`.
    pub fn count_failures(task: &Task) -> usize {
        task.status_timestamp
            .iter()
            .filter(|timestamp| timestamp.status == TaskStatus::Failed)
            .count()
    }

    /// Whether the task failed often enough to be marked `failed_constantly`.
    pub fn reached_failure_limit(&self, task: &Task) -> bool {
        Self::count_failures(task) >= self.max_time_failed as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_history(statuses: &[TaskStatus]) -> Task {
        Task {
            task_id: "t1".to_string(),
            url: "https://example.com/a".to_string(),
            domain: "example.com".to_string(),
            status: *statuses.last().unwrap_or(&TaskStatus::Pending),
            task_type: "scrape_article".to_string(),
            status_timestamp: statuses
                .iter()
                .map(|status| StatusTimestamp {
                    status: *status,
                    time_changed: Utc::now(),
                    desc: None,
                })
                .collect(),
            creation_time: None,
        }
    }

    #[test]
    fn test_count_failures_only_counts_failed() {
        let task = task_with_history(&[
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Failed,
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::FailedGetUrl,
            TaskStatus::Failed,
        ]);
        assert_eq!(TaskRecords::count_failures(&task), 2);
    }
}
