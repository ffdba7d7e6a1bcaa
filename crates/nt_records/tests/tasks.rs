mod common;

use std::sync::atomic::Ordering;

use common::{flaky_driver, memory_driver, retry};
use nt_core::{from_document, tables, Error, Task, TaskStatus};
use nt_records::TaskRecords;

#[tokio::test]
async fn test_new_task_starts_pending() {
    let (client, db) = memory_driver();
    let tasks = TaskRecords::new(db, retry());

    let task = tasks
        .create_new_task("https://ynet.co.il/a1", "ynet.co.il", "scrape_article")
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.status_timestamp.len(), 1);
    assert_eq!(task.status_timestamp[0].status, TaskStatus::Pending);
    assert_eq!(Some(task.status_timestamp[0].time_changed), task.creation_time);

    let stored = client.dump(tables::TASKS).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["type"], "scrape_article");
    let stored: Task = from_document(stored[0].clone()).unwrap();
    assert_eq!(stored, task);
}

#[tokio::test]
async fn test_create_task_is_retried() {
    let (client, db) = flaky_driver(2, 0);
    let tasks = TaskRecords::new(db.clone(), retry());
    tasks.create_new_task("https://bbc.com/x", "bbc.com", "collect_urls").await.unwrap();
    assert_eq!(client.insert_calls.load(Ordering::SeqCst), 3);

    let (_, db) = flaky_driver(3, 0);
    let tasks = TaskRecords::new(db, retry());
    let result = tasks.create_new_task("https://bbc.com/x", "bbc.com", "collect_urls").await;
    assert!(matches!(result, Err(Error::Insert(_))));
}

#[tokio::test]
async fn test_status_history_is_append_only() {
    let (_, db) = memory_driver();
    let tasks = TaskRecords::new(db, retry());

    let mut task = tasks
        .create_new_task("https://ynet.co.il/a1", "ynet.co.il", "scrape_article")
        .await
        .unwrap();
    tasks.update_task_status(&mut task, TaskStatus::Running, None).await.unwrap();
    tasks
        .update_task_status(&mut task, TaskStatus::Failed, Some("timeout"))
        .await
        .unwrap();

    let stored = tasks.get_tasks_by_url("https://ynet.co.il/a1").await.unwrap();
    assert_eq!(stored.len(), 1);
    let stored = &stored[0];
    assert_eq!(stored.status, TaskStatus::Failed);
    let history: Vec<TaskStatus> = stored.status_timestamp.iter().map(|t| t.status).collect();
    assert_eq!(history, vec![TaskStatus::Pending, TaskStatus::Running, TaskStatus::Failed]);
    assert_eq!(stored.status_timestamp[2].desc.as_deref(), Some("timeout"));
    assert!(stored.status_timestamp[1].time_changed <= stored.status_timestamp[2].time_changed);
    assert_eq!(stored, &task);
    assert_eq!(TaskRecords::count_failures(stored), 1);
}

#[tokio::test]
async fn test_failed_status_update_leaves_task_untouched() {
    let (_, db) = flaky_driver(0, 1);
    let tasks = TaskRecords::new(db, retry());

    let mut task = tasks.create_new_task("https://bbc.com/x", "bbc.com", "scrape_article").await.unwrap();
    let before = task.clone();
    let result = tasks.update_task_status(&mut task, TaskStatus::Running, None).await;
    assert!(matches!(result, Err(Error::Update(_))));
    assert_eq!(task, before);
}

#[tokio::test]
async fn test_get_new_task_prefers_pending() {
    let (_, db) = memory_driver();
    let tasks = TaskRecords::new(db, retry());
    assert_eq!(tasks.get_new_task().await.unwrap(), None);

    let mut failed = tasks.create_new_task("https://bbc.com/1", "bbc.com", "scrape_article").await.unwrap();
    tasks.update_task_status(&mut failed, TaskStatus::Failed, None).await.unwrap();
    assert_eq!(tasks.get_new_task().await.unwrap().map(|t| t.task_id), Some(failed.task_id.clone()));

    let pending = tasks.create_new_task("https://bbc.com/2", "bbc.com", "scrape_article").await.unwrap();
    assert_eq!(tasks.get_new_task().await.unwrap().map(|t| t.task_id), Some(pending.task_id));
}

#[tokio::test]
async fn test_unwanted_tasks_by_domain() {
    let (_, db) = memory_driver();
    let tasks = TaskRecords::new(db, retry());

    let mut unwanted = tasks.create_new_task("https://bbc.com/1", "bbc.com", "scrape_article").await.unwrap();
    tasks.update_task_status(&mut unwanted, TaskStatus::Unwanted, None).await.unwrap();
    tasks.create_new_task("https://bbc.com/2", "bbc.com", "scrape_article").await.unwrap();
    let mut other = tasks.create_new_task("https://cnn.com/1", "cnn.com", "scrape_article").await.unwrap();
    tasks.update_task_status(&mut other, TaskStatus::Unwanted, None).await.unwrap();

    let found = tasks.get_unwanted_tasks_by_domain("bbc.com").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].task_id, unwanted.task_id);
    assert!(tasks.get_unwanted_tasks_by_domain("ynet.co.il").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failure_limit() {
    let (_, db) = memory_driver();
    let tasks = TaskRecords::new(db, retry()).with_max_time_failed(2);

    let mut task = tasks.create_new_task("https://bbc.com/1", "bbc.com", "scrape_article").await.unwrap();
    tasks.update_task_status(&mut task, TaskStatus::Failed, None).await.unwrap();
    assert!(!tasks.reached_failure_limit(&task));
    tasks.update_task_status(&mut task, TaskStatus::Pending, None).await.unwrap();
    tasks.update_task_status(&mut task, TaskStatus::Failed, None).await.unwrap();
    assert!(tasks.reached_failure_limit(&task));
}
