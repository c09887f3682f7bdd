//! Concurrent fan-out of retrieval sub-tasks.
//!
//! Sub-tasks run concurrently with an individual timeout each, and the
//! merged output preserves submission order regardless of completion
//! order. One slow or failing task never blocks or poisons the rest.

use crate::collab::{QueryExecutor, SubTask};
use crate::groundtruth::RetrievedRecord;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Per-task execution timeout.
    pub task_timeout: Duration,
    /// Maximum tasks in flight at once, unbounded when `None`.
    pub max_parallelism: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(30),
            max_parallelism: None,
        }
    }
}

/// Runs batches of sub-tasks against the query executor.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    executor: Arc<dyn QueryExecutor>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    /// Creates a scheduler over the given executor.
    #[must_use]
    pub fn new(executor: Arc<dyn QueryExecutor>, config: SchedulerConfig) -> Self {
        Self { executor, config }
    }

    /// Runs all tasks concurrently and returns one record per task, in
    /// the order the tasks were submitted.
    ///
    /// Failures and timeouts are captured as failed records; the batch
    /// itself always completes.
    pub async fn run_batch(&self, tasks: Vec<SubTask>) -> Vec<RetrievedRecord> {
        let semaphore = self
            .config
            .max_parallelism
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let futures = tasks.into_iter().map(|task| {
            let semaphore = semaphore.clone();
            async move {
                // The semaphore is never closed while the batch runs.
                let _permit = match &semaphore {
                    Some(s) => s.acquire().await.ok(),
                    None => None,
                };
                self.run_one(task).await
            }
        });

        join_all(futures).await
    }

    async fn run_one(&self, task: SubTask) -> RetrievedRecord {
        let start = Instant::now();
        let outcome = timeout(self.config.task_timeout, self.executor.execute(&task.query)).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(Ok(result)) => {
                debug!(
                    task_id = %task.id,
                    purpose = %task.purpose,
                    rows = result.row_count(),
                    duration_ms,
                    "sub-task succeeded"
                );
                RetrievedRecord::succeeded(task.id, task.purpose, task.query, duration_ms, result)
            }
            Ok(Err(err)) => {
                warn!(task_id = %task.id, error = %err, "sub-task failed");
                RetrievedRecord::failed(
                    task.id,
                    task.purpose,
                    task.query,
                    duration_ms,
                    err.to_string(),
                )
            }
            Err(_) => {
                warn!(
                    task_id = %task.id,
                    timeout_ms = self.config.task_timeout.as_millis(),
                    "sub-task timed out"
                );
                let error = format!(
                    "timed out after {}ms",
                    self.config.task_timeout.as_millis()
                );
                RetrievedRecord::failed(task.id, task.purpose, task.query, duration_ms, error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groundtruth::{Column, ColumnType, ColumnValue, ResultSet, TaskStatus};
    use crate::testing::MockExecutor;
    use pretty_assertions::assert_eq;

    fn small_result(value: i64) -> ResultSet {
        ResultSet::new(vec![Column::new("n", ColumnType::Integer)])
            .with_row(vec![ColumnValue::Integer(value)])
    }

    #[tokio::test]
    async fn test_merge_preserves_submission_order() {
        let executor = MockExecutor::new()
            .with_result("SELECT slow", small_result(1))
            .with_delay("SELECT slow", Duration::from_millis(80))
            .with_result("SELECT fast", small_result(2));
        let scheduler = TaskScheduler::new(Arc::new(executor), SchedulerConfig::default());

        let records = scheduler
            .run_batch(vec![
                SubTask::new("t1", "slow query", "SELECT slow"),
                SubTask::new("t2", "fast query", "SELECT fast"),
            ])
            .await;

        // The fast task finishes first but merges second.
        let ids: Vec<&str> = records.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
        assert!(records.iter().all(|r| r.status.is_success()));
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let executor = MockExecutor::new()
            .with_result("SELECT a", small_result(1))
            .with_error("SELECT b", "table missing")
            .with_result("SELECT c", small_result(3));
        let scheduler = TaskScheduler::new(Arc::new(executor), SchedulerConfig::default());

        let records = scheduler
            .run_batch(vec![
                SubTask::new("t1", "first", "SELECT a"),
                SubTask::new("t2", "second", "SELECT b"),
                SubTask::new("t3", "third", "SELECT c"),
            ])
            .await;

        assert!(records[0].status.is_success());
        assert!(records[2].status.is_success());
        assert_eq!(
            records[1].status,
            TaskStatus::Failed {
                error: "query execution failed: table missing".to_string()
            }
        );
        // The failed record still carries its identity and query.
        assert_eq!(records[1].task_id, "t2");
        assert_eq!(records[1].query, "SELECT b");
    }

    #[tokio::test]
    async fn test_task_timeout_becomes_failed_record() {
        let executor = MockExecutor::new()
            .with_result("SELECT slow", small_result(1))
            .with_delay("SELECT slow", Duration::from_millis(200));
        let config = SchedulerConfig {
            task_timeout: Duration::from_millis(40),
            max_parallelism: None,
        };
        let scheduler = TaskScheduler::new(Arc::new(executor), config);

        let records = scheduler
            .run_batch(vec![SubTask::new("t1", "slow", "SELECT slow")])
            .await;

        match &records[0].status {
            TaskStatus::Failed { error } => assert!(error.contains("timed out")),
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_parallelism_cap_still_preserves_order() {
        let executor = MockExecutor::new()
            .with_result("q1", small_result(1))
            .with_result("q2", small_result(2))
            .with_result("q3", small_result(3));
        let config = SchedulerConfig {
            task_timeout: Duration::from_secs(5),
            max_parallelism: Some(1),
        };
        let scheduler = TaskScheduler::new(Arc::new(executor), config);

        let records = scheduler
            .run_batch(vec![
                SubTask::new("t1", "first", "q1"),
                SubTask::new("t2", "second", "q2"),
                SubTask::new("t3", "third", "q3"),
            ])
            .await;

        let ids: Vec<&str> = records.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let scheduler =
            TaskScheduler::new(Arc::new(MockExecutor::new()), SchedulerConfig::default());
        let records = scheduler.run_batch(Vec::new()).await;
        assert!(records.is_empty());
    }
}
