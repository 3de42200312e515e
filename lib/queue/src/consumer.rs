//! The queue consumer: dequeue, execute, report, persist, delete.

use crate::error::QueueError;
use crate::executor::{WorkerExecutor, WorkerProvider};
use crate::message::{QueueMessage, TaskPayload};
use crate::queue::TaskQueue;
use crate::report::{ReportGenerator, failure_report, fallback_report};
use crate::task::{ActivityKind, ActivityRecord, Task, TaskStatus, TaskStore};
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use std::time::Duration;

/// Tuning for one consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Lease duration for each read message.
    pub visibility_timeout: Duration,
    /// Maximum messages pulled per drain.
    pub batch_size: usize,
    /// Model used for report generation.
    pub report_model: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(60),
            batch_size: 10,
            report_model: "gpt-4o".to_string(),
        }
    }
}

/// Outcome tallies for one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Messages read this pass.
    pub received: usize,
    /// Tasks that reached WORK_COMPLETE.
    pub completed: usize,
    /// Tasks that reached ERROR, plus transient failures left for
    /// redelivery.
    pub failed: usize,
    /// Malformed messages deleted without processing.
    pub poisoned: usize,
}

enum MessageOutcome {
    Completed,
    Failed,
    Poisoned,
}

/// Drains task messages and drives each through the execution pipeline.
///
/// Messages in one batch are handled concurrently (fan-out); within one
/// message the pipeline is strictly sequential. Every message that was
/// actually handled is deleted afterwards, success and business failure
/// alike, so only a crash or a transient infrastructure error leads to
/// redelivery.
pub struct QueueConsumer<Q, S, P, E, R> {
    queue: Q,
    tasks: S,
    workers: P,
    executor: E,
    reports: R,
    config: ConsumerConfig,
}

impl<Q, S, P, E, R> QueueConsumer<Q, S, P, E, R>
where
    Q: TaskQueue,
    S: TaskStore,
    P: WorkerProvider,
    E: WorkerExecutor,
    R: ReportGenerator,
{
    pub fn new(
        queue: Q,
        tasks: S,
        workers: P,
        executor: E,
        reports: R,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            tasks,
            workers,
            executor,
            reports,
            config,
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn tasks(&self) -> &S {
        &self.tasks
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Reads one batch and processes every message concurrently.
    ///
    /// # Errors
    ///
    /// Fails only when the queue itself cannot be read; per-message
    /// failures are tallied in the summary instead.
    pub async fn drain(&self) -> Result<DrainSummary, QueueError> {
        let batch = self
            .queue
            .read(self.config.visibility_timeout, self.config.batch_size)
            .await?;

        let mut summary = DrainSummary {
            received: batch.len(),
            ..DrainSummary::default()
        };
        if batch.is_empty() {
            return Ok(summary);
        }

        let outcomes =
            join_all(batch.into_iter().map(|message| self.handle_message(message))).await;
        for outcome in outcomes {
            match outcome {
                MessageOutcome::Completed => summary.completed += 1,
                MessageOutcome::Failed => summary.failed += 1,
                MessageOutcome::Poisoned => summary.poisoned += 1,
            }
        }

        tracing::info!(
            received = summary.received,
            completed = summary.completed,
            failed = summary.failed,
            poisoned = summary.poisoned,
            "queue drain finished"
        );
        Ok(summary)
    }

    async fn handle_message(&self, message: QueueMessage) -> MessageOutcome {
        let msg_id = message.msg_id;

        let payload = match TaskPayload::from_message(&message) {
            Ok(payload) => payload,
            Err(err) => {
                // Poison: schema violations never become valid on retry.
                tracing::warn!(msg_id, error = %err, "deleting poison message");
                self.delete_message(msg_id).await;
                return MessageOutcome::Poisoned;
            }
        };

        let task = match self.tasks.get(payload.task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!(msg_id, task_id = %payload.task_id, "message for unknown task");
                self.delete_message(msg_id).await;
                return MessageOutcome::Failed;
            }
            Err(err) => {
                // Transient store failure: leave the lease to lapse.
                tracing::error!(msg_id, error = %err, "task lookup failed, leaving for redelivery");
                return MessageOutcome::Failed;
            }
        };

        if task.user_id != payload.user_id {
            tracing::warn!(msg_id, task_id = %task.id, "payload user does not own task");
            self.delete_message(msg_id).await;
            return MessageOutcome::Failed;
        }

        match self.run_task(&task).await {
            Ok(completed) => {
                self.delete_message(msg_id).await;
                if completed {
                    MessageOutcome::Completed
                } else {
                    MessageOutcome::Failed
                }
            }
            Err(err) => {
                tracing::error!(msg_id, task_id = %task.id, error = %err, "task left for redelivery");
                MessageOutcome::Failed
            }
        }
    }

    /// Runs one task end to end. `Ok(true)` means WORK_COMPLETE,
    /// `Ok(false)` means ERROR was persisted; both are fully handled.
    /// `Err` means nothing durable happened and redelivery should retry.
    async fn run_task(&self, task: &Task) -> Result<bool, QueueError> {
        self.tasks
            .update(task.id, TaskStatus::InProgress, None, Utc::now())
            .await?;
        self.tasks
            .record_activity(ActivityRecord {
                task_id: task.id,
                kind: ActivityKind::Started,
                message: format!("Started working on \"{}\"", task.description),
                created_at: Utc::now(),
            })
            .await?;

        let graph = match self.workers.worker_graph(task.worker_id).await? {
            Some(graph) => graph,
            None => {
                self.fail_task(task, "worker no longer exists", 0.0).await?;
                return Ok(false);
            }
        };

        let request_id = ulid::Ulid::new().to_string();
        let input = json!({ "description": task.description });
        let outcome = self
            .executor
            .execute(task.worker_id, &graph, &request_id, &input, task.id)
            .await?;
        let totals = outcome.totals();

        if !outcome.success {
            let error = outcome.error.as_deref().unwrap_or("execution failed");
            self.fail_task(task, error, totals.total_cost).await?;
            return Ok(false);
        }

        let now = Utc::now();
        let prompt = format!(
            "Write a short report of what was accomplished for the task \"{}\".\n\nResult:\n{}",
            task.description, outcome.output
        );
        let report = match self
            .reports
            .generate_text(&self.config.report_model, &prompt)
            .await
        {
            Ok(report) => report,
            Err(err) => {
                // Stage-isolated: a missing report never fails the task.
                tracing::warn!(task_id = %task.id, error = %err, "report generation failed, using placeholder");
                fallback_report(&task.description, now)
            }
        };

        let total_cost = totals.total_cost + report.cost;
        let result = json!({
            "report": report.text,
            "totalCost": total_cost,
            "totalTokens": totals.total_tokens + report.usage.total_tokens,
            "output": outcome.output,
        });
        self.tasks
            .update(task.id, TaskStatus::WorkComplete, Some(result), now)
            .await?;
        self.tasks
            .record_activity(ActivityRecord {
                task_id: task.id,
                kind: ActivityKind::Completed,
                message: format!("Completed \"{}\"", task.description),
                created_at: now,
            })
            .await?;
        Ok(true)
    }

    async fn fail_task(&self, task: &Task, error: &str, cost: f64) -> Result<(), QueueError> {
        let now = Utc::now();
        let result = json!({
            "report": failure_report(&task.description, error, now),
            "totalCost": cost,
        });
        self.tasks
            .update(task.id, TaskStatus::Error, Some(result), now)
            .await?;
        self.tasks
            .record_activity(ActivityRecord {
                task_id: task.id,
                kind: ActivityKind::Failed,
                message: format!("Failed \"{}\": {error}", task.description),
                created_at: now,
            })
            .await
    }

    async fn delete_message(&self, msg_id: i64) {
        if let Err(err) = self.queue.delete(msg_id).await {
            // The lease still expires; worst case is one redelivery of an
            // already-handled message.
            tracing::error!(msg_id, error = %err, "failed to delete handled message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionOutcome;
    use crate::queue::InMemoryQueue;
    use crate::report::GeneratedText;
    use crate::task::InMemoryTaskStore;
    use async_trait::async_trait;
    use nusoma_core::{ExecutionId, TaskId, UserId, WorkerId};
    use nusoma_execution::{BlockExecutionLog, BlockStatus, CostBreakdown, TokenUsage};
    use nusoma_graph::{Block, WorkerGraph};
    use serde_json::Value as JsonValue;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StaticWorkers {
        graphs: HashMap<WorkerId, WorkerGraph>,
    }

    #[async_trait]
    impl WorkerProvider for StaticWorkers {
        async fn worker_graph(
            &self,
            worker_id: WorkerId,
        ) -> Result<Option<WorkerGraph>, QueueError> {
            Ok(self.graphs.get(&worker_id).cloned())
        }
    }

    enum MockExecution {
        Succeed { cost: f64 },
        FailBusiness { error: &'static str },
        FailTransport,
    }

    struct MockExecutor {
        behavior: MockExecution,
        calls: Mutex<usize>,
    }

    impl MockExecutor {
        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl WorkerExecutor for MockExecutor {
        async fn execute(
            &self,
            _worker_id: WorkerId,
            _graph: &WorkerGraph,
            _request_id: &str,
            _input: &JsonValue,
            _task_id: TaskId,
        ) -> Result<ExecutionOutcome, QueueError> {
            *self.calls.lock().unwrap() += 1;
            match self.behavior {
                MockExecution::Succeed { cost } => {
                    let log = BlockExecutionLog::new(
                        ExecutionId::new(),
                        "agent",
                        "agent",
                        Utc::now(),
                        Utc::now(),
                        BlockStatus::Success,
                        &json!({}),
                        &json!({"summary": "3 emails need replies"}),
                    )
                    .with_cost(CostBreakdown {
                        input: cost / 2.0,
                        output: cost / 2.0,
                        total: cost,
                        tokens: TokenUsage::new(100, 50),
                        model: "gpt-4o".to_string(),
                        pricing: None,
                    });
                    Ok(ExecutionOutcome {
                        success: true,
                        output: json!({"summary": "3 emails need replies"}),
                        logs: vec![log],
                        error: None,
                    })
                }
                MockExecution::FailBusiness { error } => Ok(ExecutionOutcome {
                    success: false,
                    output: JsonValue::Null,
                    logs: Vec::new(),
                    error: Some(error.to_string()),
                }),
                MockExecution::FailTransport => Err(QueueError::QueueUnavailable {
                    message: "engine unreachable".to_string(),
                }),
            }
        }
    }

    #[derive(Debug)]
    struct ReportUnavailable;

    impl std::fmt::Display for ReportUnavailable {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "report model unavailable")
        }
    }

    impl std::error::Error for ReportUnavailable {}

    struct MockReports {
        fail: bool,
        cost: f64,
    }

    #[async_trait]
    impl ReportGenerator for MockReports {
        type Error = ReportUnavailable;

        async fn generate_text(
            &self,
            _model: &str,
            _prompt: &str,
        ) -> Result<GeneratedText, Self::Error> {
            if self.fail {
                return Err(ReportUnavailable);
            }
            Ok(GeneratedText {
                text: "Checked the inbox; 3 emails need replies.".to_string(),
                usage: TokenUsage::new(200, 80),
                cost: self.cost,
            })
        }
    }

    type TestConsumer =
        QueueConsumer<InMemoryQueue, InMemoryTaskStore, StaticWorkers, MockExecutor, MockReports>;

    struct Fixture {
        consumer: TestConsumer,
        task_id: TaskId,
        user_id: UserId,
    }

    fn fixture(behavior: MockExecution, reports_fail: bool) -> Fixture {
        let worker_id = WorkerId::new();
        let mut graph = WorkerGraph::new();
        graph
            .add_block(Block::new("start", "starter", "Start"))
            .unwrap();

        let task_id = TaskId::new();
        let user_id = UserId::new();
        let tasks = InMemoryTaskStore::new();
        let now = Utc::now();
        tasks.insert(Task {
            id: task_id,
            user_id,
            worker_id,
            description: "check my inbox".to_string(),
            status: TaskStatus::Pending,
            result: None,
            created_at: now,
            updated_at: now,
        });

        let consumer = QueueConsumer::new(
            InMemoryQueue::new(),
            tasks,
            StaticWorkers {
                graphs: HashMap::from([(worker_id, graph)]),
            },
            MockExecutor {
                behavior,
                calls: Mutex::new(0),
            },
            MockReports {
                fail: reports_fail,
                cost: 0.005,
            },
            ConsumerConfig::default(),
        );

        Fixture {
            consumer,
            task_id,
            user_id,
        }
    }

    impl Fixture {
        async fn enqueue_task(&self) {
            self.consumer
                .queue()
                .send(json!({
                    "taskId": self.task_id.to_string(),
                    "userId": self.user_id.to_string(),
                }))
                .await
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_task_completes_with_summed_cost() {
        let fx = fixture(MockExecution::Succeed { cost: 0.02 }, false);
        fx.enqueue_task().await;

        let summary = fx.consumer.drain().await.unwrap();
        assert_eq!(summary.received, 1);
        assert_eq!(summary.completed, 1);

        let task = fx.consumer.tasks().get(fx.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::WorkComplete);
        let result = task.result.unwrap();
        assert!((result["totalCost"].as_f64().unwrap() - 0.025).abs() < 1e-12);
        assert!(result["report"].as_str().unwrap().contains("inbox"));

        // Handled message is gone for good.
        assert!(fx.consumer.queue().is_empty());

        let activity = fx.consumer.tasks().activity_for(fx.task_id);
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].kind, ActivityKind::Started);
        assert_eq!(activity[1].kind, ActivityKind::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn report_failure_degrades_to_placeholder() {
        let fx = fixture(MockExecution::Succeed { cost: 0.02 }, true);
        fx.enqueue_task().await;

        let summary = fx.consumer.drain().await.unwrap();
        assert_eq!(summary.completed, 1);

        let task = fx.consumer.tasks().get(fx.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::WorkComplete);
        let result = task.result.unwrap();
        // Placeholder report, zero report cost: only execution cost remains.
        assert!((result["totalCost"].as_f64().unwrap() - 0.02).abs() < 1e-12);
        assert!(
            result["report"]
                .as_str()
                .unwrap()
                .contains("could not be generated")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn business_failure_persists_error_and_deletes() {
        let fx = fixture(
            MockExecution::FailBusiness {
                error: "agent block timed out",
            },
            false,
        );
        fx.enqueue_task().await;

        let summary = fx.consumer.drain().await.unwrap();
        assert_eq!(summary.failed, 1);

        let task = fx.consumer.tasks().get(fx.task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert!(
            task.result.unwrap()["report"]
                .as_str()
                .unwrap()
                .contains("agent block timed out")
        );

        // Business failure is handled, not retried.
        assert!(fx.consumer.queue().is_empty());
        let activity = fx.consumer.tasks().activity_for(fx.task_id);
        assert_eq!(activity.last().unwrap().kind, ActivityKind::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_leaves_message_for_redelivery() {
        let fx = fixture(MockExecution::FailTransport, false);
        fx.enqueue_task().await;

        let summary = fx.consumer.drain().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(fx.consumer.queue().len(), 1);

        // After the lease lapses the message comes back.
        tokio::time::advance(ConsumerConfig::default().visibility_timeout + Duration::from_secs(1))
            .await;
        let summary = fx.consumer.drain().await.unwrap();
        assert_eq!(summary.received, 1);
        assert_eq!(fx.consumer.executor().call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn poison_message_is_deleted_exactly_once() {
        let fx = fixture(MockExecution::Succeed { cost: 0.01 }, false);
        fx.consumer
            .queue()
            .send(json!({"garbage": true}))
            .await
            .unwrap();

        let summary = fx.consumer.drain().await.unwrap();
        assert_eq!(summary.poisoned, 1);
        assert!(fx.consumer.queue().is_empty());

        // Never redelivered, even after every lease would have lapsed.
        tokio::time::advance(Duration::from_secs(600)).await;
        let summary = fx.consumer.drain().await.unwrap();
        assert_eq!(summary.received, 0);
        assert_eq!(fx.consumer.executor().call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_task_message_is_dropped() {
        let fx = fixture(MockExecution::Succeed { cost: 0.01 }, false);
        fx.consumer
            .queue()
            .send(json!({
                "taskId": TaskId::new().to_string(),
                "userId": fx.user_id.to_string(),
            }))
            .await
            .unwrap();

        let summary = fx.consumer.drain().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(fx.consumer.queue().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_fans_out_across_messages() {
        let fx = fixture(MockExecution::Succeed { cost: 0.01 }, false);
        fx.enqueue_task().await;
        // Two poison messages alongside the real one.
        fx.consumer.queue().send(json!({"bad": 1})).await.unwrap();
        fx.consumer.queue().send(json!({"bad": 2})).await.unwrap();

        let summary = fx.consumer.drain().await.unwrap();
        assert_eq!(summary.received, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.poisoned, 2);
        assert!(fx.consumer.queue().is_empty());
    }
}
