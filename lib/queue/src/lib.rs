//! Reliable task-queue consumption for nusoma workers.
//!
//! Messages are leased with a visibility timeout rather than removed on
//! read: a consumer that crashes mid-task simply lets the lease expire
//! and the message is redelivered. Messages are deleted only after
//! handling completes — including failure handling, so a business
//! failure inside a workflow run never causes a redelivery loop.
//!
//! Malformed payloads are poison messages: logged and deleted
//! immediately, never retried.

pub mod consumer;
pub mod error;
pub mod executor;
pub mod message;
pub mod queue;
pub mod report;
pub mod task;

pub use consumer::{ConsumerConfig, DrainSummary, QueueConsumer};
pub use error::QueueError;
pub use executor::{ExecutionOutcome, WorkerExecutor, WorkerProvider};
pub use message::{QueueMessage, TaskPayload};
pub use queue::{InMemoryQueue, TaskQueue};
pub use report::{GeneratedText, ReportGenerator, failure_report, fallback_report};
pub use task::{ActivityKind, ActivityRecord, InMemoryTaskStore, Task, TaskStatus, TaskStore};
