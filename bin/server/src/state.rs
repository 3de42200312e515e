//! Shared application state handed to every route handler.

use crate::config::ServerConfig;
use crate::db::{
    GraphStore, PgExecutionLogStore, PgSnapshotStore, PgTaskStore, PgmqQueue, ScheduleRepository,
    WorkerRepository,
};
use crate::executor::{GraphWorkerProvider, HttpWorkerExecutor, LoggingExecutor};
use crate::reports::HttpReportGenerator;
use nusoma_deploy::DeploymentStatusRegistry;
use nusoma_execution::ExecutionLogger;
use nusoma_queue::{ConsumerConfig, QueueConsumer};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Name of the pgmq queue created by the migrations.
pub const TASK_QUEUE: &str = "task_queue";

/// The fully wired queue consumer used by this server.
pub type ServerConsumer = QueueConsumer<
    PgmqQueue,
    PgTaskStore,
    GraphWorkerProvider,
    LoggingExecutor,
    HttpReportGenerator,
>;

#[derive(Clone)]
pub struct AppState {
    pub workers: WorkerRepository,
    pub graphs: GraphStore,
    pub schedules: ScheduleRepository,
    pub tasks: PgTaskStore,
    pub queue: PgmqQueue,
    pub registry: DeploymentStatusRegistry,
    pub consumer: Arc<ServerConsumer>,
}

impl AppState {
    /// Wires every repository, the HTTP clients, and the consumer.
    ///
    /// # Errors
    ///
    /// Fails when an HTTP client cannot be constructed.
    pub fn new(pool: PgPool, config: &ServerConfig) -> Result<Self, reqwest::Error> {
        let executor_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.executor.timeout_seconds))
            .build()?;
        let report_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        let graphs = GraphStore::new(pool.clone());
        let tasks = PgTaskStore::new(pool.clone());
        let queue = PgmqQueue::new(pool.clone(), TASK_QUEUE);

        let logger = ExecutionLogger::new(
            PgSnapshotStore::new(pool.clone()),
            PgExecutionLogStore::new(pool.clone()),
        );
        let executor = LoggingExecutor::new(
            HttpWorkerExecutor::new(executor_client, config.executor.base_url.clone()),
            logger,
        );
        let reports = HttpReportGenerator::new(
            report_client,
            config.reports.base_url.clone(),
            config.reports.api_key.clone(),
        );

        let consumer = QueueConsumer::new(
            queue.clone(),
            tasks.clone(),
            GraphWorkerProvider::new(graphs.clone()),
            executor,
            reports,
            ConsumerConfig {
                visibility_timeout: config.visibility_timeout(),
                batch_size: config.queue.batch_size,
                report_model: config.reports.model.clone(),
            },
        );

        Ok(Self {
            workers: WorkerRepository::new(pool.clone()),
            graphs,
            schedules: ScheduleRepository::new(pool),
            tasks,
            queue,
            registry: DeploymentStatusRegistry::new(config.registry_ttl()),
            consumer: Arc::new(consumer),
        })
    }
}
