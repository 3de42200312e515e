//! The per-worker redeployment detector state machine.

use crate::error::DeployError;
use crate::registry::DeploymentStatusRegistry;
use async_trait::async_trait;
use nusoma_core::WorkerId;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Compares a worker's live graph against its last deployed snapshot.
///
/// The production implementation fetches both state hashes; a worker
/// with no deployed snapshot never needs redeployment.
#[async_trait]
pub trait ChangeChecker: Send + Sync + 'static {
    async fn needs_redeployment(&self, worker_id: WorkerId) -> Result<bool, DeployError>;
}

/// Timing knobs for the detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Quiet period after the last edit before a check runs.
    pub debounce: Duration,
    /// Minimum spacing between two check starts.
    pub throttle: Duration,
    /// Spacing of the periodic re-check that runs while the flag is set.
    pub recheck_interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            throttle: Duration::from_millis(3000),
            recheck_interval: Duration::from_secs(30),
        }
    }
}

/// Where the detector currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorPhase {
    /// No check pending.
    Idle,
    /// An edit occurred; the debounce timer is running.
    PendingCheck,
    /// A comparison request is in flight.
    Checking,
}

struct DetectorState {
    active_worker: Option<WorkerId>,
    phase: DetectorPhase,
    needs_redeployment: bool,
    last_check_started: Option<Instant>,
    /// Bumped on worker switch and deploy; in-flight results carrying an
    /// older generation are discarded.
    generation: u64,
    pending: Option<JoinHandle<()>>,
    recheck: Option<JoinHandle<()>>,
}

struct Inner<C> {
    checker: C,
    config: DetectorConfig,
    registry: DeploymentStatusRegistry,
    state: Mutex<DetectorState>,
}

/// Tracks whether the active worker's live graph has drifted from its
/// deployed snapshot.
///
/// Edits schedule a comparison through the debounce/throttle rules in
/// [`DetectorConfig`]; while the flag is set, a low-frequency re-check
/// runs on its own so reverting edits by hand eventually clears the
/// flag without requiring a further edit.
pub struct DeploymentChangeDetector<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for DeploymentChangeDetector<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: ChangeChecker> DeploymentChangeDetector<C> {
    pub fn new(checker: C, registry: DeploymentStatusRegistry, config: DetectorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                checker,
                config,
                registry,
                state: Mutex::new(DetectorState {
                    active_worker: None,
                    phase: DetectorPhase::Idle,
                    needs_redeployment: false,
                    last_check_started: None,
                    generation: 0,
                    pending: None,
                    recheck: None,
                }),
            }),
        }
    }

    /// Switches the detector to another worker.
    ///
    /// Any pending or in-flight check for the previous worker is
    /// cancelled; its late response, if one arrives, is discarded. The
    /// flag is seeded from the shared registry when it has a fresh
    /// verdict for the new worker.
    pub fn set_active_worker(&self, worker_id: WorkerId) {
        let Ok(mut state) = self.inner.state.lock() else {
            return;
        };
        if state.active_worker == Some(worker_id) {
            return;
        }
        Self::cancel_tasks(&mut state);
        state.generation += 1;
        state.active_worker = Some(worker_id);
        state.phase = DetectorPhase::Idle;
        state.last_check_started = None;
        state.needs_redeployment = self.inner.registry.get(worker_id).unwrap_or(false);
    }

    /// Records a live-graph mutation and (re)schedules a check.
    ///
    /// The delay is the debounce, stretched to honor the throttle when a
    /// check started recently: `max(debounce, throttle − since_last)`.
    pub fn graph_edited(&self) {
        let Ok(mut state) = self.inner.state.lock() else {
            return;
        };
        let Some(worker) = state.active_worker else {
            return;
        };
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }

        let mut delay = self.inner.config.debounce;
        if let Some(last) = state.last_check_started {
            let since = last.elapsed();
            if since < self.inner.config.throttle {
                delay = delay.max(self.inner.config.throttle - since);
            }
        }

        state.phase = DetectorPhase::PendingCheck;
        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Inner::run_check(inner, worker, generation).await;
        }));
    }

    /// Marks the active worker as deployed.
    ///
    /// The flag resets to false unconditionally; any in-flight check is
    /// discarded rather than allowed to re-set it.
    pub fn deployed(&self) {
        let Ok(mut state) = self.inner.state.lock() else {
            return;
        };
        Self::cancel_tasks(&mut state);
        state.generation += 1;
        state.phase = DetectorPhase::Idle;
        state.needs_redeployment = false;
        state.last_check_started = None;
        if let Some(worker) = state.active_worker {
            self.inner.registry.set(worker, false);
        }
    }

    #[must_use]
    pub fn needs_redeployment(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.needs_redeployment)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn phase(&self) -> DetectorPhase {
        self.inner
            .state
            .lock()
            .map(|state| state.phase)
            .unwrap_or(DetectorPhase::Idle)
    }

    fn cancel_tasks(state: &mut DetectorState) {
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
        if let Some(handle) = state.recheck.take() {
            handle.abort();
        }
    }
}

impl<C: ChangeChecker> Inner<C> {
    async fn run_check(inner: Arc<Self>, worker: WorkerId, generation: u64) {
        {
            let Ok(mut state) = inner.state.lock() else {
                return;
            };
            if state.generation != generation || state.active_worker != Some(worker) {
                return;
            }
            state.phase = DetectorPhase::Checking;
            state.last_check_started = Some(Instant::now());
        }

        let result = inner.checker.needs_redeployment(worker).await;

        let Ok(mut state) = inner.state.lock() else {
            return;
        };
        if state.generation != generation || state.active_worker != Some(worker) {
            tracing::debug!(%worker, "discarding stale redeployment check");
            return;
        }
        state.phase = DetectorPhase::Idle;

        match result {
            Ok(flag) => {
                state.needs_redeployment = flag;
                inner.registry.set(worker, flag);
                if flag {
                    let recheck_idle = state
                        .recheck
                        .as_ref()
                        .is_none_or(tokio::task::JoinHandle::is_finished);
                    if recheck_idle {
                        state.recheck = Some(Self::spawn_recheck(
                            Arc::clone(&inner),
                            worker,
                            generation,
                        ));
                    }
                } else if let Some(handle) = state.recheck.take() {
                    handle.abort();
                }
            }
            Err(err) => {
                // Keep the last verdict; the next edit or re-check retries.
                tracing::warn!(%worker, error = %err, "redeployment check failed");
            }
        }
    }

    /// Re-checks on an interval while the flag stays set, so reverting
    /// edits back to the deployed state clears it without a new edit.
    fn spawn_recheck(inner: Arc<Self>, worker: WorkerId, generation: u64) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.config.recheck_interval).await;
                {
                    let Ok(state) = inner.state.lock() else {
                        return;
                    };
                    if state.generation != generation || !state.needs_redeployment {
                        return;
                    }
                }
                Self::run_check(Arc::clone(&inner), worker, generation).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct MockChecker {
        result: Arc<Mutex<bool>>,
        calls: Arc<Mutex<usize>>,
        delay: Duration,
    }

    impl MockChecker {
        fn returning(result: bool) -> Self {
            Self {
                result: Arc::new(Mutex::new(result)),
                calls: Arc::new(Mutex::new(0)),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn set_result(&self, result: bool) {
            *self.result.lock().unwrap() = result;
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChangeChecker for MockChecker {
        async fn needs_redeployment(&self, _worker_id: WorkerId) -> Result<bool, DeployError> {
            *self.calls.lock().unwrap() += 1;
            tokio::time::sleep(self.delay).await;
            Ok(*self.result.lock().unwrap())
        }
    }

    fn config() -> DetectorConfig {
        DetectorConfig {
            debounce: Duration::from_millis(1000),
            throttle: Duration::from_millis(3000),
            recheck_interval: Duration::from_millis(5000),
        }
    }

    fn detector(checker: MockChecker) -> DeploymentChangeDetector<MockChecker> {
        DeploymentChangeDetector::new(
            checker,
            DeploymentStatusRegistry::new(Duration::from_secs(300)),
            config(),
        )
    }

    /// Lets spawned timer tasks run after the clock moved.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance(ms: u64) {
        // Let freshly spawned timer tasks register their sleeps before
        // the clock moves, or their deadlines are computed too late.
        settle().await;
        tokio::time::advance(Duration::from_millis(ms)).await;
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_check() {
        let checker = MockChecker::returning(false);
        let detector = detector(checker.clone());
        detector.set_active_worker(WorkerId::new());

        // Edit, then revert 500ms later: the debounce restarts.
        detector.graph_edited();
        advance(500).await;
        detector.graph_edited();
        assert_eq!(detector.phase(), DetectorPhase::PendingCheck);

        // The first edit's timer was cancelled; nothing fires at 1000ms
        // after the first edit.
        advance(999).await;
        assert_eq!(checker.call_count(), 0);

        // One check fires 1000ms after the *last* edit; the reverted
        // graph matches the deployed snapshot.
        advance(1).await;
        assert_eq!(checker.call_count(), 1);
        assert!(!detector.needs_redeployment());
        assert_eq!(detector.phase(), DetectorPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_stretches_the_next_check() {
        let checker = MockChecker::returning(true);
        let detector = detector(checker.clone());
        detector.set_active_worker(WorkerId::new());

        detector.graph_edited();
        advance(1000).await;
        assert_eq!(checker.call_count(), 1);

        // An edit 100ms after the check: delay becomes
        // max(1000, 3000 - 100) = 2900ms.
        advance(100).await;
        detector.graph_edited();
        advance(2899).await;
        assert_eq!(checker.call_count(), 1);
        advance(1).await;
        assert_eq!(checker.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_recheck_clears_flag_after_manual_revert() {
        let checker = MockChecker::returning(true);
        let detector = detector(checker.clone());
        let worker_id = WorkerId::new();
        detector.set_active_worker(worker_id);

        detector.graph_edited();
        advance(1000).await;
        assert!(detector.needs_redeployment());

        // The user reverts by hand; no further edit event arrives, but
        // the periodic re-check notices.
        checker.set_result(false);
        advance(5000).await;
        assert_eq!(checker.call_count(), 2);
        assert!(!detector.needs_redeployment());

        // Once clear, the re-check loop stops.
        advance(20_000).await;
        assert_eq!(checker.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_is_discarded_after_worker_switch() {
        let checker = MockChecker::returning(true).with_delay(Duration::from_millis(500));
        let detector = detector(checker.clone());
        let first = WorkerId::new();
        detector.set_active_worker(first);

        detector.graph_edited();
        advance(1000).await;
        assert_eq!(detector.phase(), DetectorPhase::Checking);

        // Switch workers while the request is in flight.
        detector.set_active_worker(WorkerId::new());
        advance(500).await;

        assert!(!detector.needs_redeployment());
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_resets_flag_unconditionally() {
        let checker = MockChecker::returning(true);
        let detector = detector(checker.clone());
        let worker_id = WorkerId::new();
        detector.set_active_worker(worker_id);

        detector.graph_edited();
        advance(1000).await;
        assert!(detector.needs_redeployment());

        detector.deployed();
        assert!(!detector.needs_redeployment());

        // The re-check loop died with the deploy.
        advance(60_000).await;
        assert_eq!(checker.call_count(), 1);
        assert!(!detector.needs_redeployment());
    }

    #[tokio::test(start_paused = true)]
    async fn edits_without_an_active_worker_are_ignored() {
        let checker = MockChecker::returning(true);
        let detector = detector(checker.clone());

        detector.graph_edited();
        advance(10_000).await;
        assert_eq!(checker.call_count(), 0);
        assert_eq!(detector.phase(), DetectorPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_back_seeds_flag_from_registry() {
        let checker = MockChecker::returning(true);
        let registry = DeploymentStatusRegistry::new(Duration::from_secs(300));
        let detector = DeploymentChangeDetector::new(checker.clone(), registry, config());

        let first = WorkerId::new();
        detector.set_active_worker(first);
        detector.graph_edited();
        advance(1000).await;
        assert!(detector.needs_redeployment());

        detector.set_active_worker(WorkerId::new());
        assert!(!detector.needs_redeployment());

        // The registry remembers the first worker's verdict.
        detector.set_active_worker(first);
        assert!(detector.needs_redeployment());
    }
}
