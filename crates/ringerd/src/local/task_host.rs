//! Background task host built on tokio timers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::host::{
    deadline_after, BackgroundTask, BackgroundTaskHost, HostError, HostResult, TaskHostStatus,
    TaskOptions, TaskResult,
};

struct Registration {
    options: TaskOptions,
    cancel: CancellationToken,
}

struct HostState {
    status: TaskHostStatus,
    minimum_interval: Duration,
    registrations: HashMap<String, Registration>,
    results: Vec<TaskResult>,
    total_registrations: usize,
}

/// Runs registered tasks periodically on the tokio runtime.
///
/// Each task runs every `max(options.minimum_interval, host minimum)`,
/// first tick one period after registration. Registering an id twice keeps
/// the existing timer.
pub struct TokioTaskHost {
    state: Arc<Mutex<HostState>>,
}

impl TokioTaskHost {
    pub fn new() -> Self {
        Self::with_status(TaskHostStatus::Available)
    }

    pub fn with_status(status: TaskHostStatus) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                status,
                minimum_interval: Duration::ZERO,
                registrations: HashMap::new(),
                results: Vec::new(),
                total_registrations: 0,
            })),
        }
    }

    pub async fn set_status(&self, status: TaskHostStatus) {
        self.state.lock().await.status = status;
    }

    /// Number of currently active registrations.
    pub async fn active_registrations(&self) -> usize {
        self.state.lock().await.registrations.len()
    }

    /// Number of timers ever created.
    pub async fn total_registrations(&self) -> usize {
        self.state.lock().await.total_registrations
    }

    pub async fn options(&self, task_id: &str) -> Option<TaskOptions> {
        self.state
            .lock()
            .await
            .registrations
            .get(task_id)
            .map(|r| r.options)
    }

    pub async fn minimum_interval(&self) -> Duration {
        self.state.lock().await.minimum_interval
    }

    /// Results reported by task runs, oldest first.
    pub async fn results(&self) -> Vec<TaskResult> {
        self.state.lock().await.results.clone()
    }
}

impl Default for TokioTaskHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundTaskHost for TokioTaskHost {
    async fn status(&self) -> TaskHostStatus {
        self.state.lock().await.status
    }

    async fn register(
        &self,
        task_id: &str,
        options: TaskOptions,
        task: Arc<dyn BackgroundTask>,
    ) -> HostResult<()> {
        let mut state = self.state.lock().await;

        if state.status != TaskHostStatus::Available {
            return Err(HostError::TaskHost(format!(
                "background tasks are {:?}",
                state.status
            )));
        }

        if state.registrations.contains_key(task_id) {
            debug!(task_id, "Task already registered, keeping existing timer");
            return Ok(());
        }

        let period = options.minimum_interval.max(state.minimum_interval);
        if period.is_zero() {
            return Err(HostError::TaskHost("interval must be non-zero".to_string()));
        }

        let cancel = CancellationToken::new();
        let stopped = cancel.clone();
        let shared = Arc::clone(&self.state);
        let id = task_id.to_string();
        let mut ticker = interval_at(deadline_after(period), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = stopped.cancelled() => {
                        debug!(task_id = %id, "Background task stopped");
                        break;
                    }

                    _ = ticker.tick() => {
                        let result = task.run().await;
                        debug!(task_id = %id, result = ?result, "Background task ran");
                        shared.lock().await.results.push(result);
                    }
                }
            }
        });

        state.registrations.insert(
            task_id.to_string(),
            Registration { options, cancel },
        );
        state.total_registrations += 1;

        info!(
            task_id,
            interval_secs = period.as_secs(),
            persist_across_restart = options.persist_across_restart,
            run_on_boot = options.run_on_boot,
            "Background task registered"
        );
        Ok(())
    }

    async fn unregister(&self, task_id: &str) -> HostResult<()> {
        match self.state.lock().await.registrations.remove(task_id) {
            Some(registration) => {
                registration.cancel.cancel();
                info!(task_id, "Background task unregistered");
            }
            None => debug!(task_id, "Unregister for unknown task, ignoring"),
        }
        Ok(())
    }

    async fn set_minimum_interval(&self, interval: Duration) -> HostResult<()> {
        self.state.lock().await.minimum_interval = interval;
        Ok(())
    }

    async fn is_registered(&self, task_id: &str) -> bool {
        self.state.lock().await.registrations.contains_key(task_id)
    }
}

impl Drop for TokioTaskHost {
    fn drop(&mut self) {
        // Spawned loops hold `state`, not the host, so stop them here
        if let Ok(state) = self.state.try_lock() {
            for registration in state.registrations.values() {
                registration.cancel.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        runs: AtomicUsize,
        result: TaskResult,
    }

    #[async_trait]
    impl BackgroundTask for CountingTask {
        async fn run(&self) -> TaskResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    fn counting(result: TaskResult) -> Arc<CountingTask> {
        Arc::new(CountingTask {
            runs: AtomicUsize::new(0),
            result,
        })
    }

    fn options(secs: u64) -> TaskOptions {
        TaskOptions {
            minimum_interval: Duration::from_secs(secs),
            persist_across_restart: true,
            run_on_boot: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_periodically() {
        let host = TokioTaskHost::new();
        let task = counting(TaskResult::NewData);
        host.register("t", options(60), task.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 3);
        assert_eq!(host.results().await, vec![TaskResult::NewData; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_register_keeps_one_timer() {
        let host = TokioTaskHost::new();
        let task = counting(TaskResult::NewData);
        host.register("t", options(60), task.clone()).await.unwrap();
        host.register("t", options(60), task.clone()).await.unwrap();

        assert_eq!(host.active_registrations().await, 1);
        assert_eq!(host.total_registrations().await, 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_stops_task() {
        let host = TokioTaskHost::new();
        let task = counting(TaskResult::Failed);
        host.register("t", options(60), task.clone()).await.unwrap();
        host.unregister("t").await.unwrap();
        assert!(!host.is_registered("t").await);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);

        // Unknown ids are tolerated
        host.unregister("t").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_minimum_interval_applies() {
        let host = TokioTaskHost::new();
        host.set_minimum_interval(Duration::from_secs(60)).await.unwrap();
        let task = counting(TaskResult::NewData);
        host.register("t", options(10), task.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_refused_when_unavailable() {
        let host = TokioTaskHost::with_status(TaskHostStatus::Denied);
        let err = host
            .register("t", options(60), counting(TaskResult::NewData))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::TaskHost(_)));
        assert_eq!(host.active_registrations().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_interval_registers_without_running() {
        let host = TokioTaskHost::new();
        let task = counting(TaskResult::NewData);
        host.register("t", options(i64::MAX as u64), task.clone())
            .await
            .unwrap();

        assert!(host.is_registered("t").await);
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);
        host.unregister("t").await.unwrap();
    }
}
