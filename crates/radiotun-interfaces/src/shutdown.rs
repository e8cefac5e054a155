//! Shared cancellation token for coordinating stage shutdown.
//!
//! The bridge stages run as blocking threads and check the stop flag at the
//! top of every loop iteration and after every bounded wait. [`ShutdownToken`]
//! bundles the flag with the join handles of those threads:
//! - a `watch` channel carrying the stop flag, readable both synchronously
//!   (from stage threads) and asynchronously (from the coordinator)
//! - the named `JoinHandle`s to await on shutdown

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Read-only view of the stop flag handed to each stage.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    /// Whether shutdown has been requested. Never blocks.
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Wait until shutdown is requested.
    pub async fn stopped(&mut self) {
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}

/// A cancellation token that coordinates shutdown of the stage threads.
///
/// Typical usage:
///
/// 1. Create with [`ShutdownToken::new()`].
/// 2. Hand a [`StopSignal`] from [`subscribe()`](Self::subscribe) to each
///    stage; stages poll [`StopSignal::is_stopped`].
/// 3. Register each stage's handle with [`add_task()`](Self::add_task).
/// 4. When stopping, call [`signal_stop()`](Self::signal_stop) then
///    [`join_all()`](Self::join_all).
pub struct ShutdownToken {
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    task_handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);

        Self {
            stop_tx,
            stop_rx,
            task_handles: Mutex::new(Vec::new()),
        }
    }

    /// Get a new view of the stop flag.
    pub fn subscribe(&self) -> StopSignal {
        StopSignal(self.stop_rx.clone())
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Register a stage's handle under `name`.
    pub async fn add_task(&self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.task_handles.lock().await.push((name.into(), handle));
    }

    pub async fn task_count(&self) -> usize {
        self.task_handles.lock().await.len()
    }

    /// Send the stop signal to all subscribers. Idempotent.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Await every registered task, giving up on each after `timeout`.
    ///
    /// Returns the names of tasks that were still running when their wait
    /// expired. A panicked task counts as finished.
    pub async fn join_all(&self, timeout: Duration) -> Vec<String> {
        let handles: Vec<_> = self.task_handles.lock().await.drain(..).collect();
        let mut stuck = Vec::new();
        for (name, handle) in handles {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => tracing::debug!("{name} joined"),
                Ok(Err(e)) => tracing::warn!("{name} ended abnormally: {e}"),
                Err(_) => stuck.push(name),
            }
        }
        stuck
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[test]
    fn new_token_is_not_stopped() {
        let token = ShutdownToken::new();
        assert!(!token.is_stopped());
        assert!(!token.subscribe().is_stopped());
    }

    #[test]
    fn signal_stop_is_visible_to_subscribers() {
        let token = ShutdownToken::new();
        let a = token.subscribe();
        let b = token.subscribe();

        token.signal_stop();
        token.signal_stop(); // should not panic
        assert!(a.is_stopped());
        assert!(b.is_stopped());
        assert!(token.is_stopped());
    }

    #[test]
    fn subscribe_after_stop_sees_true() {
        let token = ShutdownToken::new();
        token.signal_stop();
        assert!(token.subscribe().is_stopped());
    }

    #[tokio::test]
    async fn blocking_stage_observes_stop_and_joins() {
        let token = ShutdownToken::new();
        let signal = token.subscribe();
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);

        let handle = tokio::task::spawn_blocking(move || {
            while !signal.is_stopped() {
                std::thread::sleep(Duration::from_millis(1));
            }
            flag.store(true, Ordering::SeqCst);
        });
        token.add_task("stage", handle).await;
        assert_eq!(token.task_count().await, 1);

        token.signal_stop();
        let stuck = token.join_all(Duration::from_secs(5)).await;
        assert!(stuck.is_empty());
        assert!(exited.load(Ordering::SeqCst));
        assert_eq!(token.task_count().await, 0);
    }

    #[tokio::test]
    async fn join_all_reports_tasks_that_ignore_stop() {
        let token = ShutdownToken::new();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let handle = tokio::task::spawn_blocking(move || {
            let _ = release_rx.recv();
        });
        token.add_task("stubborn", handle).await;

        token.signal_stop();
        let stuck = token.join_all(Duration::from_millis(20)).await;
        assert_eq!(stuck, vec!["stubborn".to_string()]);
        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn stopped_future_resolves_after_signal() {
        let token = ShutdownToken::new();
        let mut signal = token.subscribe();
        let waiter = tokio::spawn(async move { signal.stopped().await });
        token.signal_stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn join_all_on_empty_handles() {
        let token = ShutdownToken::new();
        assert!(token.join_all(Duration::from_millis(1)).await.is_empty());
    }
}
