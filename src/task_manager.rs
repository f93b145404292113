//! Manages the lifecycle of spawned background tasks.
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// A registry of spawned tasks that can be awaited, or aborted, as a group.
///
/// This struct is responsible for:
/// - Spawning tasks and keeping track of their `JoinHandle`s.
/// - Broadcasting a stop signal to tasks that loop until told otherwise.
/// - Awaiting every task on shutdown, optionally bounded by a timeout.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(String, JoinHandle<()>)>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Spawns a new task and adds its handle to the manager.
    ///
    /// Handles of tasks that already finished are pruned on every call.
    pub fn spawn<F>(&self, name: impl Into<String>, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task_name = %name, "Spawning task");
        let handle = tokio::spawn(future);
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|(_, h)| !h.is_finished());
        handles.push((name, handle));
    }

    /// Returns a clone of the shutdown receiver.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Tells looping tasks to stop. Tasks already running keep running until they observe it.
    pub fn signal_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Waits for all managed tasks to complete.
    ///
    /// With a timeout, tasks still running when it expires are aborted.
    /// Returns the number of aborted tasks.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> usize {
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if handles.is_empty() {
            return 0;
        }

        let task_names: Vec<String> = handles.iter().map(|(name, _)| name.clone()).collect();
        let aborts: Vec<_> = handles.iter().map(|(_, h)| h.abort_handle()).collect();
        debug!(tasks = ?task_names, "Awaiting tasks");

        let joined = join_all(handles.into_iter().map(|(_, handle)| handle));
        let results = match timeout {
            None => joined.await,
            Some(limit) => match tokio::time::timeout(limit, joined).await {
                Ok(results) => results,
                Err(_) => {
                    let mut aborted = 0;
                    for (name, abort) in task_names.iter().zip(&aborts) {
                        if !abort.is_finished() {
                            warn!(task_name = %name, ?limit, "Task did not finish in time, aborting");
                            abort.abort();
                            aborted += 1;
                        }
                    }
                    return aborted;
                }
            },
        };

        for (name, result) in task_names.iter().zip(results) {
            match result {
                Ok(()) => debug!(task_name = %name, "Task finished"),
                Err(e) if e.is_panic() => error!(task_name = %name, "Task panicked: {}", e),
                Err(_) => debug!(task_name = %name, "Task was cancelled"),
            }
        }
        0
    }
}
