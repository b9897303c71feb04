//! Parent side of isolated execution.
//!
//! Every call spawns a fresh worker, so a crashed or killed transformation
//! never leaves state behind for the next one.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::{NodeKey, ResultHandle, Store};
use crate::table::ElementwiseOp;

use super::protocol::{WorkerCommand, WorkerResponse};
use super::task::{IsolatedTask, Operand, TableOp};
use super::worker::{WorkerHandle, WorkerKillHandle};

/// Environment variable overriding the default timeout, in seconds.
pub const TIMEOUT_ENV: &str = "QCELL_TIMEOUT_SECS";

/// Default bound on a single isolated run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runner settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Bound on the wait for a worker's answer. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Worker binary; discovered when unset.
    pub worker_path: Option<PathBuf>,
}

impl RunnerConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = Some(path.into());
        self
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let timeout = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|secs| secs.trim().parse::<f64>().ok())
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(DEFAULT_TIMEOUT);
        Self {
            timeout: Some(timeout),
            worker_path: None,
        }
    }
}

/// One in-flight run.
struct ActiveRun {
    caller: String,
    kill: WorkerKillHandle,
}

/// In-flight runs of a runner and its clones, by run id.
#[derive(Default)]
struct ActiveRuns {
    next_id: AtomicU64,
    runs: Mutex<FxHashMap<u64, ActiveRun>>,
}

impl ActiveRuns {
    fn register(&self, caller: &str, kill: WorkerKillHandle) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut runs) = self.runs.lock() {
            runs.insert(
                id,
                ActiveRun {
                    caller: caller.to_string(),
                    kill,
                },
            );
        }
        id
    }

    fn unregister(&self, id: u64) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.remove(&id);
        }
    }

    fn kill(&self, caller: Option<&str>) -> usize {
        let Ok(runs) = self.runs.lock() else {
            return 0;
        };
        let mut killed = 0;
        for run in runs.values() {
            if caller.is_none_or(|c| c == run.caller) {
                run.kill.kill();
                killed += 1;
            }
        }
        killed
    }
}

/// Removes a run from the active set when the call ends, however it ends.
struct Registration<'a> {
    active: &'a ActiveRuns,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.active.unregister(self.id);
    }
}

/// Thread-safe handle for killing in-flight tasks of a runner.
///
/// A handle made by [`IsolatedRunner::kill_handle_for`] only reaches tasks
/// of that caller. If nothing matching is running, `kill` is a no-op.
#[derive(Clone)]
pub struct RunnerKillHandle {
    active: Arc<ActiveRuns>,
    caller: Option<String>,
}

impl RunnerKillHandle {
    /// Kill the matching workers; returns how many were signalled.
    pub fn kill(&self) -> usize {
        self.active.kill(self.caller.as_deref())
    }
}

/// Runs [`IsolatedTask`]s in worker processes against one store.
///
/// Clones share the set of in-flight runs, so a kill handle from any clone
/// reaches tasks started through the others.
#[derive(Clone)]
pub struct IsolatedRunner {
    store: Store,
    config: RunnerConfig,
    active: Arc<ActiveRuns>,
}

impl IsolatedRunner {
    pub fn new(store: Store, config: RunnerConfig) -> Self {
        Self {
            store,
            config,
            active: Arc::new(ActiveRuns::default()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Get a handle that kills every worker running for this runner.
    pub fn kill_handle(&self) -> RunnerKillHandle {
        RunnerKillHandle {
            active: Arc::clone(&self.active),
            caller: None,
        }
    }

    /// Get a handle that kills only the workers running tasks of `caller`.
    pub fn kill_handle_for(&self, caller: impl Into<String>) -> RunnerKillHandle {
        RunnerKillHandle {
            active: Arc::clone(&self.active),
            caller: Some(caller.into()),
        }
    }

    /// Run `task` with the configured timeout.
    pub fn run(&self, task: IsolatedTask) -> Result<ResultHandle> {
        self.run_with_timeout(task, self.config.timeout)
    }

    /// Run `task` in a fresh worker and wait at most `timeout` for it.
    ///
    /// On success the result is already durable and the returned handle
    /// points at it. On timeout the worker is killed and reaped before
    /// `Error::Timeout` is returned.
    pub fn run_with_timeout(
        &self,
        task: IsolatedTask,
        timeout: Option<Duration>,
    ) -> Result<ResultHandle> {
        let store_root = self
            .store
            .root()
            .to_str()
            .ok_or_else(|| {
                Error::Storage(format!(
                    "store root '{}' is not valid UTF-8",
                    self.store.root().display()
                ))
            })?
            .to_string();

        let worker_path = WorkerHandle::find_worker_binary(self.config.worker_path.as_deref())?;
        let mut worker = WorkerHandle::spawn(&worker_path)?;
        let kill_handle = WorkerKillHandle::new(&worker);
        let registration = Registration {
            active: &self.active,
            id: self.active.register(&task.caller, kill_handle.clone()),
        };

        let target = task.target.clone();
        let op_name = task.op.name();
        info!(
            "Running {} for {} in worker {}",
            op_name,
            task.caller,
            worker.pid()
        );

        let started = Instant::now();
        let outcome = worker
            .send_command(&WorkerCommand::Run {
                store_root,
                row_group_size: self.store.config().row_group_size as u64,
                task,
            })
            .and_then(|()| worker.recv_response(timeout));

        drop(registration);

        let response = match outcome {
            Ok(response) => response,
            Err(Error::Timeout { after }) => {
                warn!("{} exceeded {:?}; killing worker {}", op_name, after, worker.pid());
                worker.kill()?;
                return Err(Error::Timeout { after });
            }
            Err(e) if kill_handle.is_killed() => {
                debug!("Worker for {} was killed: {}", op_name, e);
                worker.kill()?;
                return Err(Error::WorkerFailure {
                    message: "worker was killed".to_string(),
                });
            }
            Err(e) => {
                worker.kill()?;
                return Err(e);
            }
        };

        let _ = worker.shutdown();

        match response {
            WorkerResponse::Persisted { rows } => {
                debug!(
                    "{} persisted {} rows at {} in {:?}",
                    op_name,
                    rows,
                    target,
                    started.elapsed()
                );
                ResultHandle::open(self.store.clone(), target)
            }
            WorkerResponse::Failed { message } => Err(Error::WorkerFailure { message }),
            WorkerResponse::Panic { message } => Err(Error::WorkerFailure {
                message: format!("worker panicked: {}", message),
            }),
            other => Err(Error::Ipc(format!(
                "Unexpected response from worker: {:?}",
                other
            ))),
        }
    }

    /// Combine two operands elementwise in a worker.
    ///
    /// The result key is derived from the operation and both operands, so
    /// repeating an operation overwrites the same node. The task runs under
    /// the first stored operand's key as caller.
    pub fn elementwise(
        &self,
        op: ElementwiseOp,
        lhs: Operand,
        rhs: Operand,
    ) -> Result<ResultHandle> {
        let caller = match (&lhs, &rhs) {
            (Operand::Stored(key), _) | (_, Operand::Stored(key)) => key.to_string(),
            _ => op.name().to_string(),
        };
        self.elementwise_as(caller, op, lhs, rhs)
    }

    /// [`elementwise`](Self::elementwise) on behalf of `caller`.
    pub fn elementwise_as(
        &self,
        caller: impl Into<String>,
        op: ElementwiseOp,
        lhs: Operand,
        rhs: Operand,
    ) -> Result<ResultHandle> {
        let name = format!("{}_{:016x}_{:016x}", op.name(), lhs.identity(), rhs.identity());
        let target = NodeKey::new(name.clone(), name)?;
        let task = IsolatedTask::new(caller, TableOp::Elementwise { op }, target)
            .input(lhs)
            .input(rhs);
        self.run(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreConfig;
    use tempfile::TempDir;

    #[test]
    fn test_default_timeout_is_bounded() {
        assert!(RunnerConfig::default().timeout.is_some());
    }

    #[test]
    fn test_kill_handle_without_worker_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StoreConfig::new(temp.path())).unwrap();
        let runner = IsolatedRunner::new(store, RunnerConfig::default());
        assert_eq!(runner.kill_handle().kill(), 0);
        assert_eq!(runner.kill_handle_for("7").kill(), 0);
    }

    #[test]
    fn test_missing_worker_binary_fails() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StoreConfig::new(temp.path())).unwrap();
        let runner = IsolatedRunner::new(
            store,
            RunnerConfig::default().with_worker_path(temp.path().join("no-such-worker")),
        );
        let task = IsolatedTask::new(
            "test",
            TableOp::ReadCsv {
                path: "x.csv".to_string(),
            },
            NodeKey::new("f", "n").unwrap(),
        );
        assert!(matches!(runner.run(task), Err(Error::Ipc(_))));
    }
}
