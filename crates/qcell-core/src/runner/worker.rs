//! Worker process management.
//!
//! Provides `WorkerHandle` for spawning and talking to one `qcell-worker`
//! process, and `WorkerKillHandle` for terminating it from another thread.

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::protocol::{WorkerCommand, WorkerResponse, read_message, write_message};

/// Environment variable naming the worker binary.
pub const WORKER_PATH_ENV: &str = "QCELL_WORKER_PATH";

/// How long a fresh worker has to answer the handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

fn worker_name() -> &'static str {
    if cfg!(windows) {
        "qcell-worker.exe"
    } else {
        "qcell-worker"
    }
}

/// Handle to a worker process.
///
/// Responses are read on a dedicated thread and handed over through a
/// channel, so waiting for one can be bounded.
pub struct WorkerHandle {
    /// The child process.
    child: Child,
    /// Buffered stdin writer.
    stdin: BufWriter<ChildStdin>,
    /// Responses decoded by the reader thread.
    responses: Receiver<Result<WorkerResponse>>,
    /// Reader thread, joined once the worker is gone.
    reader: Option<JoinHandle<()>>,
    /// Whether the worker has been killed.
    killed: bool,
}

impl WorkerHandle {
    /// Spawn the worker at `path` and verify it with a ping.
    pub fn spawn(path: &Path) -> Result<Self> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Let worker stderr pass through for debugging
            .spawn()
            .map_err(|e| {
                Error::Ipc(format!(
                    "Failed to spawn worker process '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdout".to_string()))?;

        let (tx, responses) = mpsc::channel();
        let reader = std::thread::Builder::new()
            .name(format!("qcell-worker-{}", child.id()))
            .spawn(move || {
                let mut stdout = BufReader::new(stdout);
                loop {
                    let message = read_message::<_, WorkerResponse>(&mut stdout);
                    let done = message.is_err();
                    if tx.send(message).is_err() || done {
                        break;
                    }
                }
            })?;

        let mut handle = Self {
            child,
            stdin: BufWriter::new(stdin),
            responses,
            reader: Some(reader),
            killed: false,
        };

        handle.send_command(&WorkerCommand::Ping)?;
        match handle.recv_response(Some(HANDSHAKE_TIMEOUT))? {
            WorkerResponse::Pong => {
                debug!("Worker {} ready", handle.pid());
                Ok(handle)
            }
            other => Err(Error::Ipc(format!(
                "Unexpected response from worker: {:?}",
                other
            ))),
        }
    }

    /// Find the qcell-worker binary.
    ///
    /// Looks in the following order:
    /// 1. `explicit`, if given
    /// 2. `QCELL_WORKER_PATH` environment variable
    /// 3. Same directory as the current executable, then its parent
    ///    (test binaries live in `target/<profile>/deps`)
    /// 4. System PATH
    /// 5. `target/debug` or `target/release` of this workspace
    pub fn find_worker_binary(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(Error::Ipc(format!(
                "Configured worker binary '{}' does not exist",
                path.display()
            )));
        }

        if let Some(path) = std::env::var_os(WORKER_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }

        if let Ok(exe_path) = std::env::current_exe() {
            for dir in exe_path.ancestors().skip(1).take(2) {
                let worker_path = dir.join(worker_name());
                if worker_path.exists() {
                    return Ok(worker_path);
                }
            }
        }

        if let Ok(path) = which::which(worker_name()) {
            return Ok(path);
        }

        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        for profile in ["debug", "release"] {
            let path = manifest_dir
                .join("..")
                .join("..")
                .join("target")
                .join(profile)
                .join(worker_name());
            if path.exists() {
                return Ok(path.canonicalize().unwrap_or(path));
            }
        }

        Err(Error::Ipc(format!(
            "Could not find {} binary. Set {} or ensure it's in PATH.",
            worker_name(),
            WORKER_PATH_ENV
        )))
    }

    /// Send a command to the worker.
    pub fn send_command(&mut self, cmd: &WorkerCommand) -> Result<()> {
        if self.killed {
            return Err(Error::Ipc("Worker has been killed".to_string()));
        }
        write_message(&mut self.stdin, cmd)
    }

    /// Wait for the next response, at most `timeout` if given.
    pub fn recv_response(&mut self, timeout: Option<Duration>) -> Result<WorkerResponse> {
        if self.killed {
            return Err(Error::Ipc("Worker has been killed".to_string()));
        }
        match timeout {
            Some(after) => self.responses.recv_timeout(after).map_err(|e| match e {
                RecvTimeoutError::Timeout => Error::Timeout { after },
                RecvTimeoutError::Disconnected => {
                    Error::Ipc("Worker closed its output".to_string())
                }
            })?,
            None => self
                .responses
                .recv()
                .map_err(|_| Error::Ipc("Worker closed its output".to_string()))?,
        }
    }

    /// Kill the worker process immediately and reap it.
    pub fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }

        self.killed = true;

        if let Err(e) = self.child.kill() {
            // InvalidInput means the process already exited, which is fine
            if e.kind() != std::io::ErrorKind::InvalidInput {
                warn!("Failed to kill worker: {}", e);
            }
        }

        // Wait to reap zombie
        let _ = self.child.wait();
        self.join_reader();

        Ok(())
    }

    /// Check if the worker process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.killed {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Get the process ID of the worker.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Graceful shutdown - ask worker to exit cleanly.
    pub fn shutdown(mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }

        let _ = self.send_command(&WorkerCommand::Shutdown);
        let _ = self.recv_response(Some(Duration::from_secs(1)));

        // Drop marks the handle as killed, so take the exit status here.
        self.killed = true;
        let status = self.child.wait();
        self.join_reader();
        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(Error::Ipc(format!("Worker exited with status: {}", status))),
            Err(e) => Err(Error::Ipc(format!("Failed to wait for worker: {}", e))),
        }
    }

    fn join_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Ensure worker is killed when handle is dropped
        let _ = self.kill();
    }
}

/// Thread-safe handle for killing a worker from another thread.
#[derive(Debug, Clone)]
pub struct WorkerKillHandle {
    /// Process ID of the worker.
    pid: u32,
    /// Whether the kill has been requested.
    killed: Arc<AtomicBool>,
}

impl WorkerKillHandle {
    /// Create a kill handle for a worker.
    pub fn new(worker: &WorkerHandle) -> Self {
        Self {
            pid: worker.pid(),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Kill the worker process.
    ///
    /// This can be called from any thread and will immediately terminate
    /// the worker process.
    pub fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return; // Already killed
        }

        #[cfg(unix)]
        {
            // SIGKILL for immediate termination
            unsafe {
                libc::kill(self.pid as i32, libc::SIGKILL);
            }
        }

        #[cfg(not(unix))]
        {
            warn!(
                "Killing worker {} from another thread is not supported on this platform",
                self.pid
            );
        }
    }

    /// Check if kill has been requested.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}
