//! Isolated execution of table operations.
//!
//! The parent side ([`IsolatedRunner`]) spawns a `qcell-worker` process per
//! task and talks to it over stdin/stdout. The worker side ([`serve`])
//! applies the task against the shared store and writes the result before
//! it answers, so a successful response always points at durable data.

mod isolated;
mod protocol;
mod serve;
mod task;
mod worker;

pub use isolated::{DEFAULT_TIMEOUT, IsolatedRunner, RunnerConfig, RunnerKillHandle, TIMEOUT_ENV};
pub use protocol::{
    MAX_MESSAGE_LEN, WorkerCommand, WorkerResponse, read_message, try_read_message, write_message,
};
pub use serve::serve;
pub use task::{IsolatedTask, Operand, TableOp, execute_task};
pub use worker::{WORKER_PATH_ENV, WorkerHandle, WorkerKillHandle};
