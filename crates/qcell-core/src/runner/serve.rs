//! Worker side of isolated execution.

use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::storage::{Store, StoreConfig};

use super::protocol::{WorkerCommand, WorkerResponse, try_read_message, write_message};
use super::task::execute_task;

/// Answer commands from `reader` on `writer` until `Shutdown` or end of input.
///
/// Task errors and panics are reported to the parent as responses; only
/// protocol failures end the loop with an error.
pub fn serve<R: Read, W: Write>(mut reader: R, mut writer: W) -> Result<()> {
    loop {
        let Some(command) = try_read_message::<_, WorkerCommand>(&mut reader)? else {
            // Parent closed our stdin.
            debug!("Command stream closed, exiting");
            return Ok(());
        };

        let response = match command {
            WorkerCommand::Ping => WorkerResponse::Pong,
            WorkerCommand::Shutdown => {
                write_message(&mut writer, &WorkerResponse::ShuttingDown)?;
                info!("Worker shutting down");
                return Ok(());
            }
            WorkerCommand::Run {
                store_root,
                row_group_size,
                task,
            } => {
                let config = StoreConfig::new(PathBuf::from(store_root))
                    .with_row_group_size(row_group_size as usize);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    let store = Store::open(config)?;
                    execute_task(&store, &task)
                }));
                match outcome {
                    Ok(Ok(rows)) => WorkerResponse::Persisted { rows: rows as u64 },
                    Ok(Err(e)) => {
                        warn!("{} for {} failed: {}", task.op.name(), task.caller, e);
                        WorkerResponse::Failed {
                            message: e.to_string(),
                        }
                    }
                    Err(payload) => WorkerResponse::Panic {
                        message: panic_message(payload.as_ref()),
                    },
                }
            }
        };

        write_message(&mut writer, &response)?;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
