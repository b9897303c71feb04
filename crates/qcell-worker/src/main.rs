//! qcell worker process.
//!
//! Reads length-prefixed commands from stdin and writes responses to
//! stdout. Each table operation a cell asks for runs in one of these, so a
//! crash, a runaway loop or a timeout only ever takes down the worker.
//!
//! Logs go to stderr; stdout belongs to the protocol.

use std::io;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    tracing::debug!("qcell-worker {} ready", std::process::id());

    let stdin = io::stdin();
    let stdout = io::stdout();
    qcell_core::runner::serve(stdin.lock(), stdout.lock())?;
    Ok(())
}
