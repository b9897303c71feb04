//! `run`: process one cell outside a host.
//!
//! Inputs are given as `name=<json>`. A JSON object `{"file": .., "node": ..}`
//! refers to a stored table, which is how the output of one `run` feeds the
//! next.

use std::path::Path;
use std::time::{Duration, Instant};

use qcell_core::cell::{ProcessContext, ReturnCode, Value};
use qcell_core::registry;
use qcell_core::runner::RunnerConfig;
use qcell_core::storage::StoreConfig;

use crate::colors;

/// Rows of a table output shown after a run.
const PREVIEW_ROWS: usize = 5;

pub fn execute(
    name: &str,
    inputs: &[String],
    store: &Path,
    timeout: Option<f64>,
) -> anyhow::Result<()> {
    let mut runner = RunnerConfig::default();
    if let Some(secs) = timeout {
        let bound = if secs == 0.0 {
            None
        } else {
            Some(Duration::try_from_secs_f64(secs).map_err(|e| {
                anyhow::anyhow!("timeout must be a non-negative number of seconds: {e}")
            })?)
        };
        runner = runner.with_timeout(bound);
    }
    let ctx = ProcessContext::from_config(StoreConfig::new(store), runner)?;

    let mut cell = registry::create(name)?;
    for assignment in inputs {
        let (socket, json) = parse_assignment(assignment)?;
        let value = Value::from_json(&json, ctx.store())?;
        cell.set_input(socket, value)?;
    }

    let start = Instant::now();
    cell.start(&ctx);
    let code = cell.process(&ctx);
    cell.stop(&ctx);
    let elapsed = start.elapsed();

    println!(
        "{}{}{} {} in {:.2}s: {}",
        colors::for_code(code),
        code,
        colors::RESET,
        cell.name(),
        elapsed.as_secs_f64(),
        cell.status_message()
    );

    for (socket, value) in cell.state().outputs.iter() {
        // `name = json`, uncoloured.
        println!("{} = {}", socket, value.to_json());
        if let Value::Table(handle) = value {
            let rows = handle.row_count()?;
            let preview = handle.rows(0..PREVIEW_ROWS.min(rows))?;
            println!("{preview}");
            if rows > PREVIEW_ROWS {
                println!("{}... {} rows{}", colors::DIM, rows, colors::RESET);
            }
        }
    }
    for (flow, code) in cell.state().outflows.iter() {
        println!("{}{}{} {}", colors::DIM, flow, colors::RESET, code);
    }

    if code == ReturnCode::Quit {
        anyhow::bail!("{} failed: {}", cell.name(), cell.status_message());
    }
    Ok(())
}

/// Split `name=json`. A value that is not valid JSON is taken as text.
fn parse_assignment(assignment: &str) -> anyhow::Result<(&str, serde_json::Value)> {
    let (socket, raw) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected name=value, got `{assignment}`"))?;
    let json = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((socket.trim(), json))
}
