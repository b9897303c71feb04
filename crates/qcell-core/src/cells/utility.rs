//! Flow control and console cells.

use std::time::Duration;

use crate::cell::{
    Cell, CellDescriptor, CellState, FlowSpec, Initial, ProcessContext, ReturnCode, SocketSpec,
    ValueType, boxed, non_negative_number,
};
use crate::error::{Error, Result};
use crate::runner::{Operand, TableOp};

use super::run_table_op;

/// Emits OK on its outflow. Entry point of a flow.
#[derive(Default)]
pub struct Start;

impl Cell for Start {
    fn process(&mut self, state: &mut CellState, _ctx: &ProcessContext) -> Result<()> {
        state.outflows.set(">>", ReturnCode::Ok)?;
        state.set_status("Started.");
        Ok(())
    }
}

pub static START: CellDescriptor = CellDescriptor {
    name: "Start",
    categories: &["Flow Control"],
    summary: "Starts a flow.",
    inputs: &[],
    outputs: &[],
    inflows: &[],
    outflows: &[FlowSpec::new(">>").initial(ReturnCode::Ok)],
    always_reprocess: false,
    threadsafe: false,
    status: "No message available.",
    create: boxed::<Start>,
};

/// Prints `msg` to stdout.
#[derive(Default)]
pub struct Print;

impl Cell for Print {
    fn process(&mut self, state: &mut CellState, _ctx: &ProcessContext) -> Result<()> {
        println!("{}", state.input("msg")?);
        state.outflows.set(">>", ReturnCode::Ok)?;
        state.set_status("Print execution done.");
        Ok(())
    }
}

pub static PRINT: CellDescriptor = CellDescriptor {
    name: "Print",
    categories: &["Utility"],
    summary: "Prints a message to the console.",
    inputs: &[SocketSpec::new("msg", ValueType::Any)
        .initial(Initial::Text("Hello World!"))
        .required()],
    outputs: &[],
    inflows: &[">>"],
    outflows: &[FlowSpec::new(">>")],
    always_reprocess: true,
    threadsafe: true,
    status: "Ready... to print money!",
    create: boxed::<Print>,
};

/// Waits `seconds`.
///
/// With a `data` table the wait happens in a worker that forwards the
/// table, so the wait is bounded and killable like any table operation.
#[derive(Default)]
pub struct Sleep;

impl Cell for Sleep {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let seconds = state
            .inputs
            .require("seconds")?
            .as_number()
            .map_or(0.0, |n| n.as_f64());
        let duration =
            Duration::try_from_secs_f64(seconds).map_err(|e| Error::InvalidSocket {
                socket: "seconds".to_string(),
                reason: e.to_string(),
            })?;

        let data = state.input("data")?.as_table().cloned();
        match data {
            Some(data) => {
                let op = TableOp::Delay {
                    millis: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                };
                let handle = run_table_op(state, ctx, op, vec![Operand::from(data)], Vec::new())?;
                state.output("data", handle)?;
            }
            None => std::thread::sleep(duration),
        }

        state.output("done", true)?;
        state.outflows.set(">>", ReturnCode::Ok)?;
        state.set_status("I have awakened!");
        Ok(())
    }
}

pub static SLEEP: CellDescriptor = CellDescriptor {
    name: "Sleep",
    categories: &["Flow Control"],
    summary: "Waits a number of seconds, optionally gating a table.",
    inputs: &[
        SocketSpec::new("seconds", ValueType::Number)
            .initial(Initial::Int(0))
            .required()
            .validator(non_negative_number),
        SocketSpec::new("data", ValueType::Table),
    ],
    outputs: &[
        SocketSpec::new("done", ValueType::Bool).initial(Initial::Bool(false)),
        SocketSpec::new("data", ValueType::Table),
    ],
    inflows: &[">>"],
    outflows: &[FlowSpec::new(">>")],
    always_reprocess: false,
    threadsafe: false,
    status: "Everything looks good!",
    create: boxed::<Sleep>,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Value;
    use crate::cells::testing::context;
    use std::time::Instant;

    #[test]
    fn test_start() {
        let (_temp, ctx) = context();
        let mut cell = START.instantiate();
        assert_eq!(cell.outflow(">>").unwrap(), ReturnCode::Ok);
        assert_eq!(cell.process(&ctx), ReturnCode::Ok);
        assert_eq!(cell.status_message(), "Started.");
    }

    #[test]
    fn test_print() {
        let (_temp, ctx) = context();
        let mut cell = PRINT.instantiate();
        assert_eq!(cell.outflow(">>").unwrap(), ReturnCode::Unknown);
        assert_eq!(cell.process(&ctx), ReturnCode::Ok);
        assert_eq!(cell.outflow(">>").unwrap(), ReturnCode::Ok);
        assert_eq!(cell.status_message(), "Print execution done.");
    }

    #[test]
    fn test_sleep_in_process() {
        let (_temp, ctx) = context();
        let mut cell = SLEEP.instantiate();
        cell.set_input("seconds", 0.05).unwrap();
        let started = Instant::now();
        assert_eq!(cell.process(&ctx), ReturnCode::Ok);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(cell.output("done").unwrap(), &Value::Bool(true));
    }

    #[test]
    fn test_sleep_rejects_negative() {
        let mut cell = SLEEP.instantiate();
        assert!(cell.set_input("seconds", -1i64).is_err());
        assert_eq!(cell.input("seconds").unwrap(), &Value::Int(0));
    }

    #[test]
    fn test_sleep_beyond_duration_range() {
        let (_temp, ctx) = context();
        let mut cell = SLEEP.instantiate();
        cell.set_input("seconds", 1e300).unwrap();
        assert_eq!(cell.process(&ctx), ReturnCode::Quit);
        assert!(cell.status_message().contains("seconds"));
        assert_eq!(cell.output("done").unwrap(), &Value::Bool(false));
    }
}
