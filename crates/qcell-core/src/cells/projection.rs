//! Time-series projection: `f(t)` over a list of `t` values.

use crate::cell::{
    Cell, CellDescriptor, CellState, Initial, ProcessContext, SocketSpec, Value, ValueType, boxed,
    numeric_list,
};
use crate::error::{Error, Result};
use crate::expr::{self, Number};

const PLACEHOLDER: &str = "t";

const INPUTS: &[SocketSpec] = &[
    SocketSpec::new("f(t)", ValueType::Text)
        .initial(Initial::Text(PLACEHOLDER))
        .required(),
    SocketSpec::new("t", ValueType::List)
        .initial(Initial::EmptyList)
        .required()
        .validator(numeric_list),
];

const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("ans", ValueType::List).initial(Initial::EmptyList)];

fn inputs(state: &CellState) -> Result<(String, Vec<Number>)> {
    let source = state.text("f(t)")?.to_string();
    let values = match state.inputs.require("t")? {
        Value::List(items) => items
            .iter()
            .map(|item| {
                item.as_number().ok_or_else(|| Error::InvalidSocket {
                    socket: "t".to_string(),
                    reason: format!("{} is not a number", item.type_name()),
                })
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(Error::InvalidSocket {
                socket: "t".to_string(),
                reason: format!("expected list, got {}", other.type_name()),
            });
        }
    };
    Ok((source, values))
}

/// Evaluates `f(t)` for every `t`; any failing element fails the cell.
#[derive(Default)]
pub struct AstColumn;

impl Cell for AstColumn {
    fn process(&mut self, state: &mut CellState, _ctx: &ProcessContext) -> Result<()> {
        let (source, values) = inputs(state)?;
        let ans = expr::project(&source, PLACEHOLDER, &values)?;
        state.output("ans", Value::List(ans.into_iter().map(Value::from).collect()))?;
        state.set_status("No problems boss!");
        Ok(())
    }
}

pub static AST_COLUMN: CellDescriptor = CellDescriptor {
    name: "AstColumn",
    categories: &["Math", "Numeric"],
    summary: "Evaluates f(t) for each t with the safe expression evaluator.",
    inputs: INPUTS,
    outputs: OUTPUTS,
    inflows: &[">>"],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "No problems boss!",
    create: boxed::<AstColumn>,
};

/// Vector flavour of [`AstColumn`]: every element is a float, and elements
/// whose evaluation fails become NaN instead of failing the cell.
#[derive(Default)]
pub struct NumpyColumn;

impl Cell for NumpyColumn {
    fn process(&mut self, state: &mut CellState, _ctx: &ProcessContext) -> Result<()> {
        let (source, values) = inputs(state)?;
        let ans = expr::project_each(&source, PLACEHOLDER, &values)?
            .into_iter()
            .map(|result| Value::Float(result.map_or(f64::NAN, Number::as_f64)))
            .collect();
        state.output("ans", Value::List(ans))?;
        state.set_status("No problems boss!");
        Ok(())
    }
}

pub static NUMPY_COLUMN: CellDescriptor = CellDescriptor {
    name: "NumpyColumn",
    categories: &["Math", "Numeric"],
    summary: "Evaluates f(t) over the whole t vector as floats.",
    inputs: INPUTS,
    outputs: OUTPUTS,
    inflows: &[">>"],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "No problems boss!",
    create: boxed::<NumpyColumn>,
};
