//! Branching and boolean operator cells.

use crate::cell::{
    Cell, CellDescriptor, CellState, FlowSpec, Initial, ProcessContext, ReturnCode, SocketSpec,
    Value, ValueType, boxed,
};
use crate::error::{Error, Result};
use crate::expr::{self, Number};
use crate::table::{CompareOp, ElementwiseOp};

use super::binary;

/// Routes the flow to `true >>` or `false >>`.
#[derive(Default)]
pub struct If;

impl Cell for If {
    fn process(&mut self, state: &mut CellState, _ctx: &ProcessContext) -> Result<()> {
        let (taken, other) = if state.input("condition")?.truthy() {
            ("true >>", "false >>")
        } else {
            ("false >>", "true >>")
        };
        state.outflows.set(taken, ReturnCode::Ok)?;
        state.outflows.set(other, ReturnCode::Unknown)?;
        state.set_status(format!("Took `{taken}`."));
        Ok(())
    }
}

pub static IF: CellDescriptor = CellDescriptor {
    name: "If",
    categories: &["Flow Control"],
    summary: "Chooses which outflow receives the execution token.",
    inputs: &[SocketSpec::new("condition", ValueType::Any)
        .initial(Initial::Bool(true))
        .required()],
    outputs: &[],
    inflows: &[">>"],
    outflows: &[FlowSpec::new("true >>"), FlowSpec::new("false >>")],
    always_reprocess: true,
    threadsafe: true,
    status: "All is quiet...",
    create: boxed::<If>,
};

/// `a op b` for one comparison operator.
struct Comparison(CompareOp);

impl Cell for Comparison {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let op = self.0;
        let result = binary(
            state,
            ctx,
            state.input("a")?,
            state.input("b")?,
            ElementwiseOp::Compare(op),
            |a, b| compare(op, a, b).map(Value::Bool),
        )?;
        state.output("result", result)?;
        state.set_status("Testing done.");
        Ok(())
    }
}

fn compare(op: CompareOp, a: &Value, b: &Value) -> Result<bool> {
    match op {
        CompareOp::Eq => Ok(a.loosely_equals(b)),
        CompareOp::Ne => Ok(!a.loosely_equals(b)),
        _ => match a.compare(b) {
            Some(ordering) => Ok(op.holds(Some(ordering))),
            None => Err(Error::Evaluation(format!(
                "cannot compare {} {} {}",
                a.type_name(),
                op,
                b.type_name()
            ))),
        },
    }
}

/// `a | b` or `a & b`.
struct Bitwise(ElementwiseOp);

impl Cell for Bitwise {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let op = self.0;
        let (a, b) = (state.input("a")?, state.input("b")?);
        let result = binary(state, ctx, a, b, op, |a, b| bitwise(op, a, b))?;
        state.output("result", result)?;
        state.set_status(match op {
            ElementwiseOp::BitOr => "Bitwise | done.",
            _ => "Bitwise & done.",
        });
        Ok(())
    }
}

fn bitwise(op: ElementwiseOp, a: &Value, b: &Value) -> Result<Value> {
    if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
        return Ok(Value::Bool(match op {
            ElementwiseOp::BitOr => *x || *y,
            _ => *x && *y,
        }));
    }
    let operand = |v: &Value| -> Result<Number> {
        v.as_number().ok_or_else(|| {
            Error::Evaluation(format!("bitwise operators need integers, got {}", v.type_name()))
        })
    };
    let f = match op {
        ElementwiseOp::BitOr => expr::bit_or,
        _ => expr::bit_and,
    };
    Ok(f(operand(a)?, operand(b)?)?.into())
}

const OPERANDS: &[SocketSpec] = &[
    SocketSpec::new("a", ValueType::Any).required(),
    SocketSpec::new("b", ValueType::Any).required(),
];

const RESULT: &[SocketSpec] = &[SocketSpec::new("result", ValueType::Any)];

macro_rules! operator_cell {
    ($static:ident, $name:literal, $summary:literal, $ready:literal, $cell:expr) => {
        pub static $static: CellDescriptor = CellDescriptor {
            name: $name,
            categories: &["Operators", "Boolean"],
            summary: $summary,
            inputs: OPERANDS,
            outputs: RESULT,
            inflows: &[],
            outflows: &[],
            always_reprocess: false,
            threadsafe: false,
            status: $ready,
            create: {
                fn create() -> Box<dyn Cell> {
                    Box::new($cell)
                }
                create
            },
        };
    };
}

operator_cell!(EQ, "Eq", "Whether a == b.", "Ready to test equality.", Comparison(CompareOp::Eq));
operator_cell!(GT, "Gt", "Whether a > b.", "Ready to test greater than.", Comparison(CompareOp::Gt));
operator_cell!(
    GTE,
    "Gte",
    "Whether a >= b.",
    "Ready to test greater than or equal.",
    Comparison(CompareOp::Ge)
);
operator_cell!(LT, "Lt", "Whether a < b.", "Ready to test less than.", Comparison(CompareOp::Lt));
operator_cell!(
    LTE,
    "Lte",
    "Whether a <= b.",
    "Ready to test less than or equal.",
    Comparison(CompareOp::Le)
);
operator_cell!(BITWISE_OR, "Bitwise_Or", "a | b.", "Ready to |.", Bitwise(ElementwiseOp::BitOr));
operator_cell!(BITWISE_AND, "Bitwise_And", "a & b.", "Ready to &.", Bitwise(ElementwiseOp::BitAnd));
