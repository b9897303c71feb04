//! Variables, containers and arithmetic.

use crate::cell::{
    Cell, CellDescriptor, CellState, Initial, ProcessContext, SocketSpec, Value, ValueType,
    boxed,
};
use crate::error::{Error, Result};
use crate::expr::{self, BinaryFn};
use crate::table::ElementwiseOp;

use super::binary;

/// Holds a value.
#[derive(Default)]
pub struct Variable;

impl Cell for Variable {
    fn process(&mut self, state: &mut CellState, _ctx: &ProcessContext) -> Result<()> {
        let value = state.input("value")?.clone();
        state.output("value", value)?;
        state.set_status("My value has been set.");
        Ok(())
    }
}

pub static VARIABLE: CellDescriptor = CellDescriptor {
    name: "Variable",
    categories: &["Memory"],
    summary: "Declares a variable.",
    inputs: &[SocketSpec::new("value", ValueType::Any).required()],
    outputs: &[SocketSpec::new("value", ValueType::Any)],
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Set my value!",
    create: boxed::<Variable>,
};

/// Length of a list or text, or the row count of a table.
#[derive(Default)]
pub struct Len;

impl Cell for Len {
    fn process(&mut self, state: &mut CellState, _ctx: &ProcessContext) -> Result<()> {
        let len = match state.input("obj")? {
            Value::List(items) => items.len(),
            Value::Text(s) => s.chars().count(),
            Value::Table(handle) => handle.row_count()?,
            other => {
                return Err(Error::InvalidSocket {
                    socket: "obj".to_string(),
                    reason: format!("{} has no length", other.type_name()),
                });
            }
        };
        state.output("len", len as i64)?;
        state.set_status("I counted!");
        Ok(())
    }
}

pub static LEN: CellDescriptor = CellDescriptor {
    name: "Len",
    categories: &["Utility"],
    summary: "Counts the items of a list, text or table.",
    inputs: &[SocketSpec::new("obj", ValueType::Any)
        .initial(Initial::EmptyList)
        .required()],
    outputs: &[SocketSpec::new("len", ValueType::Int).initial(Initial::Int(0))],
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Give me something to len!",
    create: boxed::<Len>,
};

/// Wraps a value into a one-item list.
#[derive(Default)]
pub struct ToList;

impl Cell for ToList {
    fn process(&mut self, state: &mut CellState, _ctx: &ProcessContext) -> Result<()> {
        let item = state.input("obj")?.clone();
        state.output("list", Value::List(vec![item]))?;
        state.set_status("I made a list!");
        Ok(())
    }
}

pub static TO_LIST: CellDescriptor = CellDescriptor {
    name: "To_List",
    categories: &["Memory"],
    summary: "Wraps a value in a list.",
    inputs: &[SocketSpec::new("obj", ValueType::Any).required()],
    outputs: &[SocketSpec::new("list", ValueType::List).initial(Initial::EmptyList)],
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Ready to listify.",
    create: boxed::<ToList>,
};

/// `a op b` for one arithmetic operator.
struct Arithmetic {
    op: ElementwiseOp,
    number: BinaryFn,
    done: &'static str,
}

impl Cell for Arithmetic {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let (a, b) = (state.input("a")?, state.input("b")?);
        let result = binary(state, ctx, a, b, self.op, |a, b| self.scalar(a, b))?;
        state.output("result", result)?;
        state.set_status(self.done);
        Ok(())
    }
}

impl Arithmetic {
    fn scalar(&self, a: &Value, b: &Value) -> Result<Value> {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return Ok((self.number)(x, y)?.into());
        }
        match (self.op, a, b) {
            (ElementwiseOp::Add, Value::Text(x), Value::Text(y)) => Ok(Value::Text(format!("{x}{y}"))),
            (ElementwiseOp::Add, Value::List(x), Value::List(y)) => {
                Ok(Value::List(x.iter().chain(y).cloned().collect()))
            }
            _ => Err(Error::Evaluation(format!(
                "unsupported operand types for {}: {} and {}",
                self.op.name(),
                a.type_name(),
                b.type_name()
            ))),
        }
    }
}

const OPERANDS: &[SocketSpec] = &[
    SocketSpec::new("a", ValueType::Any).required(),
    SocketSpec::new("b", ValueType::Any).required(),
];

const RESULT: &[SocketSpec] = &[SocketSpec::new("result", ValueType::Any)];

macro_rules! arithmetic_cell {
    ($static:ident, $name:literal, $summary:literal, $op:expr, $number:path, $done:literal) => {
        pub static $static: CellDescriptor = CellDescriptor {
            name: $name,
            categories: &["Operators", "Algebraic"],
            summary: $summary,
            inputs: OPERANDS,
            outputs: RESULT,
            inflows: &[],
            outflows: &[],
            always_reprocess: false,
            threadsafe: true,
            status: "No message available.",
            create: {
                fn create() -> Box<dyn Cell> {
                    Box::new(Arithmetic {
                        op: $op,
                        number: $number,
                        done: $done,
                    })
                }
                create
            },
        };
    };
}

arithmetic_cell!(ADD, "Add", "a + b. Concatenates text and lists.", ElementwiseOp::Add, expr::add, "I added a and b.");
arithmetic_cell!(SUB, "Sub", "a - b.", ElementwiseOp::Subtract, expr::sub, "I subtracted b from a.");
arithmetic_cell!(MUL, "Mul", "a * b.", ElementwiseOp::Multiply, expr::mul, "I multiplied a and b.");
arithmetic_cell!(DIV, "Div", "a / b.", ElementwiseOp::TrueDivide, expr::true_div, "I divided a by b.");
arithmetic_cell!(
    INT_DIV,
    "Int_Div",
    "a // b.",
    ElementwiseOp::FloorDivide,
    expr::floor_div,
    "I integer divided a and b."
);
arithmetic_cell!(POW, "Pow", "a ** b.", ElementwiseOp::Power, expr::pow, "I exponentiated a by b.");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ReturnCode;
    use crate::cells::testing::context;
    use crate::storage::{NodeKey, ResultHandle};
    use crate::table::{ColumnData, Table};

    fn run(descriptor: &'static CellDescriptor, a: Value, b: Value) -> (ReturnCode, Value) {
        let (_temp, ctx) = context();
        let mut cell = descriptor.instantiate();
        cell.set_input("a", a).unwrap();
        cell.set_input("b", b).unwrap();
        let code = cell.process(&ctx);
        (code, cell.output("result").unwrap().clone())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run(&ADD, 2i64.into(), 3i64.into()).1, Value::Int(5));
        assert_eq!(run(&SUB, 2i64.into(), 3.5.into()).1, Value::Float(-1.5));
        assert_eq!(run(&MUL, 4i64.into(), 3i64.into()).1, Value::Int(12));
        assert_eq!(run(&DIV, 7i64.into(), 2i64.into()).1, Value::Float(3.5));
        assert_eq!(run(&INT_DIV, (-7i64).into(), 2i64.into()).1, Value::Int(-4));
        assert_eq!(run(&POW, 2i64.into(), 10i64.into()).1, Value::Int(1024));
    }

    #[test]
    fn test_add_concatenates() {
        assert_eq!(run(&ADD, "ab".into(), "cd".into()).1, Value::from("abcd"));
        assert_eq!(
            run(&ADD, vec![1i64].into(), vec![2i64].into()).1,
            Value::from(vec![1i64, 2])
        );
    }

    #[test]
    fn test_errors_become_return_codes() {
        let (code, result) = run(&DIV, 1i64.into(), 0i64.into());
        assert_eq!(code, ReturnCode::Quit);
        assert_eq!(result, Value::Null);
        assert_eq!(run(&SUB, "a".into(), "b".into()).0, ReturnCode::Quit);
    }

    #[test]
    fn test_table_operand_goes_to_worker() {
        // The test context has no worker binary, so the isolated run fails
        // and the cell reports it instead of computing in-process.
        let (_temp, ctx) = context();
        let key = NodeKey::new("t", "v").unwrap();
        let handle = ResultHandle::write(
            ctx.store().clone(),
            key,
            &Table::single("v", ColumnData::Int(vec![1, 2])),
            &[],
        )
        .unwrap();
        let mut cell = ADD.instantiate();
        cell.set_input("a", handle).unwrap();
        cell.set_input("b", 1i64).unwrap();
        assert_eq!(cell.process(&ctx), ReturnCode::Quit);
        assert!(cell.status_message().contains("IPC error"));
    }

    #[test]
    fn test_len_and_to_list() {
        let (_temp, ctx) = context();
        let mut len = LEN.instantiate();
        len.set_input("obj", "héllo").unwrap();
        assert_eq!(len.process(&ctx), ReturnCode::Ok);
        assert_eq!(len.output("len").unwrap(), &Value::Int(5));

        let mut wrap = TO_LIST.instantiate();
        wrap.set_input("obj", 3i64).unwrap();
        wrap.process(&ctx);
        assert_eq!(wrap.output("list").unwrap(), &Value::from(vec![3i64]));

        let mut var = VARIABLE.instantiate();
        var.set_input("value", "x").unwrap();
        var.process(&ctx);
        assert_eq!(var.output("value").unwrap(), &Value::from("x"));
    }
}
