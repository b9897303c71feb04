//! The cell model a node-graph host drives.
//!
//! A host creates a [`CellInstance`] from a [`CellDescriptor`], assigns its
//! input sockets and calls [`CellInstance::process`] once per tick. The
//! returned [`ReturnCode`] and the cell's outflows decide what runs next.

mod instance;
mod socket;
mod value;

pub use instance::{
    Cell, CellDescriptor, CellInstance, CellState, ProcessContext, ReturnCode, boxed,
};
pub use socket::{
    FlowSpec, Initial, Outflows, SocketSpec, Sockets, Validator, column_names, non_negative_int,
    non_negative_number, numeric_list,
};
pub use value::{Value, ValueType};
