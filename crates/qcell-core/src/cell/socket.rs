//! Typed sockets.
//!
//! A cell declares its sockets statically as [`SocketSpec`]s; each live cell
//! holds the current values in a [`Sockets`] set. Assignments go through the
//! socket's type and validator, and a rejected assignment leaves the previous
//! value in place.

use crate::error::{Error, Result};

use super::instance::ReturnCode;
use super::value::{Value, ValueType};

/// Extra check run on assignment. Returns the reason for rejecting `value`.
pub type Validator = fn(&Value) -> std::result::Result<(), String>;

/// Initial socket value, in a form that fits in a static.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initial {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(&'static str),
    EmptyList,
}

impl Initial {
    pub fn to_value(self) -> Value {
        match self {
            Initial::Null => Value::Null,
            Initial::Bool(b) => Value::Bool(b),
            Initial::Int(i) => Value::Int(i),
            Initial::Float(f) => Value::Float(f),
            Initial::Text(s) => Value::Text(s.to_string()),
            Initial::EmptyList => Value::List(Vec::new()),
        }
    }
}

/// Declaration of one socket.
#[derive(Debug, Clone, Copy)]
pub struct SocketSpec {
    pub name: &'static str,
    pub ty: ValueType,
    pub initial: Initial,
    /// Whether processing needs a non-null value here.
    pub required: bool,
    pub validator: Option<Validator>,
}

impl SocketSpec {
    /// An optional socket that starts out null.
    pub const fn new(name: &'static str, ty: ValueType) -> Self {
        Self {
            name,
            ty,
            initial: Initial::Null,
            required: false,
            validator: None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn initial(mut self, initial: Initial) -> Self {
        self.initial = initial;
        self
    }

    pub const fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Check `value` against the type and validator.
    pub fn check(&self, value: &Value) -> Result<()> {
        if !self.ty.accepts(value) {
            return Err(Error::InvalidSocket {
                socket: self.name.to_string(),
                reason: format!("expected {}, got {}", self.ty, value.type_name()),
            });
        }
        if value.is_null() {
            return Ok(());
        }
        if let Some(validate) = self.validator {
            validate(value).map_err(|reason| Error::InvalidSocket {
                socket: self.name.to_string(),
                reason,
            })?;
        }
        Ok(())
    }
}

/// Declaration of one control-flow output.
#[derive(Debug, Clone, Copy)]
pub struct FlowSpec {
    pub name: &'static str,
    pub initial: ReturnCode,
}

impl FlowSpec {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            initial: ReturnCode::Unknown,
        }
    }

    pub const fn initial(mut self, initial: ReturnCode) -> Self {
        self.initial = initial;
        self
    }
}

/// The current values of a cell's sockets, in declaration order.
#[derive(Debug, Clone)]
pub struct Sockets {
    specs: &'static [SocketSpec],
    values: Vec<Value>,
}

impl Sockets {
    pub fn new(specs: &'static [SocketSpec]) -> Self {
        Self {
            specs,
            values: specs.iter().map(|spec| spec.initial.to_value()).collect(),
        }
    }

    fn index(&self, name: &str) -> Result<usize> {
        self.specs
            .iter()
            .position(|spec| spec.name == name)
            .ok_or_else(|| Error::UnknownSocket(name.to_string()))
    }

    pub fn spec(&self, name: &str) -> Result<&'static SocketSpec> {
        let specs = self.specs;
        Ok(&specs[self.index(name)?])
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        Ok(&self.values[self.index(name)?])
    }

    /// Assign a value after checking it. On error the old value stays.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.index(name)?;
        let value = value.into();
        self.specs[index].check(&value)?;
        self.values[index] = value;
        Ok(())
    }

    /// The value of a required socket; `MissingInput` when it is null.
    pub fn require(&self, name: &str) -> Result<&Value> {
        match self.get(name)? {
            Value::Null => Err(Error::MissingInput(name.to_string())),
            value => Ok(value),
        }
    }

    /// Names of required sockets that are still null.
    pub fn missing(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs
            .iter()
            .zip(&self.values)
            .filter(|(spec, value)| spec.required && value.is_null())
            .map(|(spec, _)| spec.name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        self.specs.iter().map(|spec| spec.name).zip(&self.values)
    }

    pub fn reset(&mut self) {
        for (spec, value) in self.specs.iter().zip(self.values.iter_mut()) {
            *value = spec.initial.to_value();
        }
    }
}

/// The current codes of a cell's control-flow outputs.
#[derive(Debug, Clone)]
pub struct Outflows {
    specs: &'static [FlowSpec],
    codes: Vec<ReturnCode>,
}

impl Outflows {
    pub fn new(specs: &'static [FlowSpec]) -> Self {
        Self {
            specs,
            codes: specs.iter().map(|spec| spec.initial).collect(),
        }
    }

    fn index(&self, name: &str) -> Result<usize> {
        self.specs
            .iter()
            .position(|spec| spec.name == name)
            .ok_or_else(|| Error::UnknownSocket(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<ReturnCode> {
        Ok(self.codes[self.index(name)?])
    }

    pub fn set(&mut self, name: &str, code: ReturnCode) -> Result<()> {
        let index = self.index(name)?;
        self.codes[index] = code;
        Ok(())
    }

    pub fn set_all(&mut self, code: ReturnCode) {
        self.codes.iter_mut().for_each(|c| *c = code);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, ReturnCode)> + '_ {
        self.specs
            .iter()
            .map(|spec| spec.name)
            .zip(self.codes.iter().copied())
    }
}

/// Validator: a non-negative integer.
pub fn non_negative_int(value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::Int(i) if *i >= 0 => Ok(()),
        Value::Int(i) => Err(format!("{i} is negative")),
        other => Err(format!("expected a non-negative integer, got {}", other.type_name())),
    }
}

/// Validator: a finite, non-negative number.
pub fn non_negative_number(value: &Value) -> std::result::Result<(), String> {
    match value.as_number().map(|n| n.as_f64()) {
        Some(x) if x.is_finite() && x >= 0.0 => Ok(()),
        Some(x) => Err(format!("{x} is not a finite non-negative number")),
        None => Err(format!("expected a number, got {}", value.type_name())),
    }
}

/// Validator: a list whose items are all numbers.
pub fn numeric_list(value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::List(items) => match items.iter().position(|v| v.as_number().is_none()) {
            None => Ok(()),
            Some(i) => Err(format!("item {i} is {}, not a number", items[i].type_name())),
        },
        other => Err(format!("expected a list, got {}", other.type_name())),
    }
}

/// Validator: a column name or a list of column names.
pub fn column_names(value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::Text(_) => Ok(()),
        Value::List(items) if items.iter().all(|v| matches!(v, Value::Text(_))) => Ok(()),
        other => Err(format!(
            "expected a column name or a list of names, got {}",
            other.type_name()
        )),
    }
}
