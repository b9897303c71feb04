//! Cell trait, descriptors and live instances.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::runner::{IsolatedRunner, RunnerConfig, RunnerKillHandle};
use crate::storage::{NodeKey, ResultHandle, Store, StoreConfig};

use super::socket::{FlowSpec, Outflows, SocketSpec, Sockets};
use super::value::Value;

/// Code a cell hands back to the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnCode {
    /// Downstream cells may run.
    Ok,
    /// Result not available; downstream cells wait.
    Unknown,
    /// Abort the run.
    Quit,
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReturnCode::Ok => "OK",
            ReturnCode::Unknown => "UNKNOWN",
            ReturnCode::Quit => "QUIT",
        })
    }
}

/// Shared services available while a cell processes.
#[derive(Clone)]
pub struct ProcessContext {
    runner: IsolatedRunner,
}

impl ProcessContext {
    pub fn new(runner: IsolatedRunner) -> Self {
        Self { runner }
    }

    /// Open the store and build a runner over it.
    pub fn from_config(store: StoreConfig, runner: RunnerConfig) -> Result<Self> {
        Ok(Self::new(IsolatedRunner::new(Store::open(store)?, runner)))
    }

    pub fn runner(&self) -> &IsolatedRunner {
        &self.runner
    }

    pub fn store(&self) -> &Store {
        self.runner.store()
    }
}

/// Behaviour of a cell type.
///
/// `process` reads inputs from and writes outputs into `state`. Errors are
/// turned into a status message and a return code by [`CellInstance`];
/// they never reach the host.
pub trait Cell: Send {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()>;

    fn start(&mut self, _state: &mut CellState, _ctx: &ProcessContext) {}

    /// Kill the isolated work in flight for this cell. Other cells sharing
    /// the context keep running.
    fn stop(&mut self, state: &mut CellState, ctx: &ProcessContext) {
        ctx.runner().kill_handle_for(state.caller()).kill();
    }
}

/// Static description of a cell type.
pub struct CellDescriptor {
    pub name: &'static str,
    pub categories: &'static [&'static str],
    pub summary: &'static str,
    pub inputs: &'static [SocketSpec],
    pub outputs: &'static [SocketSpec],
    pub inflows: &'static [&'static str],
    pub outflows: &'static [FlowSpec],
    /// Process on every tick, even when no input changed.
    pub always_reprocess: bool,
    /// May run on a host thread instead of being scheduled separately.
    pub threadsafe: bool,
    /// Status message before the first `process`.
    pub status: &'static str,
    pub create: fn() -> Box<dyn Cell>,
}

impl CellDescriptor {
    pub fn input(&self, name: &str) -> Option<&'static SocketSpec> {
        let inputs = self.inputs;
        inputs.iter().find(|spec| spec.name == name)
    }

    pub fn instantiate(&'static self) -> CellInstance {
        CellInstance::new(self)
    }
}

impl std::fmt::Debug for CellDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellDescriptor")
            .field("name", &self.name)
            .field("categories", &self.categories)
            .finish_non_exhaustive()
    }
}

/// Socket values and status of one live cell.
#[derive(Debug)]
pub struct CellState {
    id: u64,
    pub inputs: Sockets,
    pub outputs: Sockets,
    pub outflows: Outflows,
    status: String,
}

impl CellState {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Caller name on every isolated task this cell runs.
    pub fn caller(&self) -> String {
        self.id.to_string()
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    /// Where table cells persist their result: file `<id>`, node `c<id>`.
    pub fn result_key(&self) -> Result<NodeKey> {
        NodeKey::new(self.id.to_string(), format!("c{}", self.id))
    }

    /// A required table input.
    pub fn table(&self, name: &str) -> Result<&ResultHandle> {
        let value = self.inputs.require(name)?;
        value.as_table().ok_or_else(|| Error::InvalidSocket {
            socket: name.to_string(),
            reason: format!("expected table, got {}", value.type_name()),
        })
    }

    /// A required text input.
    pub fn text(&self, name: &str) -> Result<&str> {
        let value = self.inputs.require(name)?;
        value.as_str().ok_or_else(|| Error::InvalidSocket {
            socket: name.to_string(),
            reason: format!("expected text, got {}", value.type_name()),
        })
    }

    pub fn input(&self, name: &str) -> Result<&Value> {
        self.inputs.get(name)
    }

    pub fn output(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.outputs.set(name, value)
    }
}

/// Constructor for cells that carry no state of their own.
pub fn boxed<C: Cell + Default + 'static>() -> Box<dyn Cell> {
    Box::new(C::default())
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One live cell: a descriptor, its behaviour and its socket state.
pub struct CellInstance {
    descriptor: &'static CellDescriptor,
    cell: Box<dyn Cell>,
    state: CellState,
}

impl CellInstance {
    /// Create a cell with a fresh process-unique id.
    pub fn new(descriptor: &'static CellDescriptor) -> Self {
        Self::with_id(descriptor, NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn with_id(descriptor: &'static CellDescriptor, id: u64) -> Self {
        Self {
            descriptor,
            cell: (descriptor.create)(),
            state: CellState {
                id,
                inputs: Sockets::new(descriptor.inputs),
                outputs: Sockets::new(descriptor.outputs),
                outflows: Outflows::new(descriptor.outflows),
                status: descriptor.status.to_string(),
            },
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn descriptor(&self) -> &'static CellDescriptor {
        self.descriptor
    }

    pub fn state(&self) -> &CellState {
        &self.state
    }

    /// Assign an input socket. Rejected values leave the old value in place.
    pub fn set_input(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.state.inputs.set(name, value)
    }

    pub fn input(&self, name: &str) -> Result<&Value> {
        self.state.inputs.get(name)
    }

    pub fn output(&self, name: &str) -> Result<&Value> {
        self.state.outputs.get(name)
    }

    pub fn outflow(&self, name: &str) -> Result<ReturnCode> {
        self.state.outflows.get(name)
    }

    pub fn status_message(&self) -> &str {
        &self.state.status
    }

    pub fn start(&mut self, ctx: &ProcessContext) {
        self.cell.start(&mut self.state, ctx);
    }

    pub fn stop(&mut self, ctx: &ProcessContext) {
        self.cell.stop(&mut self.state, ctx);
    }

    /// A handle that kills this cell's isolated work from another thread,
    /// for hosts that stop a cell while `process` holds it.
    pub fn kill_handle(&self, ctx: &ProcessContext) -> RunnerKillHandle {
        ctx.runner().kill_handle_for(self.state.caller())
    }

    /// Run the cell once.
    ///
    /// Never fails: an error becomes the status message, every outflow is
    /// set to `Unknown` and the error's return code is handed back. The
    /// status starts from the descriptor's on every call, so a stale error
    /// never outlives a successful tick.
    pub fn process(&mut self, ctx: &ProcessContext) -> ReturnCode {
        self.state.status = self.descriptor.status.to_string();
        let missing = self.state.inputs.missing().next();
        let result = match missing {
            Some(name) => Err(Error::MissingInput(name.to_string())),
            None => self.cell.process(&mut self.state, ctx),
        };

        match result {
            Ok(()) => {
                debug!("{} #{} processed", self.descriptor.name, self.state.id);
                ReturnCode::Ok
            }
            Err(e) => {
                warn!("{} #{} failed: {}", self.descriptor.name, self.state.id, e);
                self.state.status = e.to_string();
                self.state.outflows.set_all(ReturnCode::Unknown);
                e.return_code()
            }
        }
    }
}

impl std::fmt::Debug for CellInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellInstance")
            .field("name", &self.descriptor.name)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::socket::Initial;
    use crate::cell::value::ValueType;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Double;

    impl Cell for Double {
        fn process(&mut self, state: &mut CellState, _ctx: &ProcessContext) -> Result<()> {
            let x = match state.input("x")? {
                Value::Int(i) => *i,
                _ => return Err(Error::Evaluation("not an int".into())),
            };
            let doubled = x
                .checked_mul(2)
                .ok_or_else(|| Error::Evaluation("overflow".into()))?;
            state.output("y", doubled)?;
            state.outflows.set(">>", ReturnCode::Ok)?;
            state.set_status("doubled");
            Ok(())
        }
    }

    static DOUBLE: CellDescriptor = CellDescriptor {
        name: "Double",
        categories: &["Test"],
        summary: "Doubles x.",
        inputs: &[SocketSpec::new("x", ValueType::Int)
            .initial(Initial::Int(1))
            .required()],
        outputs: &[SocketSpec::new("y", ValueType::Int)],
        inflows: &[">>"],
        outflows: &[FlowSpec::new(">>")],
        always_reprocess: false,
        threadsafe: true,
        status: "ready",
        create: boxed::<Double>,
    };

    fn context() -> (TempDir, ProcessContext) {
        let temp = TempDir::new().unwrap();
        let ctx = ProcessContext::from_config(
            StoreConfig::new(temp.path()),
            RunnerConfig::default(),
        )
        .unwrap();
        (temp, ctx)
    }

    #[test]
    fn test_process_ok() {
        let (_temp, ctx) = context();
        let mut cell = DOUBLE.instantiate();
        assert_eq!(cell.status_message(), "ready");
        cell.set_input("x", 21i64).unwrap();
        assert_eq!(cell.process(&ctx), ReturnCode::Ok);
        assert_eq!(cell.output("y").unwrap(), &Value::Int(42));
        assert_eq!(cell.outflow(">>").unwrap(), ReturnCode::Ok);
        assert_eq!(cell.status_message(), "doubled");
    }

    #[test]
    fn test_error_becomes_status() {
        let (_temp, ctx) = context();
        let mut cell = DOUBLE.instantiate();
        cell.set_input("x", i64::MAX).unwrap();
        assert_eq!(cell.process(&ctx), ReturnCode::Quit);
        assert!(cell.status_message().contains("overflow"));
        assert_eq!(cell.outflow(">>").unwrap(), ReturnCode::Unknown);
    }

    #[test]
    fn test_missing_required_input() {
        let (_temp, ctx) = context();
        let mut cell = DOUBLE.instantiate();
        cell.set_input("x", Value::Null).unwrap();
        assert_eq!(cell.process(&ctx), ReturnCode::Unknown);
        assert_eq!(cell.status_message(), "missing required input `x`");
    }

    #[derive(Default)]
    struct Silent;

    impl Cell for Silent {
        fn process(&mut self, state: &mut CellState, _ctx: &ProcessContext) -> Result<()> {
            match state.input("x")? {
                Value::Int(i) if *i < 0 => Err(Error::Evaluation("negative".into())),
                _ => Ok(()),
            }
        }
    }

    static SILENT: CellDescriptor = CellDescriptor {
        name: "Silent",
        categories: &["Test"],
        summary: "Never sets a status.",
        inputs: &[SocketSpec::new("x", ValueType::Int).initial(Initial::Int(0))],
        outputs: &[],
        inflows: &[],
        outflows: &[FlowSpec::new(">>")],
        always_reprocess: false,
        threadsafe: true,
        status: "idle",
        create: boxed::<Silent>,
    };

    #[test]
    fn test_success_clears_previous_error() {
        let (_temp, ctx) = context();
        let mut cell = SILENT.instantiate();
        cell.set_input("x", -1i64).unwrap();
        assert_eq!(cell.process(&ctx), ReturnCode::Quit);
        assert!(cell.status_message().contains("negative"));

        cell.set_input("x", 1i64).unwrap();
        assert_eq!(cell.process(&ctx), ReturnCode::Ok);
        assert_eq!(cell.status_message(), "idle");
    }

    #[test]
    fn test_ids_are_unique() {
        let a = DOUBLE.instantiate();
        let b = DOUBLE.instantiate();
        assert_ne!(a.id(), b.id());
        let c = CellInstance::with_id(&DOUBLE, 7);
        assert_eq!(c.state().result_key().unwrap().to_string(), "7/c7");
    }
}
