//! The runtime contract.
//!
//! Everything the execution manager needs from a Wasm engine is expressed
//! through three object-safe traits: [`Runtime`] (compilation),
//! [`ModuleHandle`] (introspection and instantiation), and
//! [`InstanceHandle`] (invocation, fuel accounting, post-mortem memory
//! access, disposal). The Wasmtime adapter is the statically bound default;
//! the scriptable mock in [`crate::mock`] stands in for it in tests.
//!
//! Two requirements disqualify engines that cannot meet them:
//! - linear memory must remain readable after a trap
//! - the fuel ledger must be readable at any point after instantiation

use std::time::Duration;

use munition_common::{RuntimeError, StackFrame, TrapKind, Value};
use munition_host::{GuestLogEntry, ImportTable};

/// Per-call resource quota attached to a compiled module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallQuota {
    /// Fuel budget the instance's ledger is primed with.
    pub fuel: u64,

    /// Wall-clock deadline for a single call; `0` disables the deadline.
    pub timeout_ms: u64,
}

impl CallQuota {
    /// Quota with the given fuel and no deadline.
    pub fn fuel_only(fuel: u64) -> Self {
        Self {
            fuel,
            timeout_ms: 0,
        }
    }

    /// The deadline as a [`Duration`], if one is set.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// An import a module declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    /// Import module namespace (e.g. `env`).
    pub module: String,

    /// Imported function name.
    pub name: String,
}

impl std::fmt::Display for ImportRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// How a call ended, when it did not return normally.
///
/// These are classified outcomes, not mechanical errors: the adapter has
/// already normalized whatever the engine reported.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    /// The fuel budget ran out mid-execution.
    #[error("fuel exhausted")]
    FuelExhausted,

    /// The guest trapped.
    #[error("wasm trap ({kind}): {detail}")]
    Trap {
        /// Normalized trap classification.
        kind: TrapKind,
        /// Engine-reported detail text.
        detail: String,
        /// Guest stack frames, innermost first; empty when the engine
        /// reported none.
        frames: Vec<StackFrame>,
    },

    /// The engine was interrupted by the wall-clock deadline.
    #[error("execution interrupted by deadline")]
    Interrupted,

    /// The named export does not exist or is not a function.
    #[error("function '{name}' not found")]
    FunctionNotFound {
        /// The requested export name.
        name: String,
    },

    /// Anything the classifier could not place.
    #[error("{detail}")]
    Other {
        /// Pass-through detail text.
        detail: String,
    },
}

impl CallError {
    /// Create an `Other` outcome.
    pub fn other(detail: impl Into<String>) -> Self {
        Self::Other {
            detail: detail.into(),
        }
    }
}

/// A pluggable Wasm engine.
pub trait Runtime: Send + Sync {
    /// Short identifier for logs (`"wasmtime"`, `"mock"`).
    fn name(&self) -> &'static str;

    /// Compile and validate module bytes under a per-call quota.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CompilationFailed`] for invalid bytes.
    fn compile(&self, bytes: &[u8], quota: CallQuota) -> Result<Box<dyn ModuleHandle>, RuntimeError>;
}

/// A compiled module, re-instantiable until dropped.
pub trait ModuleHandle: Send + std::fmt::Debug {
    /// Instantiate with the given import surface.
    ///
    /// The instance's memory is zero-initialized and its fuel ledger is
    /// primed to the quota given at compile time.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InstantiationFailed`] when imports cannot be
    /// satisfied or the start function traps.
    fn instantiate(&self, imports: &ImportTable) -> Result<Box<dyn InstanceHandle>, RuntimeError>;

    /// Names of everything the module exports.
    fn export_names(&self) -> Vec<String>;

    /// Everything the module imports.
    fn import_refs(&self) -> Vec<ImportRef>;
}

/// One live execution: instance plus its store.
///
/// Accessors must keep working after a trap; that is the whole point of the
/// forensic capture path.
pub trait InstanceHandle: Send {
    /// Invoke an exported function.
    fn call(&mut self, function: &str, args: &[Value]) -> Result<Vec<Value>, CallError>;

    /// Fuel left in the ledger. Zero after disposal.
    fn fuel_remaining(&self) -> u64;

    /// Snapshot the complete linear memory.
    ///
    /// Empty when the module exports no memory or the instance was
    /// disposed; never an error.
    fn capture_memory(&mut self) -> Vec<u8>;

    /// Take the guest log entries accumulated so far.
    fn drain_logs(&mut self) -> Vec<GuestLogEntry>;

    /// Release engine resources. Idempotent.
    fn dispose(&mut self);
}
