//! Munition: a capability-attenuated WebAssembly sandbox.
//!
//! Callers submit module bytes, a function name, arguments, a fuel budget,
//! a wall-clock deadline, and a set of capability grants. The sandbox runs
//! the call against a fresh instance and returns either results with
//! accounting metadata or a forensic dump describing exactly how the guest
//! died.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Sandbox / fire()                      │
//! │  (input shaping: fuel policy, capability grants)        │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Executor                           │
//! │  compile → instantiate → invoke → capture → dispose     │
//! └─────────────────────────────────────────────────────────┘
//!              │                            │
//!              ▼                            ▼
//! ┌──────────────────────────┐  ┌──────────────────────────┐
//! │    Runtime contract      │  │   Forensic subsystem     │
//! │  (Wasmtime, fuel, epoch) │  │  (dump, codec, analyser) │
//! └──────────────────────────┘  └──────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use munition::{CallConfig, ExecutionOutcome, Value};
//!
//! match munition::fire(&wasm_bytes, "add", &[Value::I32(20), Value::I32(22)], &CallConfig::default()) {
//!     ExecutionOutcome::Ok { results, metadata } => {
//!         println!("{:?} with {} fuel left", results, metadata.fuel_remaining);
//!     }
//!     ExecutionOutcome::Crash { reason, dump } => {
//!         eprintln!("{}", dump.summary());
//!     }
//! }
//! ```
//!
//! # Isolation
//!
//! Every call gets a fresh engine, store, and instance: memory is
//! zero-initialized, globals are reset, and the fuel ledger is
//! independent. Nothing flows between calls through the sandbox.

pub mod executor;
pub mod meter;

pub use executor::{
    CallConfig, ExecutionMetadata, ExecutionOutcome, Executor, ValidationError, ValidationSpec,
};
pub use meter::{FuelMeter, FuelStats};

pub use munition_common::{
    ComplexityTier, ConfigFile, EngineConfig, ExecutionConfig, FailureReason, FuelError,
    FuelPolicy, RuntimeConfig, RuntimeKind, StackFrame, TrapKind, ValType, Value, MAX_FUEL,
};
pub use munition_core::{CallError, CallQuota, MockRuntime, Runtime, WasmtimeRuntime};
pub use munition_forensics::{
    decode, encode, AnalysisError, CodecError, ForensicDump, MemoryAnalyzer, MemoryStats,
    StringScanOptions, DUMP_EXTENSION, WASM_PAGE_SIZE,
};
pub use munition_host::{
    Capability, CapabilityError, CapabilitySet, GuestLogEntry, GuestLogLevel, ImportTable,
    RiskLevel,
};

use std::sync::{Arc, OnceLock};

/// A configured sandbox: the library's front door.
///
/// Wraps an [`Executor`] with the runtime adapter and fuel policy resolved
/// from configuration. Cheap to share behind an `Arc`; all methods take
/// `&self`.
#[derive(Debug)]
pub struct Sandbox {
    executor: Executor,
}

impl Sandbox {
    /// Build a sandbox from configuration, binding the configured runtime
    /// adapter.
    pub fn new(config: &RuntimeConfig) -> Self {
        let runtime: Arc<dyn Runtime> = match config.runtime {
            RuntimeKind::Wasmtime => Arc::new(WasmtimeRuntime::new(&config.engine)),
            RuntimeKind::Mock => Arc::new(MockRuntime::new()),
        };
        Self::with_runtime(runtime, config)
    }

    /// Build a sandbox over an injected runtime (tests, custom adapters).
    pub fn with_runtime(runtime: Arc<dyn Runtime>, config: &RuntimeConfig) -> Self {
        let policy = FuelPolicy::new(&config.execution);
        Self {
            executor: Executor::new(runtime, policy),
        }
    }

    /// Attach the fuel-accounting sidecar.
    #[must_use]
    pub fn with_fuel_meter(mut self, meter: Arc<FuelMeter>) -> Self {
        self.executor = self.executor.with_meter(meter);
        self
    }

    /// Execute one call. See [`Executor::execute`].
    pub fn fire(
        &self,
        bytes: &[u8],
        function: &str,
        args: &[Value],
        config: &CallConfig,
    ) -> ExecutionOutcome {
        self.executor.execute(bytes, function, args, config)
    }

    /// Structurally check a module without executing it. See
    /// [`Executor::validate`].
    pub fn validate(&self, bytes: &[u8], spec: &ValidationSpec) -> Result<(), ValidationError> {
        self.executor.validate(bytes, spec)
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

fn global() -> &'static Sandbox {
    static GLOBAL: OnceLock<Sandbox> = OnceLock::new();
    GLOBAL.get_or_init(Sandbox::default)
}

/// Execute one call against the process-wide default sandbox.
pub fn fire(
    bytes: &[u8],
    function: &str,
    args: &[Value],
    config: &CallConfig,
) -> ExecutionOutcome {
    global().fire(bytes, function, args, config)
}

/// Validate a module against the process-wide default sandbox.
pub fn validate(bytes: &[u8], spec: &ValidationSpec) -> Result<(), ValidationError> {
    global().validate(bytes, spec)
}
