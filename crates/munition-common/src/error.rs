//! Error types for the Munition sandbox.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`RuntimeError`]: Engine-mechanical errors (compile, instantiate, link)
//! - [`TrapKind`]: Classified in-engine fatal conditions
//! - [`FailureReason`]: The tagged failure variant recorded in forensic dumps
//! - [`StackFrame`]: A single guest stack frame descriptor

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine-mechanical errors.
///
/// These errors represent failures of the runtime machinery itself, before
/// or around guest execution. Guest-level terminations (traps, fuel
/// exhaustion) are not errors at this layer; they are classified call
/// outcomes that the execution manager turns into forensic dumps.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// WebAssembly compilation failed.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// Module instantiation failed (bad imports, start-function trap).
    #[error("Instantiation failed: {reason}")]
    InstantiationFailed {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Registering a host function on the engine linker failed.
    #[error("Host function registration failed: {reason}")]
    LinkFailed {
        /// Description of the linking failure.
        reason: String,
    },
}

impl RuntimeError {
    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `InstantiationFailed` error.
    pub fn instantiation_failed(reason: impl Into<String>) -> Self {
        Self::InstantiationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a new `LinkFailed` error.
    pub fn link_failed(reason: impl Into<String>) -> Self {
        Self::LinkFailed {
            reason: reason.into(),
        }
    }
}

/// Classified trap kinds.
///
/// Engines report traps in engine-specific ways; the runtime adapter
/// normalizes them into this closed set before they reach a dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrapKind {
    /// An `unreachable` instruction was executed.
    Unreachable,
    /// A linear memory or table access was out of bounds.
    OutOfBounds,
    /// Integer division by zero.
    DivisionByZero,
    /// Any other trap condition.
    Generic,
}

impl std::fmt::Display for TrapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrapKind::Unreachable => write!(f, "unreachable"),
            TrapKind::OutOfBounds => write!(f, "out_of_bounds"),
            TrapKind::DivisionByZero => write!(f, "division_by_zero"),
            TrapKind::Generic => write!(f, "generic"),
        }
    }
}

/// A single frame of a guest stack trace.
///
/// Frames are ordered innermost-first, matching the order the engine
/// reports them in its backtrace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Index of the function in the module's function index space.
    pub func_index: u32,

    /// Demangled function name, when the module carries a name section.
    pub func_name: Option<String>,

    /// Byte offset of the faulting instruction within the module.
    pub module_offset: Option<usize>,
}

/// Why an execution failed.
///
/// This is the tagged `reason` recorded in a forensic dump and the value
/// callers switch on. Every failing path through the execution manager
/// produces exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    /// The fuel budget was consumed before the call returned.
    FuelExhausted,

    /// The guest hit a fatal in-engine condition.
    Trap {
        /// Normalized trap classification.
        kind: TrapKind,
        /// Engine-reported detail text.
        detail: String,
    },

    /// The module bytes failed to compile or validate.
    CompilationFailed {
        /// Description of the compilation failure.
        detail: String,
    },

    /// The module compiled but could not be instantiated.
    InstantiationFailed {
        /// Description of the instantiation failure.
        detail: String,
    },

    /// The wall-clock deadline elapsed before the call returned.
    Timeout,

    /// The caller's inputs were rejected before any engine work.
    InvalidArgument {
        /// Description of the rejected input.
        detail: String,
    },

    /// The requested operation is declared but not supported by this core.
    NotImplemented {
        /// Description of the unsupported operation.
        detail: String,
    },

    /// Anything the adapter could not classify.
    Other {
        /// Pass-through detail text.
        detail: String,
    },
}

impl FailureReason {
    /// Create a `Trap` reason.
    pub fn trap(kind: TrapKind, detail: impl Into<String>) -> Self {
        Self::Trap {
            kind,
            detail: detail.into(),
        }
    }

    /// Create a `CompilationFailed` reason.
    pub fn compilation_failed(detail: impl Into<String>) -> Self {
        Self::CompilationFailed {
            detail: detail.into(),
        }
    }

    /// Create an `InstantiationFailed` reason.
    pub fn instantiation_failed(detail: impl Into<String>) -> Self {
        Self::InstantiationFailed {
            detail: detail.into(),
        }
    }

    /// Create an `InvalidArgument` reason.
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            detail: detail.into(),
        }
    }

    /// Create an `Other` reason.
    pub fn other(detail: impl Into<String>) -> Self {
        Self::Other {
            detail: detail.into(),
        }
    }

    /// The stable atom callers switch on.
    pub fn atom(&self) -> &'static str {
        match self {
            FailureReason::FuelExhausted => "fuel_exhausted",
            FailureReason::Trap { .. } => "trap",
            FailureReason::CompilationFailed { .. } => "compilation_failed",
            FailureReason::InstantiationFailed { .. } => "instantiation_failed",
            FailureReason::Timeout => "timeout",
            FailureReason::InvalidArgument { .. } => "invalid_argument",
            FailureReason::NotImplemented { .. } => "not_implemented",
            FailureReason::Other { .. } => "other",
        }
    }

    /// Returns `true` if the guest ran and was terminated by the engine.
    pub fn is_runtime_termination(&self) -> bool {
        matches!(
            self,
            FailureReason::FuelExhausted | FailureReason::Trap { .. } | FailureReason::Timeout
        )
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Trap { kind, .. } => write!(f, "trap({kind})"),
            other => write!(f, "{}", other.atom()),
        }
    }
}
