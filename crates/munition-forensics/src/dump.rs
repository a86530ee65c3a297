//! The forensic dump value object.
//!
//! A dump is the complete post-mortem of one failed execution. It is
//! immutable after construction: all fields are private, every accessor
//! borrows, and the analyser works on borrowed memory.

use chrono::{DateTime, Utc};

use munition_common::{FailureReason, StackFrame};

/// Size of one WebAssembly linear memory page.
pub const WASM_PAGE_SIZE: usize = 65_536;

/// An immutable record of an execution's final state after a failure.
///
/// Constructed by the capture functions in [`crate::capture`] or decoded
/// from the wire format in [`crate::codec`].
#[derive(Debug, Clone, PartialEq)]
pub struct ForensicDump {
    id: String,
    timestamp: DateTime<Utc>,
    reason: FailureReason,
    memory: Vec<u8>,
    fuel_remaining: u64,
    fuel_allocated: u64,
    function_called: String,
    args_hash: [u8; 32],
    execution_time_us: u64,
    stack_trace: Option<Vec<StackFrame>>,
}

impl ForensicDump {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        timestamp: DateTime<Utc>,
        reason: FailureReason,
        memory: Vec<u8>,
        fuel_remaining: u64,
        fuel_allocated: u64,
        function_called: String,
        args_hash: [u8; 32],
        execution_time_us: u64,
        stack_trace: Option<Vec<StackFrame>>,
    ) -> Self {
        debug_assert!(!id.is_empty());
        debug_assert!(fuel_remaining <= fuel_allocated);
        Self {
            id,
            timestamp,
            reason,
            memory,
            fuel_remaining,
            fuel_allocated,
            function_called,
            args_hash,
            execution_time_us,
            stack_trace,
        }
    }

    /// Hex-encoded 16-byte random identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// UTC wall clock at capture.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Why the execution failed.
    pub fn reason(&self) -> &FailureReason {
        &self.reason
    }

    /// Snapshot of linear memory at failure; may be empty.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Linear memory size in 64 KiB pages.
    pub fn memory_pages(&self) -> usize {
        self.memory.len() / WASM_PAGE_SIZE
    }

    /// Fuel left in the ledger at failure.
    pub fn fuel_remaining(&self) -> u64 {
        self.fuel_remaining
    }

    /// Fuel the call was allocated.
    pub fn fuel_allocated(&self) -> u64 {
        self.fuel_allocated
    }

    /// The function the caller invoked.
    pub fn function_called(&self) -> &str {
        &self.function_called
    }

    /// SHA-256 over the canonical encoding of the argument list.
    pub fn args_hash(&self) -> &[u8; 32] {
        &self.args_hash
    }

    /// The argument hash, hex-encoded.
    pub fn args_hash_hex(&self) -> String {
        hex::encode(self.args_hash)
    }

    /// Guest execution time in microseconds.
    pub fn execution_time_us(&self) -> u64 {
        self.execution_time_us
    }

    /// Guest stack frames at failure, innermost first, when available.
    pub fn stack_trace(&self) -> Option<&[StackFrame]> {
        self.stack_trace.as_deref()
    }

    /// One-line human rendering, suitable for logs.
    pub fn summary(&self) -> String {
        let fuel_pct = if self.fuel_allocated > 0 {
            self.fuel_remaining * 100 / self.fuel_allocated
        } else {
            0
        };
        format!(
            "dump {} fn={} reason={} time={}us fuel_remaining={}% memory={}KiB",
            self.id,
            self.function_called,
            self.reason,
            self.execution_time_us,
            fuel_pct,
            self.memory.len() / 1024,
        )
    }
}
