//! Dump construction from live or absent instances.
//!
//! [`capture`] reads state out of a (possibly trapped) instance;
//! [`capture_minimal`] synthesizes a dump when no instance exists, which
//! happens on compilation and instantiation failures and on rejected
//! inputs.
//!
//! Arguments are never retained: only a SHA-256 over their canonical
//! encoding is stored, enough to correlate dumps without keeping whatever
//! secrets the arguments carried.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::dump::ForensicDump;
use munition_common::value::canonical_encode;
use munition_common::{FailureReason, StackFrame, Value};
use munition_core::InstanceHandle;

/// Everything the execution manager knows about the failed call.
#[derive(Debug, Clone)]
pub struct CaptureContext {
    /// Why the execution failed.
    pub reason: FailureReason,

    /// Fuel the call was allocated.
    pub fuel_allocated: u64,

    /// The function the caller invoked.
    pub function_called: String,

    /// The caller's arguments; hashed, not retained.
    pub args: Vec<Value>,

    /// Guest execution time in microseconds.
    pub execution_time_us: u64,

    /// Guest stack frames at failure, when the engine reported them.
    pub stack_trace: Option<Vec<StackFrame>>,
}

/// Build a full dump from a live instance.
///
/// Memory is read first; nothing after that touches instance state, so a
/// capture can never perturb what it is recording.
pub fn capture(instance: &mut dyn InstanceHandle, ctx: CaptureContext) -> ForensicDump {
    let memory = instance.capture_memory();

    // On fuel exhaustion the ledger is empty by definition; everywhere else
    // the ledger is authoritative, clamped to the allocation.
    let fuel_remaining = if matches!(ctx.reason, FailureReason::FuelExhausted) {
        0
    } else {
        instance.fuel_remaining().min(ctx.fuel_allocated)
    };

    debug!(
        memory_bytes = memory.len(),
        fuel_remaining,
        reason = %ctx.reason,
        "Captured instance state"
    );

    build_dump(ctx, memory, fuel_remaining)
}

/// Build a dump with empty memory and an empty ledger, for failures that
/// happened before any instance existed.
pub fn capture_minimal(ctx: CaptureContext) -> ForensicDump {
    build_dump(ctx, Vec::new(), 0)
}

fn build_dump(ctx: CaptureContext, memory: Vec<u8>, fuel_remaining: u64) -> ForensicDump {
    let args_hash = hash_args(&ctx.args);
    ForensicDump::new(
        new_dump_id(),
        Utc::now(),
        ctx.reason,
        memory,
        fuel_remaining,
        ctx.fuel_allocated,
        ctx.function_called,
        args_hash,
        ctx.execution_time_us,
        ctx.stack_trace,
    )
}

/// SHA-256 over the canonical encoding of an argument list.
pub fn hash_args(args: &[Value]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(canonical_encode(args));
    hasher.finalize().into()
}

fn new_dump_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use munition_common::TrapKind;
    use munition_core::{CallQuota, MockRuntime, MockScript, ModuleHandle, Runtime};
    use munition_host::ImportTable;

    fn ctx(reason: FailureReason) -> CaptureContext {
        CaptureContext {
            reason,
            fuel_allocated: 1_000,
            function_called: "f".into(),
            args: vec![Value::I32(1)],
            execution_time_us: 42,
            stack_trace: None,
        }
    }

    #[test]
    fn test_capture_minimal() {
        let dump = capture_minimal(ctx(FailureReason::compilation_failed("bad magic")));

        assert!(!dump.id().is_empty());
        assert!(dump.memory().is_empty());
        assert_eq!(dump.fuel_remaining(), 0);
        assert_eq!(dump.fuel_allocated(), 1_000);
        assert_eq!(dump.function_called(), "f");
        assert_eq!(dump.execution_time_us(), 42);
    }

    #[test]
    fn test_capture_reads_instance_state() {
        let runtime = MockRuntime::with_script(MockScript {
            memory: vec![0xAA; 64],
            fuel_remaining: 600,
            ..Default::default()
        });
        let module = runtime.compile(b"x", CallQuota::fuel_only(1_000)).unwrap();
        let mut instance = module.instantiate(&ImportTable::empty()).unwrap();

        let dump = capture(
            instance.as_mut(),
            ctx(FailureReason::trap(TrapKind::Generic, "boom")),
        );

        assert_eq!(dump.memory(), vec![0xAA; 64].as_slice());
        assert_eq!(dump.fuel_remaining(), 600);
    }

    #[test]
    fn test_capture_fuel_exhaustion_zeroes_ledger() {
        let runtime = MockRuntime::with_script(MockScript {
            fuel_remaining: 999,
            ..Default::default()
        });
        let module = runtime.compile(b"x", CallQuota::fuel_only(1_000)).unwrap();
        let mut instance = module.instantiate(&ImportTable::empty()).unwrap();

        let dump = capture(instance.as_mut(), ctx(FailureReason::FuelExhausted));
        assert_eq!(dump.fuel_remaining(), 0);
    }

    #[test]
    fn test_hash_args_stability() {
        let a = hash_args(&[Value::I32(1), Value::I64(2)]);
        let b = hash_args(&[Value::I32(1), Value::I64(2)]);
        let c = hash_args(&[Value::I32(2), Value::I64(2)]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hash_args_empty_list() {
        // Hash of the canonical empty list, not of nothing.
        let empty = hash_args(&[]);
        let mut hasher = Sha256::new();
        hasher.update([0u8, 0, 0, 0]);
        let expected: [u8; 32] = hasher.finalize().into();
        assert_eq!(empty, expected);
    }

    #[test]
    fn test_dump_ids_are_unique() {
        let a = capture_minimal(ctx(FailureReason::Timeout));
        let b = capture_minimal(ctx(FailureReason::Timeout));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().len(), 32); // 16 bytes, hex-encoded
    }
}
