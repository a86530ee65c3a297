//! The execution manager.
//!
//! Owns the per-call lifecycle: validate inputs, build the import table,
//! compile, instantiate, invoke, and on any failure capture a forensic
//! dump. The state machine is linear:
//!
//! ```text
//!   start ─→ compiling ─→ instantiating ─→ executing ─→ outcome
//!                                                          │
//!                                                          ▼
//!                                                      disposed
//! ```
//!
//! [`Executor::execute`] never panics outward and never returns without
//! either results or a dump. Disposal runs exactly once for any instance
//! that was created, on every path, including host-side panics.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use munition_common::{FailureReason, FuelPolicy, StackFrame, Value};
use munition_core::{CallError, CallQuota, InstanceHandle, ModuleHandle, Runtime};
use munition_forensics::{capture, capture_minimal, CaptureContext, ForensicDump};
use munition_host::{CapabilitySet, GuestLogEntry, ImportTable};

use crate::meter::FuelMeter;

/// Per-call configuration. Omitted fields fall back to process defaults.
#[derive(Debug, Clone, Default)]
pub struct CallConfig {
    /// Fuel budget; defaults from configuration.
    pub fuel: Option<u64>,

    /// Wall-clock deadline in milliseconds; defaults from configuration.
    pub timeout_ms: Option<u64>,

    /// Capabilities granted to the guest; defaults to nothing.
    pub capabilities: CapabilitySet,
}

impl CallConfig {
    /// Override the fuel budget.
    #[must_use]
    pub fn with_fuel(mut self, fuel: u64) -> Self {
        self.fuel = Some(fuel);
        self
    }

    /// Override the deadline.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Grant a capability set.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Accounting for a successful call.
#[derive(Debug, Clone)]
pub struct ExecutionMetadata {
    /// Fuel left in the ledger when the call returned.
    pub fuel_remaining: u64,

    /// Wall-clock time from compile start to call return, in microseconds.
    pub execution_time_us: u64,

    /// Linear memory size at return.
    pub memory_high_water_bytes: usize,

    /// Logs the guest emitted during the call.
    pub guest_logs: Vec<GuestLogEntry>,
}

/// What one call produced. Every call produces exactly one of these; no
/// error escapes as a panic or a bare `Err`.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The call returned normally.
    Ok {
        /// The function's results.
        results: Vec<Value>,
        /// Accounting metadata.
        metadata: ExecutionMetadata,
    },

    /// The call failed; the dump holds the post-mortem.
    Crash {
        /// Why, mirrored from the dump for convenient matching.
        reason: FailureReason,
        /// The full post-mortem.
        dump: Box<ForensicDump>,
    },
}

impl ExecutionOutcome {
    /// Returns `true` on the success path.
    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionOutcome::Ok { .. })
    }

    /// Returns `true` on the crash path.
    pub fn is_crash(&self) -> bool {
        matches!(self, ExecutionOutcome::Crash { .. })
    }

    /// The dump, when this is a crash.
    pub fn dump(&self) -> Option<&ForensicDump> {
        match self {
            ExecutionOutcome::Crash { dump, .. } => Some(dump),
            ExecutionOutcome::Ok { .. } => None,
        }
    }
}

/// What a module must look like to pass [`Executor::validate`].
#[derive(Debug, Clone, Default)]
pub struct ValidationSpec {
    /// Exports that must be present.
    pub required_exports: Vec<String>,

    /// When set, every import must appear here, in `module.name` form.
    pub allowed_imports: Option<Vec<String>>,
}

/// Why a module failed validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The bytes did not compile.
    #[error("validation failed: {detail}")]
    CompilationFailed {
        /// Compiler detail.
        detail: String,
    },

    /// A required export is missing.
    #[error("validation failed: missing required export '{name}'")]
    MissingExport {
        /// The absent export.
        name: String,
    },

    /// The module imports something outside the allowed set.
    #[error("validation failed: import '{import}' is not allowed")]
    DisallowedImport {
        /// The offending import, in `module.name` form.
        import: String,
    },
}

/// Orchestrates the compile → instantiate → invoke → capture → dispose
/// lifecycle over a pluggable runtime.
pub struct Executor {
    runtime: Arc<dyn Runtime>,
    policy: FuelPolicy,
    meter: Option<Arc<FuelMeter>>,
}

impl Executor {
    /// Create an executor over the given runtime.
    pub fn new(runtime: Arc<dyn Runtime>, policy: FuelPolicy) -> Self {
        Self {
            runtime,
            policy,
            meter: None,
        }
    }

    /// Attach the fuel-accounting sidecar.
    #[must_use]
    pub fn with_meter(mut self, meter: Arc<FuelMeter>) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Execute one call against fresh state.
    ///
    /// Always returns an outcome: input rejection, compile and
    /// instantiation failures produce minimal dumps; runtime terminations
    /// produce full dumps; host-side panics are caught and reported as
    /// `other` crashes.
    #[instrument(skip_all, fields(function = %function, runtime = self.runtime.name()))]
    pub fn execute(
        &self,
        bytes: &[u8],
        function: &str,
        args: &[Value],
        config: &CallConfig,
    ) -> ExecutionOutcome {
        let started = Instant::now();

        let fuel = config.fuel.unwrap_or_else(|| self.policy.default_fuel());
        let timeout_ms = config
            .timeout_ms
            .unwrap_or_else(|| self.policy.default_timeout_ms());

        if let Err(err) = self.policy.validate(fuel) {
            warn!(fuel, %err, "Rejected fuel budget");
            return crash_minimal(
                FailureReason::invalid_argument(err.to_string()),
                fuel,
                function,
                args,
                started,
            );
        }

        let imports = ImportTable::build(&config.capabilities);
        let quota = CallQuota { fuel, timeout_ms };

        let module = match self.runtime.compile(bytes, quota) {
            Ok(module) => module,
            Err(err) => {
                warn!(%err, "Compilation failed");
                return crash_minimal(
                    FailureReason::compilation_failed(err.to_string()),
                    fuel,
                    function,
                    args,
                    started,
                );
            }
        };

        let mut instance = match module.instantiate(&imports) {
            Ok(instance) => instance,
            Err(err) => {
                warn!(%err, "Instantiation failed");
                return crash_minimal(
                    FailureReason::instantiation_failed(err.to_string()),
                    fuel,
                    function,
                    args,
                    started,
                );
            }
        };

        // A panic anywhere on the host side of the call must surface as a
        // crash outcome, with the instance still captured and disposed.
        let call_result = catch_unwind(AssertUnwindSafe(|| instance.call(function, args)));
        let execution_time_us = started.elapsed().as_micros() as u64;

        let outcome = match call_result {
            Ok(Ok(results)) => {
                let fuel_remaining = instance.fuel_remaining();
                let memory_high_water_bytes = instance.capture_memory().len();
                let guest_logs = instance.drain_logs();
                self.record_consumption(function, fuel, fuel_remaining);

                info!(
                    fuel_remaining,
                    execution_time_us,
                    memory_high_water_bytes,
                    "Execution succeeded"
                );

                ExecutionOutcome::Ok {
                    results,
                    metadata: ExecutionMetadata {
                        fuel_remaining,
                        execution_time_us,
                        memory_high_water_bytes,
                        guest_logs,
                    },
                }
            }
            Ok(Err(call_error)) => {
                let (reason, stack_trace) = classify_outcome(call_error);
                let dump = capture(
                    instance.as_mut(),
                    CaptureContext {
                        reason: reason.clone(),
                        fuel_allocated: fuel,
                        function_called: function.to_string(),
                        args: args.to_vec(),
                        execution_time_us,
                        stack_trace,
                    },
                );
                self.record_consumption(function, fuel, dump.fuel_remaining());

                warn!(%reason, dump_id = dump.id(), "Execution crashed");

                ExecutionOutcome::Crash {
                    reason,
                    dump: Box::new(dump),
                }
            }
            Err(panic) => {
                let reason =
                    FailureReason::other(format!("host panic: {}", panic_message(&panic)));
                let dump = capture(
                    instance.as_mut(),
                    CaptureContext {
                        reason: reason.clone(),
                        fuel_allocated: fuel,
                        function_called: function.to_string(),
                        args: args.to_vec(),
                        execution_time_us,
                        stack_trace: None,
                    },
                );

                error!(%reason, dump_id = dump.id(), "Host panic during execution");

                ExecutionOutcome::Crash {
                    reason,
                    dump: Box::new(dump),
                }
            }
        };

        instance.dispose();
        outcome
    }

    /// Compile and structurally check a module without executing it.
    ///
    /// # Errors
    ///
    /// Returns the first missing required export or disallowed import.
    #[instrument(skip_all)]
    pub fn validate(&self, bytes: &[u8], spec: &ValidationSpec) -> Result<(), ValidationError> {
        let quota = CallQuota::fuel_only(self.policy.default_fuel());
        let module = self
            .runtime
            .compile(bytes, quota)
            .map_err(|err| ValidationError::CompilationFailed {
                detail: err.to_string(),
            })?;

        let exports = module.export_names();
        for required in &spec.required_exports {
            if !exports.contains(required) {
                return Err(ValidationError::MissingExport {
                    name: required.clone(),
                });
            }
        }

        if let Some(allowed) = &spec.allowed_imports {
            for import in module.import_refs() {
                let name = import.to_string();
                if !allowed.contains(&name) {
                    return Err(ValidationError::DisallowedImport { import: name });
                }
            }
        }

        Ok(())
    }

    fn record_consumption(&self, function: &str, allocated: u64, remaining: u64) {
        if let Some(meter) = &self.meter {
            meter.record(function, allocated.saturating_sub(remaining));
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("runtime", &self.runtime.name())
            .field("metered", &self.meter.is_some())
            .finish_non_exhaustive()
    }
}

/// Map a classified call outcome to a dump reason plus any stack frames.
fn classify_outcome(error: CallError) -> (FailureReason, Option<Vec<StackFrame>>) {
    match error {
        CallError::FuelExhausted => (FailureReason::FuelExhausted, None),
        CallError::Trap {
            kind,
            detail,
            frames,
        } => (
            FailureReason::Trap { kind, detail },
            (!frames.is_empty()).then_some(frames),
        ),
        CallError::Interrupted => (FailureReason::Timeout, None),
        CallError::FunctionNotFound { name } => (
            FailureReason::other(format!("function '{name}' not found")),
            None,
        ),
        CallError::Other { detail } => (FailureReason::Other { detail }, None),
    }
}

fn crash_minimal(
    reason: FailureReason,
    fuel_allocated: u64,
    function: &str,
    args: &[Value],
    started: Instant,
) -> ExecutionOutcome {
    let dump = capture_minimal(CaptureContext {
        reason: reason.clone(),
        fuel_allocated,
        function_called: function.to_string(),
        args: args.to_vec(),
        execution_time_us: started.elapsed().as_micros() as u64,
        stack_trace: None,
    });
    ExecutionOutcome::Crash {
        reason,
        dump: Box::new(dump),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use munition_common::{TrapKind, MAX_FUEL};
    use munition_core::{ImportRef, MockCallOutcome, MockRuntime, MockScript};

    fn executor(script: MockScript) -> (Executor, Arc<std::sync::atomic::AtomicUsize>) {
        let runtime = MockRuntime::with_script(script);
        let disposals = runtime.disposal_counter();
        (
            Executor::new(Arc::new(runtime), FuelPolicy::default()),
            disposals,
        )
    }

    fn disposal_count(counter: &std::sync::atomic::AtomicUsize) -> usize {
        counter.load(std::sync::atomic::Ordering::SeqCst)
    }

    #[test]
    fn test_success_metadata() {
        let (executor, disposals) = executor(MockScript {
            call: MockCallOutcome::Return(vec![Value::I32(42)]),
            fuel_remaining: 900,
            memory: vec![0u8; 64],
            ..Default::default()
        });

        let outcome = executor.execute(
            b"wasm",
            "add",
            &[Value::I32(20), Value::I32(22)],
            &CallConfig::default().with_fuel(1_000),
        );

        let ExecutionOutcome::Ok { results, metadata } = outcome else {
            panic!("expected success");
        };
        assert_eq!(results, vec![Value::I32(42)]);
        assert_eq!(metadata.fuel_remaining, 900);
        assert_eq!(metadata.memory_high_water_bytes, 64);
        assert_eq!(disposal_count(&disposals), 1);
    }

    #[test]
    fn test_invalid_fuel_rejected_before_engine() {
        let (executor, disposals) = executor(MockScript {
            // Would fail loudly if the engine were reached.
            compile_error: Some("must not be reached".into()),
            ..Default::default()
        });

        for fuel in [0, MAX_FUEL + 1] {
            let outcome = executor.execute(
                b"wasm",
                "f",
                &[],
                &CallConfig::default().with_fuel(fuel),
            );
            let ExecutionOutcome::Crash { reason, dump } = outcome else {
                panic!("expected crash");
            };
            assert_eq!(reason.atom(), "invalid_argument");
            assert!(dump.memory().is_empty());
            assert_eq!(dump.fuel_remaining(), 0);
        }
        assert_eq!(disposal_count(&disposals), 0);
    }

    #[test]
    fn test_max_fuel_accepted() {
        let (executor, _) = executor(MockScript::default());
        let outcome = executor.execute(
            b"wasm",
            "f",
            &[],
            &CallConfig::default().with_fuel(MAX_FUEL),
        );
        assert!(outcome.is_ok());
    }

    #[test]
    fn test_compile_failure_minimal_dump() {
        let (executor, disposals) = executor(MockScript {
            compile_error: Some("bad magic".into()),
            ..Default::default()
        });

        let outcome = executor.execute(b"junk", "f", &[Value::I32(1)], &CallConfig::default());

        let ExecutionOutcome::Crash { reason, dump } = outcome else {
            panic!("expected crash");
        };
        assert_eq!(reason.atom(), "compilation_failed");
        assert!(dump.memory().is_empty());
        assert_eq!(dump.function_called(), "f");
        // No instance existed, so nothing to dispose.
        assert_eq!(disposal_count(&disposals), 0);
    }

    #[test]
    fn test_instantiate_failure_minimal_dump() {
        let (executor, disposals) = executor(MockScript {
            instantiate_error: Some("unknown import env.nope".into()),
            ..Default::default()
        });

        let outcome = executor.execute(b"wasm", "f", &[], &CallConfig::default());

        let ExecutionOutcome::Crash { reason, dump } = outcome else {
            panic!("expected crash");
        };
        assert_eq!(reason.atom(), "instantiation_failed");
        assert!(dump.memory().is_empty());
        assert_eq!(disposal_count(&disposals), 0);
    }

    #[test]
    fn test_trap_produces_full_dump() {
        let (executor, disposals) = executor(MockScript {
            call: MockCallOutcome::Fail(CallError::Trap {
                kind: TrapKind::Unreachable,
                detail: "unreachable executed".into(),
                frames: vec![],
            }),
            memory: vec![0xAB; 128],
            fuel_remaining: 500,
            ..Default::default()
        });

        let outcome = executor.execute(
            b"wasm",
            "bang",
            &[],
            &CallConfig::default().with_fuel(1_000),
        );

        let ExecutionOutcome::Crash { reason, dump } = outcome else {
            panic!("expected crash");
        };
        assert_eq!(reason.atom(), "trap");
        assert_eq!(dump.memory(), vec![0xAB; 128].as_slice());
        assert_eq!(dump.fuel_remaining(), 500);
        assert_eq!(dump.fuel_allocated(), 1_000);
        assert_eq!(dump.function_called(), "bang");
        assert_eq!(disposal_count(&disposals), 1);
    }

    #[test]
    fn test_fuel_exhaustion_zeroes_dump_ledger() {
        let (executor, _) = executor(MockScript {
            call: MockCallOutcome::Fail(CallError::FuelExhausted),
            fuel_remaining: 3, // engine residue; the dump must say zero
            ..Default::default()
        });

        let outcome = executor.execute(b"wasm", "spin", &[], &CallConfig::default());

        let ExecutionOutcome::Crash { reason, dump } = outcome else {
            panic!("expected crash");
        };
        assert_eq!(reason.atom(), "fuel_exhausted");
        assert_eq!(dump.fuel_remaining(), 0);
    }

    #[test]
    fn test_interruption_becomes_timeout() {
        let (executor, _) = executor(MockScript {
            call: MockCallOutcome::Fail(CallError::Interrupted),
            ..Default::default()
        });

        let outcome = executor.execute(b"wasm", "forever", &[], &CallConfig::default());
        let ExecutionOutcome::Crash { reason, .. } = outcome else {
            panic!("expected crash");
        };
        assert_eq!(reason, FailureReason::Timeout);
    }

    #[test]
    fn test_host_panic_translated_and_disposed() {
        let (executor, disposals) = executor(MockScript {
            call: MockCallOutcome::Panic,
            memory: vec![1, 2, 3],
            ..Default::default()
        });

        let outcome = executor.execute(b"wasm", "f", &[], &CallConfig::default());

        let ExecutionOutcome::Crash { reason, dump } = outcome else {
            panic!("expected crash");
        };
        assert_eq!(reason.atom(), "other");
        assert!(matches!(
            &reason,
            FailureReason::Other { detail } if detail.contains("scripted host panic")
        ));
        assert_eq!(dump.memory(), &[1, 2, 3]);
        assert_eq!(disposal_count(&disposals), 1);
    }

    #[test]
    fn test_meter_records_consumption() {
        let runtime = MockRuntime::with_script(MockScript {
            fuel_remaining: 700,
            ..Default::default()
        });
        let meter = Arc::new(FuelMeter::new());
        let executor = Executor::new(Arc::new(runtime), FuelPolicy::default())
            .with_meter(Arc::clone(&meter));

        executor.execute(
            b"wasm",
            "add",
            &[],
            &CallConfig::default().with_fuel(1_000),
        );
        meter.flush();

        let snapshot = meter.snapshot();
        assert_eq!(snapshot["add"].last, 300);
    }

    #[test]
    fn test_validate_required_exports() {
        let (executor, _) = executor(MockScript {
            exports: vec!["add".into(), "memory".into()],
            ..Default::default()
        });

        assert!(executor
            .validate(
                b"wasm",
                &ValidationSpec {
                    required_exports: vec!["add".into()],
                    allowed_imports: None,
                }
            )
            .is_ok());

        let err = executor
            .validate(
                b"wasm",
                &ValidationSpec {
                    required_exports: vec!["multiply".into()],
                    allowed_imports: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingExport { name } if name == "multiply"));
    }

    #[test]
    fn test_validate_allowed_imports() {
        let (executor, _) = executor(MockScript {
            imports: vec![ImportRef {
                module: "env".into(),
                name: "get_time_ms".into(),
            }],
            ..Default::default()
        });

        assert!(executor
            .validate(
                b"wasm",
                &ValidationSpec {
                    required_exports: vec![],
                    allowed_imports: Some(vec!["env.get_time_ms".into()]),
                }
            )
            .is_ok());

        let err = executor
            .validate(
                b"wasm",
                &ValidationSpec {
                    required_exports: vec![],
                    allowed_imports: Some(vec!["env.log_info".into()]),
                },
            )
            .unwrap_err();
        assert!(
            matches!(err, ValidationError::DisallowedImport { import } if import == "env.get_time_ms")
        );
    }
}
