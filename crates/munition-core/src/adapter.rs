//! The Wasmtime runtime adapter.
//!
//! Binds the runtime contract to Wasmtime:
//! - compiles with a fresh engine per call, so one call's epoch deadline
//!   can never trip another's
//! - lowers the engine-agnostic import table into `Linker::func_wrap`
//!   closures
//! - classifies raw engine errors into the contract's call outcomes
//! - reads the complete linear memory after success or trap
//!
//! # Deadline enforcement
//!
//! Wall-clock deadlines use epoch interruption: every store is created
//! with an epoch deadline of one tick, and a watchdog thread increments
//! the engine epoch once if the call outlives its budget. The watchdog is
//! disarmed through an mpsc channel when the call returns first. With
//! epoch interruption disabled, fuel exhaustion is the only backstop
//! against runaway guests.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, instrument, warn};
use uuid::Uuid;
use wasmtime::{Caller, Instance, Linker, Store, Trap, Val, WasmBacktrace};

use crate::module::CompiledModule;
use crate::runtime::{CallError, CallQuota, ImportRef, InstanceHandle, ModuleHandle, Runtime};
use crate::store::{create_store, remaining_fuel, GuestContext};
use crate::WasmEngine;
use munition_common::{EngineConfig, RuntimeError, StackFrame, TrapKind, Value};
use munition_host::{GuestLogEntry, GuestLogLevel, HostBinding, ImportTable};

/// The statically bound default runtime.
pub struct WasmtimeRuntime {
    engine_config: EngineConfig,
}

impl WasmtimeRuntime {
    /// Create an adapter with the given engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            engine_config: config.clone(),
        }
    }
}

impl Runtime for WasmtimeRuntime {
    fn name(&self) -> &'static str {
        "wasmtime"
    }

    #[instrument(skip(self, bytes), fields(bytes_len = bytes.len()))]
    fn compile(
        &self,
        bytes: &[u8],
        quota: CallQuota,
    ) -> Result<Box<dyn ModuleHandle>, RuntimeError> {
        // One engine per call keeps the epoch counter private to the call.
        let engine = WasmEngine::new(&self.engine_config)?;
        let module = CompiledModule::from_bytes(engine, bytes, quota)?;
        Ok(Box::new(module))
    }
}

impl ModuleHandle for CompiledModule {
    #[instrument(skip(self, imports), fields(content_hash = %self.content_hash()))]
    fn instantiate(&self, imports: &ImportTable) -> Result<Box<dyn InstanceHandle>, RuntimeError> {
        let call_id = Uuid::new_v4().simple().to_string();
        let context = GuestContext::new(call_id);
        let mut store = create_store(self.engine(), context, self.quota().fuel)?;

        let mut linker: Linker<GuestContext> = Linker::new(self.engine().inner());
        register_imports(&mut linker, imports)?;

        let instance = linker
            .instantiate(&mut store, self.inner())
            .map_err(|e| RuntimeError::instantiation_failed(format!("{e:#}")))?;

        debug!("Module instantiated");

        Ok(Box::new(WasmtimeInstance {
            engine: self.engine().clone(),
            store: Some(store),
            instance: Some(instance),
            timeout: self.quota().timeout(),
        }))
    }

    fn export_names(&self) -> Vec<String> {
        CompiledModule::export_names(self)
    }

    fn import_refs(&self) -> Vec<ImportRef> {
        CompiledModule::import_refs(self)
    }
}

/// One live Wasmtime execution.
///
/// The store and instance are dropped together on disposal; every accessor
/// degrades to an empty answer afterwards instead of failing.
pub struct WasmtimeInstance {
    engine: WasmEngine,
    store: Option<Store<GuestContext>>,
    instance: Option<Instance>,
    timeout: Option<Duration>,
}

impl InstanceHandle for WasmtimeInstance {
    fn call(&mut self, function: &str, args: &[Value]) -> Result<Vec<Value>, CallError> {
        let store = self
            .store
            .as_mut()
            .ok_or_else(|| CallError::other("instance already disposed"))?;
        let instance = self
            .instance
            .ok_or_else(|| CallError::other("instance already disposed"))?;

        let func = instance
            .get_func(&mut *store, function)
            .ok_or_else(|| CallError::FunctionNotFound {
                name: function.to_string(),
            })?;

        let params: Vec<Val> = args.iter().map(lower_value).collect();
        let mut results = func
            .ty(&*store)
            .results()
            .map(|ty| default_val(&ty))
            .collect::<Result<Vec<Val>, CallError>>()?;

        let _watchdog = match self.timeout {
            Some(timeout) if self.engine.config().epoch_interruption => {
                Some(DeadlineWatchdog::arm(self.engine.clone(), timeout))
            }
            _ => None,
        };

        func.call(&mut *store, &params, &mut results)
            .map_err(|e| classify_error(&e))?;

        results.iter().map(raise_value).collect()
    }

    fn fuel_remaining(&self) -> u64 {
        self.store.as_ref().map(remaining_fuel).unwrap_or(0)
    }

    fn capture_memory(&mut self) -> Vec<u8> {
        let (Some(store), Some(instance)) = (self.store.as_mut(), self.instance) else {
            return Vec::new();
        };
        match instance.get_memory(&mut *store, "memory") {
            Some(memory) => memory.data(&*store).to_vec(),
            None => Vec::new(),
        }
    }

    fn drain_logs(&mut self) -> Vec<GuestLogEntry> {
        self.store
            .as_mut()
            .map(|store| std::mem::take(&mut store.data_mut().logs))
            .unwrap_or_default()
    }

    fn dispose(&mut self) {
        if self.store.is_some() {
            debug!("Disposing instance");
        }
        self.instance = None;
        self.store = None;
    }
}

/// Lower the engine-agnostic import table onto a Wasmtime linker.
fn register_imports(
    linker: &mut Linker<GuestContext>,
    imports: &ImportTable,
) -> Result<(), RuntimeError> {
    for (module, name, def) in imports.functions() {
        let registered = match def.binding {
            HostBinding::TimeMs => linker.func_wrap(module, name, host_time_ms).map(|_| ()),
            HostBinding::RandomU32 => linker.func_wrap(module, name, host_random_u32).map(|_| ()),
            HostBinding::RandomU64 => linker.func_wrap(module, name, host_random_u64).map(|_| ()),
            HostBinding::Log(level) => linker
                .func_wrap(
                    module,
                    name,
                    move |caller: Caller<'_, GuestContext>, ptr: i32, len: i32| {
                        host_log(caller, level, ptr, len);
                    },
                )
                .map(|_| ()),
        };
        registered.map_err(|e| {
            RuntimeError::link_failed(format!("Failed to register {module}.{name}: {e}"))
        })?;
    }
    Ok(())
}

/// `env::get_time_ms() -> i64`
fn host_time_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// `env::get_random_u32() -> i32`
fn host_random_u32() -> i32 {
    rand::random::<u32>() as i32
}

/// `env::get_random_u64() -> i64`
fn host_random_u64() -> i64 {
    rand::random::<u64>() as i64
}

/// `env::log_*(ptr, len)`: read the message out of guest memory,
/// bounds-checked, and record it in the call context.
fn host_log(mut caller: Caller<'_, GuestContext>, level: GuestLogLevel, ptr: i32, len: i32) {
    if ptr < 0 || len < 0 {
        warn!(ptr, len, "Invalid pointer or length (negative value)");
        return;
    }

    let Some(memory) = caller
        .get_export("memory")
        .and_then(wasmtime::Extern::into_memory)
    else {
        warn!("Memory export not found in guest module");
        return;
    };

    // Read the message into an owned String before touching the context;
    // memory.data and data_mut cannot be borrowed at once.
    let message = {
        let data = memory.data(&caller);
        let start = ptr as usize;
        let Some(end) = start.checked_add(len as usize) else {
            warn!(ptr, len, "Pointer + length overflow");
            return;
        };

        if end > data.len() {
            warn!(
                start,
                end,
                memory_size = data.len(),
                "Memory access out of bounds"
            );
            return;
        }

        String::from_utf8_lossy(&data[start..end]).into_owned()
    };

    caller.data_mut().log(level, message);
}

/// Watchdog that interrupts the engine when the wall clock runs out.
///
/// Dropping the watchdog disarms it.
struct DeadlineWatchdog {
    disarm: Option<mpsc::Sender<()>>,
}

impl DeadlineWatchdog {
    fn arm(engine: WasmEngine, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        std::thread::spawn(move || match rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Deadline elapsed, interrupting execution"
                );
                engine.increment_epoch();
            }
        });
        Self { disarm: Some(tx) }
    }
}

impl Drop for DeadlineWatchdog {
    fn drop(&mut self) {
        if let Some(tx) = self.disarm.take() {
            let _ = tx.send(());
        }
    }
}

/// Classify a raw engine error into a call outcome.
///
/// Structured trap codes are authoritative when present; the string
/// classifier below is the fallback.
pub fn classify_error(err: &wasmtime::Error) -> CallError {
    let frames = backtrace_frames(err);
    let detail = format!("{err:#}");

    if let Some(trap) = err.downcast_ref::<Trap>() {
        return match trap {
            Trap::OutOfFuel => CallError::FuelExhausted,
            Trap::Interrupt => CallError::Interrupted,
            Trap::UnreachableCodeReached => CallError::Trap {
                kind: TrapKind::Unreachable,
                detail,
                frames,
            },
            Trap::MemoryOutOfBounds | Trap::TableOutOfBounds => CallError::Trap {
                kind: TrapKind::OutOfBounds,
                detail,
                frames,
            },
            Trap::IntegerDivisionByZero => CallError::Trap {
                kind: TrapKind::DivisionByZero,
                detail,
                frames,
            },
            _ => CallError::Trap {
                kind: TrapKind::Generic,
                detail,
                frames,
            },
        };
    }

    classify_message(detail, frames)
}

/// Priority-ordered string classifier, for errors without a structured
/// trap code: fuel, then "unreachable", then "out of bounds", then "trap"
/// (case-insensitive), then pass-through.
pub fn classify_message(detail: String, frames: Vec<StackFrame>) -> CallError {
    let lower = detail.to_lowercase();
    if lower.contains("fuel") {
        CallError::FuelExhausted
    } else if lower.contains("unreachable") {
        CallError::Trap {
            kind: TrapKind::Unreachable,
            detail,
            frames,
        }
    } else if lower.contains("out of bounds") {
        CallError::Trap {
            kind: TrapKind::OutOfBounds,
            detail,
            frames,
        }
    } else if lower.contains("trap") {
        CallError::Trap {
            kind: TrapKind::Generic,
            detail,
            frames,
        }
    } else {
        CallError::Other { detail }
    }
}

fn backtrace_frames(err: &wasmtime::Error) -> Vec<StackFrame> {
    err.downcast_ref::<WasmBacktrace>()
        .map(|bt| {
            bt.frames()
                .iter()
                .map(|frame| StackFrame {
                    func_index: frame.func_index(),
                    func_name: frame.func_name().map(str::to_string),
                    module_offset: frame.module_offset(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn lower_value(value: &Value) -> Val {
    match value {
        Value::I32(v) => Val::I32(*v),
        Value::I64(v) => Val::I64(*v),
        Value::F32(v) => Val::F32(v.to_bits()),
        Value::F64(v) => Val::F64(v.to_bits()),
    }
}

fn raise_value(val: &Val) -> Result<Value, CallError> {
    match val {
        Val::I32(v) => Ok(Value::I32(*v)),
        Val::I64(v) => Ok(Value::I64(*v)),
        Val::F32(bits) => Ok(Value::F32(f32::from_bits(*bits))),
        Val::F64(bits) => Ok(Value::F64(f64::from_bits(*bits))),
        other => Err(CallError::other(format!(
            "unsupported result type {other:?}"
        ))),
    }
}

fn default_val(ty: &wasmtime::ValType) -> Result<Val, CallError> {
    match ty {
        wasmtime::ValType::I32 => Ok(Val::I32(0)),
        wasmtime::ValType::I64 => Ok(Val::I64(0)),
        wasmtime::ValType::F32 => Ok(Val::F32(0)),
        wasmtime::ValType::F64 => Ok(Val::F64(0)),
        other => Err(CallError::other(format!(
            "unsupported result type {other:?}"
        ))),
    }
}
