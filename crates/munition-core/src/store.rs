//! Per-call execution context and store management.
//!
//! This module provides:
//! - [`GuestContext`]: Per-call state accessible from host functions
//! - [`create_store`]: Store construction with fuel priming and epoch
//!   deadline
//! - Fuel ledger accessors

use std::time::Instant;

use tracing::{debug, error, info, warn};
use wasmtime::Store;

use crate::WasmEngine;
use munition_common::RuntimeError;
use munition_host::{GuestLogEntry, GuestLogLevel};

/// Per-call execution context.
///
/// This struct holds all state specific to a single execution. It is
/// created at instantiation and destroyed with the store. Host functions
/// reach it through the [`wasmtime::Caller`] API.
pub struct GuestContext {
    /// Unique call identifier for tracing.
    pub call_id: String,

    /// Logs collected from guest code.
    pub logs: Vec<GuestLogEntry>,

    /// Instantiation time.
    start_time: Instant,
}

impl GuestContext {
    /// Create a new guest context with the given call ID.
    pub fn new(call_id: String) -> Self {
        Self {
            call_id,
            logs: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Record a guest log entry and re-emit it through `tracing`.
    pub fn log(&mut self, level: GuestLogLevel, message: String) {
        let call_id = self.call_id.as_str();
        match level {
            GuestLogLevel::Debug => debug!(call_id, guest_log = true, "{}", message),
            GuestLogLevel::Info => info!(call_id, guest_log = true, "{}", message),
            GuestLogLevel::Warn => warn!(call_id, guest_log = true, "{}", message),
            GuestLogLevel::Error => error!(call_id, guest_log = true, "{}", message),
        }
        self.logs.push(GuestLogEntry { level, message });
    }

    /// Get elapsed time since the context was created.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

/// Create a store for one execution.
///
/// The fuel ledger is primed to `fuel`. When the engine was built with
/// epoch interruption, the epoch deadline is set to one tick: the deadline
/// watchdog increments the engine epoch once when the wall clock runs out,
/// which trips every outstanding check in this store.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    context: GuestContext,
    fuel: u64,
) -> Result<Store<GuestContext>, RuntimeError> {
    let mut store = Store::new(engine.inner(), context);

    store
        .set_fuel(fuel)
        .map_err(|e| RuntimeError::invalid_config(format!("Failed to set fuel: {e}")))?;

    if engine.config().epoch_interruption {
        store.set_epoch_deadline(1);
    }

    Ok(store)
}

/// Get remaining fuel from a store, saturating to zero when the engine
/// cannot report it.
pub fn remaining_fuel(store: &Store<GuestContext>) -> u64 {
    store.get_fuel().unwrap_or(0)
}

/// Calculate fuel consumed against the primed budget.
pub fn fuel_consumed(initial_fuel: u64, store: &Store<GuestContext>) -> u64 {
    initial_fuel.saturating_sub(remaining_fuel(store))
}
