//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the foundation of one call. Unlike long-lived
//! server runtimes, the sandbox builds a fresh engine per call: epoch
//! interruption is a per-engine counter, and a fresh engine keeps one
//! call's deadline from tripping another's.
//!
//! # Configuration
//!
//! The engine is configured with:
//! - **Fuel Metering**: always on; the sandbox's termination guarantee
//!   depends on it
//! - **Epoch Interruption**: enables wall-clock deadlines
//! - **Cranelift Speed**: optimize generated code for execution speed

use std::sync::Arc;

use tracing::debug;
use wasmtime::{Config, Engine, OptLevel};

use munition_common::{EngineConfig, RuntimeError};

/// Thread-safe WebAssembly engine wrapper.
///
/// Cheap to clone; clones share the underlying engine and its epoch
/// counter.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is rejected.
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let mut wasmtime_config = Config::new();

        // Fuel metering is the termination backstop; not configurable.
        wasmtime_config.consume_fuel(true);

        if config.epoch_interruption {
            wasmtime_config.epoch_interruption(true);
        }

        wasmtime_config.cranelift_opt_level(if config.optimize_for_speed {
            OptLevel::Speed
        } else {
            OptLevel::None
        });

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        debug!(
            epoch_interruption = config.epoch_interruption,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Increment the epoch counter.
    ///
    /// Stores whose epoch deadline has passed trap at the next check.
    /// The deadline watchdog calls this when a call outlives its
    /// wall-clock budget.
    pub fn increment_epoch(&self) {
        self.engine.increment_epoch();
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("epoch_interruption", &self.config.epoch_interruption)
            .field("optimize_for_speed", &self.config.optimize_for_speed)
            .finish_non_exhaustive()
    }
}
