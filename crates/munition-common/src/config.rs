//! Configuration structures for the Munition sandbox.
//!
//! This module defines configuration options for various components:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`RuntimeKind`]: Which runtime adapter is bound
//! - [`EngineConfig`]: Engine settings (optimization, epoch interruption)
//! - [`ExecutionConfig`]: Per-call defaults (fuel, timeout)

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// This structure contains all configuration options for the sandbox.
/// It is read once at initialization; individual calls may override the
/// execution defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Which runtime adapter to bind.
    #[serde(default)]
    pub runtime: RuntimeKind,

    /// Engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-call execution defaults.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// The runtime adapter to bind behind the runtime contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// The Wasmtime adapter (the statically bound default).
    #[default]
    Wasmtime,
    /// The scriptable test-double adapter.
    Mock,
}

/// Engine configuration.
///
/// These settings affect how the engine is constructed. Fuel metering is
/// not configurable: the sandbox's termination guarantees depend on it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable epoch-based interruption.
    ///
    /// This is the mechanism behind wall-clock deadlines. Disabling it
    /// leaves fuel exhaustion as the only backstop against runaway guests.
    #[serde(default = "defaults::epoch_interruption")]
    pub epoch_interruption: bool,

    /// Optimize generated code for speed rather than compile time.
    #[serde(default = "defaults::optimize_for_speed")]
    pub optimize_for_speed: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epoch_interruption: defaults::epoch_interruption(),
            optimize_for_speed: defaults::optimize_for_speed(),
        }
    }
}

/// Per-call execution defaults.
///
/// These apply when a caller omits the corresponding field from its call
/// configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Fuel budget used when the caller omits one.
    #[serde(default = "defaults::default_fuel")]
    pub default_fuel: u64,

    /// Wall-clock deadline in milliseconds used when the caller omits one.
    #[serde(default = "defaults::default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_fuel: defaults::default_fuel(),
            default_timeout_ms: defaults::default_timeout_ms(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn epoch_interruption() -> bool {
        true
    }

    pub const fn optimize_for_speed() -> bool {
        true
    }

    pub const fn default_fuel() -> u64 {
        100_000
    }

    pub const fn default_timeout_ms() -> u64 {
        5_000
    }
}
