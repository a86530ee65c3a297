//! Guest logging types.
//!
//! Guests emit logs through the `env::log_*` host functions; the runtime
//! adapter reads the message out of linear memory and records a
//! [`GuestLogEntry`] in the per-call context. These types stay
//! engine-agnostic so the forensic and metadata layers can carry them
//! without touching the engine.

use serde::{Deserialize, Serialize};

/// Log level for guest logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestLogLevel {
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl GuestLogLevel {
    /// The `env` export name that logs at this level.
    pub fn export_name(&self) -> &'static str {
        match self {
            GuestLogLevel::Debug => "log_debug",
            GuestLogLevel::Info => "log_info",
            GuestLogLevel::Warn => "log_warn",
            GuestLogLevel::Error => "log_error",
        }
    }
}

impl std::fmt::Display for GuestLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuestLogLevel::Debug => write!(f, "DEBUG"),
            GuestLogLevel::Info => write!(f, "INFO"),
            GuestLogLevel::Warn => write!(f, "WARN"),
            GuestLogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// A single log entry emitted by guest code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestLogEntry {
    /// Log level (debug, info, warn, error).
    pub level: GuestLogLevel,

    /// Log message content.
    pub message: String,
}
