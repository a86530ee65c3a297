//! Common types, errors, and configuration for the Munition sandbox.
//!
//! This crate provides shared functionality used across the Munition workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Failure reasons and trap classification shared with the forensic subsystem
//! - Configuration structures for runtime settings
//! - The fuel policy (budgets, tiers, validation)
//! - Engine-agnostic guest values

pub mod config;
pub mod config_file;
pub mod error;
pub mod fuel;
pub mod value;

pub use config::{EngineConfig, ExecutionConfig, RuntimeConfig, RuntimeKind};
pub use config_file::{ConfigFile, ConfigFileError};
pub use error::{FailureReason, RuntimeError, StackFrame, TrapKind};
pub use fuel::{ComplexityTier, FuelError, FuelPolicy, MAX_FUEL};
pub use value::{ValType, Value};
