//! Capability registry and host-function gating for the Munition sandbox.
//!
//! This crate decides what a guest is allowed to import. It is pure policy
//! and data: no engine types appear here, so the same tables drive any
//! runtime adapter.
//!
//! # Modules
//!
//! - [`capabilities`]: The capability token vocabulary, risk classes, and
//!   set operations (expansion, inclusion)
//! - [`imports`]: Assembly of the guest import table from a grant
//! - [`logging`]: Guest log levels and entries
//!
//! # Security Model
//!
//! A guest sees exactly the functions its grant maps to, nothing more.
//! Tables are rebuilt per call from the expanded grant; there is no
//! cross-call sharing and no way to express conflicting grants.

pub mod capabilities;
pub mod imports;
pub mod logging;

pub use capabilities::{Capability, CapabilityError, CapabilitySet, RiskLevel};
pub use imports::{HostBinding, HostFunctionDef, ImportTable, ENV_MODULE};
pub use logging::{GuestLogEntry, GuestLogLevel};
