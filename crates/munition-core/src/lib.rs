//! Runtime contract and Wasmtime adapter for the Munition sandbox.
//!
//! This crate provides the execution substrate:
//! - [`runtime`]: The contract a pluggable engine must honor
//! - [`WasmEngine`]: Configured Wasmtime engine (fuel + epoch interruption)
//! - [`CompiledModule`]: Compiled WebAssembly module wrapper
//! - [`adapter::WasmtimeRuntime`]: The statically bound default adapter
//! - [`mock::MockRuntime`]: Scriptable test double
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Runtime (contract trait)                   │
//! │  compile(bytes, quota) → ModuleHandle                   │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   CompiledModule                        │
//! │  (one call, one engine, one quota)                      │
//! │  instantiate(imports) → InstanceHandle                  │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │             Store<GuestContext> + Instance              │
//! │  (per-call, isolated)                                   │
//! │  - Fuel ledger                                          │
//! │  - Linear memory (readable post-trap)                   │
//! │  - Guest logs                                           │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod adapter;
pub mod engine;
pub mod mock;
pub mod module;
pub mod runtime;
pub mod store;

pub use adapter::WasmtimeRuntime;
pub use engine::WasmEngine;
pub use mock::{MockCallOutcome, MockRuntime, MockScript};
pub use module::CompiledModule;
pub use runtime::{CallError, CallQuota, ImportRef, InstanceHandle, ModuleHandle, Runtime};
pub use store::GuestContext;
