//! WebAssembly module compilation.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's
//! [`Module`] that handles validation, compilation, and introspection. A
//! compiled module carries the per-call resource quota it was compiled
//! under and the engine that owns its machine code, so it can instantiate
//! itself without further context.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use tracing::{info, instrument};
use wasmtime::Module;

use crate::runtime::{CallQuota, ImportRef};
use crate::WasmEngine;
use munition_common::RuntimeError;

/// A compiled WebAssembly module.
///
/// Re-instantiable until dropped. On the sandbox's core path a module is
/// compiled for exactly one call and never shared.
#[derive(Clone)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    module: Module,

    /// Engine that owns the compiled code.
    engine: WasmEngine,

    /// Per-call resource quota applied at instantiation.
    quota: CallQuota,

    /// Hash of the original Wasm bytes, for log correlation.
    content_hash: String,
}

impl CompiledModule {
    /// Compile a module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is malformed or compilation fails.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(
        engine: WasmEngine,
        bytes: &[u8],
        quota: CallQuota,
    ) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        validate_wasm_header(bytes)?;

        let module = Module::new(engine.inner(), bytes).map_err(|e| {
            RuntimeError::compilation_failed(format!("Module compilation failed: {e}"))
        })?;

        let content_hash = compute_hash(bytes);
        let duration = start.elapsed();

        info!(
            content_hash = %content_hash,
            duration_ms = duration.as_millis(),
            fuel_quota = quota.fuel,
            "Module compiled"
        );

        Ok(Self {
            module,
            engine,
            quota,
            content_hash,
        })
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.module
    }

    /// Get the owning engine.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }

    /// Get the per-call quota.
    pub fn quota(&self) -> CallQuota {
        self.quota
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Names of everything the module exports.
    pub fn export_names(&self) -> Vec<String> {
        self.module
            .exports()
            .map(|export| export.name().to_string())
            .collect()
    }

    /// Everything the module imports.
    pub fn import_refs(&self) -> Vec<ImportRef> {
        self.module
            .imports()
            .map(|import| ImportRef {
                module: import.module().to_string(),
                name: import.name().to_string(),
            })
            .collect()
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .field("fuel_quota", &self.quota.fuel)
            .finish_non_exhaustive()
    }
}

/// Validate WebAssembly header (magic number).
fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
    if bytes.len() < 8 {
        return Err(RuntimeError::compilation_failed(
            "Invalid Wasm: file too small",
        ));
    }

    // Check magic number: \0asm
    if &bytes[0..4] != b"\0asm" {
        return Err(RuntimeError::compilation_failed(
            "Invalid Wasm: bad magic number",
        ));
    }

    Ok(())
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use munition_common::EngineConfig;

    // Minimal valid Wasm module (empty module)
    const MINIMAL_WASM: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, // magic: \0asm
        0x01, 0x00, 0x00, 0x00, // version: 1
    ];

    fn test_engine() -> WasmEngine {
        WasmEngine::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_validate_wasm_header_valid() {
        assert!(validate_wasm_header(MINIMAL_WASM).is_ok());
    }

    #[test]
    fn test_validate_wasm_header_too_small() {
        let result = validate_wasm_header(&[0x00, 0x61]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_wasm_header_bad_magic() {
        let bad_wasm = &[0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        let result = validate_wasm_header(bad_wasm);
        assert!(result.is_err());
    }

    #[test]
    fn test_compute_hash() {
        let hash1 = compute_hash(b"hello");
        let hash2 = compute_hash(b"hello");
        let hash3 = compute_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 16); // 64-bit hex
    }

    #[test]
    fn test_module_compilation() {
        let module =
            CompiledModule::from_bytes(test_engine(), MINIMAL_WASM, CallQuota::fuel_only(1_000));
        assert!(module.is_ok());

        let module = module.unwrap();
        assert!(!module.content_hash().is_empty());
        assert_eq!(module.quota().fuel, 1_000);
    }

    #[test]
    fn test_module_introspection() {
        let wat = r#"
            (module
                (import "env" "get_time_ms" (func (result i64)))
                (memory (export "memory") 1)
                (func (export "run"))
            )
        "#;
        let bytes = wat::parse_str(wat).unwrap();
        let module =
            CompiledModule::from_bytes(test_engine(), &bytes, CallQuota::fuel_only(1_000)).unwrap();

        let exports = module.export_names();
        assert!(exports.contains(&"memory".to_string()));
        assert!(exports.contains(&"run".to_string()));

        let imports = module.import_refs();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].module, "env");
        assert_eq!(imports[0].name, "get_time_ms");
    }

    #[test]
    fn test_module_debug() {
        let module =
            CompiledModule::from_bytes(test_engine(), MINIMAL_WASM, CallQuota::fuel_only(1_000))
                .unwrap();

        let debug_str = format!("{module:?}");
        assert!(debug_str.contains("CompiledModule"));
        assert!(debug_str.contains("content_hash"));
    }
}
