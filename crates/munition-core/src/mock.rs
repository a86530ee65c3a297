//! Scriptable test-double runtime.
//!
//! [`MockRuntime`] implements the runtime contract with outcomes scripted
//! ahead of time, so execution-manager behavior (error-to-dump mapping,
//! dispose-exactly-once, panic translation) can be tested without an
//! engine. It is selected with `runtime = "mock"` in configuration or
//! injected directly in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::runtime::{CallError, CallQuota, ImportRef, InstanceHandle, ModuleHandle, Runtime};
use munition_common::{RuntimeError, Value};
use munition_host::{GuestLogEntry, ImportTable};

/// What a scripted call does.
#[derive(Debug, Clone)]
pub enum MockCallOutcome {
    /// Return these values.
    Return(Vec<Value>),
    /// Fail with this classified outcome.
    Fail(CallError),
    /// Panic on the host side, to exercise panic translation.
    Panic,
}

/// The scripted behavior of a [`MockRuntime`].
#[derive(Debug, Clone)]
pub struct MockScript {
    /// Fail compilation with this detail.
    pub compile_error: Option<String>,

    /// Fail instantiation with this detail.
    pub instantiate_error: Option<String>,

    /// What `call` does.
    pub call: MockCallOutcome,

    /// Bytes returned by `capture_memory`.
    pub memory: Vec<u8>,

    /// Value returned by `fuel_remaining`.
    pub fuel_remaining: u64,

    /// Export names the module reports.
    pub exports: Vec<String>,

    /// Imports the module reports.
    pub imports: Vec<ImportRef>,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            compile_error: None,
            instantiate_error: None,
            call: MockCallOutcome::Return(vec![]),
            memory: Vec::new(),
            fuel_remaining: 0,
            exports: Vec::new(),
            imports: Vec::new(),
        }
    }
}

/// A runtime whose every outcome is scripted.
pub struct MockRuntime {
    script: MockScript,
    disposals: Arc<AtomicUsize>,
}

impl MockRuntime {
    /// Create a mock that succeeds with empty results.
    pub fn new() -> Self {
        Self::with_script(MockScript::default())
    }

    /// Create a mock driven by the given script.
    pub fn with_script(script: MockScript) -> Self {
        Self {
            script,
            disposals: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many times `dispose` has been called across all instances.
    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    /// Handle for asserting disposals after the runtime is boxed away.
    pub fn disposal_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.disposals)
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn compile(
        &self,
        _bytes: &[u8],
        quota: CallQuota,
    ) -> Result<Box<dyn ModuleHandle>, RuntimeError> {
        if let Some(detail) = &self.script.compile_error {
            return Err(RuntimeError::compilation_failed(detail.clone()));
        }
        Ok(Box::new(MockModule {
            script: self.script.clone(),
            quota,
            disposals: Arc::clone(&self.disposals),
        }))
    }
}

#[derive(Debug)]
struct MockModule {
    script: MockScript,
    quota: CallQuota,
    disposals: Arc<AtomicUsize>,
}

impl ModuleHandle for MockModule {
    fn instantiate(&self, _imports: &ImportTable) -> Result<Box<dyn InstanceHandle>, RuntimeError> {
        if let Some(detail) = &self.script.instantiate_error {
            return Err(RuntimeError::instantiation_failed(detail.clone()));
        }
        Ok(Box::new(MockInstance {
            script: self.script.clone(),
            fuel_remaining: self.script.fuel_remaining.min(self.quota.fuel),
            disposed: false,
            disposals: Arc::clone(&self.disposals),
        }))
    }

    fn export_names(&self) -> Vec<String> {
        self.script.exports.clone()
    }

    fn import_refs(&self) -> Vec<ImportRef> {
        self.script.imports.clone()
    }
}

struct MockInstance {
    script: MockScript,
    fuel_remaining: u64,
    disposed: bool,
    disposals: Arc<AtomicUsize>,
}

impl InstanceHandle for MockInstance {
    fn call(&mut self, _function: &str, _args: &[Value]) -> Result<Vec<Value>, CallError> {
        match &self.script.call {
            MockCallOutcome::Return(values) => Ok(values.clone()),
            MockCallOutcome::Fail(err) => Err(err.clone()),
            MockCallOutcome::Panic => panic!("scripted host panic"),
        }
    }

    fn fuel_remaining(&self) -> u64 {
        if self.disposed {
            0
        } else {
            self.fuel_remaining
        }
    }

    fn capture_memory(&mut self) -> Vec<u8> {
        if self.disposed {
            Vec::new()
        } else {
            self.script.memory.clone()
        }
    }

    fn drain_logs(&mut self) -> Vec<GuestLogEntry> {
        Vec::new()
    }

    fn dispose(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }
}
