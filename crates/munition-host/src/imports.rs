//! Import table assembly from capability grants.
//!
//! The import table is the *entire* surface a guest can see: a mapping from
//! import module to function name to signature plus host binding. The
//! runtime adapter lowers each [`HostBinding`] into an engine-native
//! closure; this module stays engine-agnostic.
//!
//! Tables are built fresh per call and never shared, so a grant revoked
//! between calls can never linger in a cached linker.

use std::collections::BTreeMap;

use munition_common::ValType;

use crate::capabilities::{Capability, CapabilitySet};
use crate::logging::GuestLogLevel;

/// The import namespace all gated host functions live under.
pub const ENV_MODULE: &str = "env";

/// What a host function does, as an engine-agnostic tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostBinding {
    /// `() -> i64`: milliseconds since the Unix epoch.
    TimeMs,
    /// `() -> i32`: a random 32-bit integer.
    RandomU32,
    /// `() -> i64`: a random 64-bit integer.
    RandomU64,
    /// `(ptr: i32, len: i32) -> ()`: read a UTF-8 message from guest
    /// memory and record it at the given level.
    Log(GuestLogLevel),
}

/// Signature and binding for one importable host function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFunctionDef {
    /// Parameter types, in order.
    pub params: Vec<ValType>,

    /// Result types, in order.
    pub results: Vec<ValType>,

    /// What the function does.
    pub binding: HostBinding,
}

/// The import surface offered to one guest instantiation.
///
/// Keys are ordered so iteration (and therefore linker registration) is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportTable {
    modules: BTreeMap<String, BTreeMap<String, HostFunctionDef>>,
}

impl ImportTable {
    /// An import table offering nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the import table for a capability grant.
    ///
    /// The grant is expanded first, so `filesystem_write` behaves like
    /// `filesystem_write + filesystem_read`. Capabilities with no host
    /// functions in this core (`filesystem_*`, `network`,
    /// `host_function(..)`) contribute nothing. Duplicate grants bind
    /// once.
    pub fn build(granted: &CapabilitySet) -> Self {
        let mut table = Self::empty();
        for cap in granted.expand().iter() {
            match cap {
                Capability::Time => {
                    table.insert(
                        ENV_MODULE,
                        "get_time_ms",
                        HostFunctionDef {
                            params: vec![],
                            results: vec![ValType::I64],
                            binding: HostBinding::TimeMs,
                        },
                    );
                }
                Capability::Random => {
                    table.insert(
                        ENV_MODULE,
                        "get_random_u32",
                        HostFunctionDef {
                            params: vec![],
                            results: vec![ValType::I32],
                            binding: HostBinding::RandomU32,
                        },
                    );
                    table.insert(
                        ENV_MODULE,
                        "get_random_u64",
                        HostFunctionDef {
                            params: vec![],
                            results: vec![ValType::I64],
                            binding: HostBinding::RandomU64,
                        },
                    );
                }
                Capability::Log => {
                    for level in [
                        GuestLogLevel::Debug,
                        GuestLogLevel::Info,
                        GuestLogLevel::Warn,
                        GuestLogLevel::Error,
                    ] {
                        table.insert(
                            ENV_MODULE,
                            level.export_name(),
                            HostFunctionDef {
                                params: vec![ValType::I32, ValType::I32],
                                results: vec![],
                                binding: HostBinding::Log(level),
                            },
                        );
                    }
                }
                Capability::FilesystemRead
                | Capability::FilesystemWrite
                | Capability::Network
                | Capability::HostFunction(_) => {
                    // Declared in the registry, no exports in this core.
                }
            }
        }
        table
    }

    fn insert(&mut self, module: &str, name: &str, def: HostFunctionDef) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(name.to_string(), def);
    }

    /// Look up one function.
    pub fn get(&self, module: &str, name: &str) -> Option<&HostFunctionDef> {
        self.modules.get(module)?.get(name)
    }

    /// Iterate all functions as `(module, name, def)`, in deterministic
    /// order.
    pub fn functions(&self) -> impl Iterator<Item = (&str, &str, &HostFunctionDef)> {
        self.modules.iter().flat_map(|(module, funcs)| {
            funcs
                .iter()
                .map(move |(name, def)| (module.as_str(), name.as_str(), def))
        })
    }

    /// Total number of importable functions.
    pub fn len(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    /// Whether the table offers nothing.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_grant_empty_table() {
        let table = ImportTable::build(&CapabilitySet::new());
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_time_exports() {
        let table = ImportTable::build(&CapabilitySet::new().with(Capability::Time));

        let def = table.get(ENV_MODULE, "get_time_ms").unwrap();
        assert!(def.params.is_empty());
        assert_eq!(def.results, vec![ValType::I64]);
        assert_eq!(def.binding, HostBinding::TimeMs);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_random_exports() {
        let table = ImportTable::build(&CapabilitySet::new().with(Capability::Random));

        assert_eq!(
            table.get(ENV_MODULE, "get_random_u32").unwrap().results,
            vec![ValType::I32]
        );
        assert_eq!(
            table.get(ENV_MODULE, "get_random_u64").unwrap().results,
            vec![ValType::I64]
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_log_exports() {
        let table = ImportTable::build(&CapabilitySet::new().with(Capability::Log));

        for name in ["log_debug", "log_info", "log_warn", "log_error"] {
            let def = table.get(ENV_MODULE, name).unwrap();
            assert_eq!(def.params, vec![ValType::I32, ValType::I32]);
            assert!(def.results.is_empty());
        }
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_ungated_capabilities_export_nothing() {
        let table = ImportTable::build(
            &CapabilitySet::new()
                .with(Capability::FilesystemWrite)
                .with(Capability::Network)
                .with(Capability::HostFunction("lookup".into())),
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_grants_bind_once() {
        let mut granted = CapabilitySet::new();
        granted.grant(Capability::Log);
        granted.grant(Capability::Log);

        let table = ImportTable::build(&granted);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_functions_iteration_is_deterministic() {
        let granted = CapabilitySet::new()
            .with(Capability::Time)
            .with(Capability::Random)
            .with(Capability::Log);

        let names_a: Vec<_> = ImportTable::build(&granted)
            .functions()
            .map(|(_, name, _)| name.to_string())
            .collect();
        let names_b: Vec<_> = ImportTable::build(&granted)
            .functions()
            .map(|(_, name, _)| name.to_string())
            .collect();

        assert_eq!(names_a, names_b);
        assert_eq!(names_a.len(), 7);
    }
}
