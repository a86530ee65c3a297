//! Forensic subsystem for the Munition sandbox.
//!
//! When a guest dies, the sandbox captures its complete final state into an
//! immutable [`ForensicDump`]: linear memory, fuel accounting, the failure
//! reason, and a hash of the arguments that provoked it. Dumps serialize to
//! a compact binary format and support offline inspection without any
//! engine present.
//!
//! # Modules
//!
//! - [`dump`]: The dump value object and its one-line summary
//! - [`capture`]: Building dumps from live (possibly trapped) instances
//! - [`codec`]: The binary wire format (magic `MNTN`, zlib memory)
//! - [`analysis`]: Read-only memory inspection (patterns, strings, reads,
//!   hex dump, statistics)

pub mod analysis;
pub mod capture;
pub mod codec;
pub mod dump;

pub use analysis::{AnalysisError, MemoryAnalyzer, MemoryStats, StringScanOptions};
pub use capture::{capture, capture_minimal, hash_args, CaptureContext};
pub use codec::{decode, encode, CodecError, DUMP_EXTENSION, DUMP_MAGIC, FORMAT_VERSION};
pub use dump::{ForensicDump, WASM_PAGE_SIZE};
