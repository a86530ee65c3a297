//! Binary wire format for forensic dumps.
//!
//! ```text
//! offset  field              size
//! ------  -----------------  -----------
//! 0       magic "MNTN"       4 bytes
//! 4       version (u16 BE)   2 bytes
//! 6       memory_size (u64)  8 bytes   (uncompressed length, BE)
//! 14      metadata_size(u32) 4 bytes   (BE)
//! 18      metadata           metadata_size bytes (JSON)
//! 18+m    compressed_memory  remainder (zlib)
//! ```
//!
//! Metadata is a self-describing JSON encoding of every dump field except
//! `memory`. Encoding is a pure function of dump contents; round-tripping
//! is bit-identical for all fields, with memory compared after
//! decompression.

use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dump::ForensicDump;
use munition_common::{FailureReason, StackFrame};

/// Magic bytes at the start of every dump file.
pub const DUMP_MAGIC: [u8; 4] = *b"MNTN";

/// Current wire format version.
pub const FORMAT_VERSION: u16 = 1;

/// Advisory file extension for serialized dumps.
pub const DUMP_EXTENSION: &str = "mntn";

const HEADER_LEN: usize = 18;

/// Wire format errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The bytes do not start with the dump magic.
    #[error("not a forensic dump (bad magic)")]
    InvalidFormat,

    /// The dump was written by a newer format version.
    #[error("unsupported dump version {version} (current {FORMAT_VERSION})")]
    UnsupportedVersion {
        /// Version found in the header.
        version: u16,
    },

    /// The byte stream ends before the declared sizes.
    #[error("dump truncated: expected {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes the header promised.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// Metadata failed to encode or decode.
    #[error("dump metadata error: {detail}")]
    Metadata {
        /// Underlying serde message.
        detail: String,
    },

    /// Memory compression or decompression failed.
    #[error("dump memory compression error: {detail}")]
    Compression {
        /// Underlying I/O message.
        detail: String,
    },

    /// Decompressed memory does not match the declared length.
    #[error("dump memory length mismatch: header says {expected}, decompressed {actual}")]
    MemoryLength {
        /// Length from the header.
        expected: usize,
        /// Length after decompression.
        actual: usize,
    },
}

/// Every dump field except `memory`, in its self-describing form.
#[derive(Serialize, Deserialize)]
struct DumpMetadata {
    id: String,
    timestamp: DateTime<Utc>,
    reason: FailureReason,
    fuel_remaining: u64,
    fuel_allocated: u64,
    function_called: String,
    #[serde(with = "hex_hash")]
    args_hash: [u8; 32],
    execution_time_us: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stack_trace: Option<Vec<StackFrame>>,
}

/// Serialize a dump to its wire form.
///
/// # Errors
///
/// Returns an error if metadata encoding or memory compression fails.
pub fn encode(dump: &ForensicDump) -> Result<Vec<u8>, CodecError> {
    let metadata = DumpMetadata {
        id: dump.id().to_string(),
        timestamp: dump.timestamp(),
        reason: dump.reason().clone(),
        fuel_remaining: dump.fuel_remaining(),
        fuel_allocated: dump.fuel_allocated(),
        function_called: dump.function_called().to_string(),
        args_hash: *dump.args_hash(),
        execution_time_us: dump.execution_time_us(),
        stack_trace: dump.stack_trace().map(<[StackFrame]>::to_vec),
    };
    let metadata = serde_json::to_vec(&metadata).map_err(|e| CodecError::Metadata {
        detail: e.to_string(),
    })?;

    let mut out = Vec::with_capacity(HEADER_LEN + metadata.len() + dump.memory().len() / 4);
    out.extend_from_slice(&DUMP_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    out.extend_from_slice(&(dump.memory().len() as u64).to_be_bytes());
    out.extend_from_slice(&(metadata.len() as u32).to_be_bytes());
    out.extend_from_slice(&metadata);

    if !dump.memory().is_empty() {
        let mut encoder = ZlibEncoder::new(&mut out, Compression::default());
        encoder
            .write_all(dump.memory())
            .and_then(|()| encoder.finish().map(|_| ()))
            .map_err(|e| CodecError::Compression {
                detail: e.to_string(),
            })?;
    }

    Ok(out)
}

/// Deserialize a dump from its wire form.
///
/// # Errors
///
/// Rejects bad magic, newer versions, truncated streams, malformed
/// metadata, and memory whose decompressed length disagrees with the
/// header.
pub fn decode(bytes: &[u8]) -> Result<ForensicDump, CodecError> {
    if bytes.len() < 4 || bytes[0..4] != DUMP_MAGIC {
        return Err(CodecError::InvalidFormat);
    }
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }

    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version > FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion { version });
    }

    let mut memory_size = [0u8; 8];
    memory_size.copy_from_slice(&bytes[6..14]);
    let memory_size = u64::from_be_bytes(memory_size) as usize;

    let mut metadata_size = [0u8; 4];
    metadata_size.copy_from_slice(&bytes[14..18]);
    let metadata_size = u32::from_be_bytes(metadata_size) as usize;

    let metadata_end = HEADER_LEN + metadata_size;
    if bytes.len() < metadata_end {
        return Err(CodecError::Truncated {
            expected: metadata_end,
            actual: bytes.len(),
        });
    }

    let metadata: DumpMetadata =
        serde_json::from_slice(&bytes[HEADER_LEN..metadata_end]).map_err(|e| {
            CodecError::Metadata {
                detail: e.to_string(),
            }
        })?;

    let compressed = &bytes[metadata_end..];
    let memory = if memory_size > 0 && !compressed.is_empty() {
        let mut memory = Vec::with_capacity(memory_size);
        ZlibDecoder::new(compressed)
            .read_to_end(&mut memory)
            .map_err(|e| CodecError::Compression {
                detail: e.to_string(),
            })?;
        if memory.len() != memory_size {
            return Err(CodecError::MemoryLength {
                expected: memory_size,
                actual: memory.len(),
            });
        }
        memory
    } else {
        Vec::new()
    };

    Ok(ForensicDump::new(
        metadata.id,
        metadata.timestamp,
        metadata.reason,
        memory,
        metadata.fuel_remaining,
        metadata.fuel_allocated,
        metadata.function_called,
        metadata.args_hash,
        metadata.execution_time_us,
        metadata.stack_trace,
    ))
}

/// Hex serde adapter for the fixed-size argument hash.
mod hex_hash {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("args_hash must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{capture_minimal, CaptureContext};
    use crate::dump::WASM_PAGE_SIZE;
    use munition_common::{TrapKind, Value};

    fn sample_dump(memory: Vec<u8>) -> ForensicDump {
        ForensicDump::new(
            "0123456789abcdef0123456789abcdef".into(),
            Utc::now(),
            FailureReason::trap(TrapKind::Unreachable, "unreachable executed"),
            memory,
            123,
            10_000,
            "crash_after_n".into(),
            [9u8; 32],
            4_567,
            Some(vec![StackFrame {
                func_index: 3,
                func_name: Some("crash_after_n".into()),
                module_offset: Some(0x40),
            }]),
        )
    }

    #[test]
    fn test_round_trip_with_memory() {
        let mut memory = vec![0u8; WASM_PAGE_SIZE];
        memory[0] = 0xDE;
        memory[100] = 0xAD;
        let dump = sample_dump(memory);

        let encoded = encode(&dump).unwrap();
        let decoded = decode(&encoded).unwrap();

        assert_eq!(dump, decoded);
    }

    #[test]
    fn test_round_trip_empty_memory() {
        let dump = capture_minimal(CaptureContext {
            reason: FailureReason::compilation_failed("bad magic"),
            fuel_allocated: 1_000,
            function_called: "f".into(),
            args: vec![Value::I32(1)],
            execution_time_us: 10,
            stack_trace: None,
        });

        let encoded = encode(&dump).unwrap();
        let decoded = decode(&encoded).unwrap();

        assert_eq!(dump, decoded);
        assert!(decoded.memory().is_empty());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let dump = sample_dump(vec![0x55; 256]);
        assert_eq!(encode(&dump).unwrap(), encode(&dump).unwrap());
    }

    #[test]
    fn test_header_layout() {
        let dump = sample_dump(vec![1, 2, 3, 4]);
        let encoded = encode(&dump).unwrap();

        assert_eq!(&encoded[0..4], b"MNTN");
        assert_eq!(u16::from_be_bytes([encoded[4], encoded[5]]), 1);
        assert_eq!(
            u64::from_be_bytes(encoded[6..14].try_into().unwrap()),
            4u64
        );
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dump = sample_dump(vec![]);
        let mut encoded = encode(&dump).unwrap();
        encoded[0] = b'X';

        assert!(matches!(decode(&encoded), Err(CodecError::InvalidFormat)));
        assert!(matches!(decode(b"MN"), Err(CodecError::InvalidFormat)));
    }

    #[test]
    fn test_newer_version_rejected() {
        let dump = sample_dump(vec![]);
        let mut encoded = encode(&dump).unwrap();
        encoded[4..6].copy_from_slice(&2u16.to_be_bytes());

        assert!(matches!(
            decode(&encoded),
            Err(CodecError::UnsupportedVersion { version: 2 })
        ));
    }

    #[test]
    fn test_truncated_metadata_rejected() {
        let dump = sample_dump(vec![]);
        let encoded = encode(&dump).unwrap();

        let result = decode(&encoded[..HEADER_LEN + 5]);
        assert!(matches!(result, Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn test_memory_length_mismatch_rejected() {
        let dump = sample_dump(vec![7u8; 64]);
        let mut encoded = encode(&dump).unwrap();
        // Lie about the uncompressed size.
        encoded[6..14].copy_from_slice(&128u64.to_be_bytes());

        assert!(matches!(
            decode(&encoded),
            Err(CodecError::MemoryLength {
                expected: 128,
                actual: 64
            })
        ));
    }

    #[test]
    fn test_compression_shrinks_zero_pages() {
        let dump = sample_dump(vec![0u8; WASM_PAGE_SIZE]);
        let encoded = encode(&dump).unwrap();

        assert!(encoded.len() < WASM_PAGE_SIZE / 8);
    }
}
