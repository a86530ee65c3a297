//! Read-only analysis over a dump's memory.
//!
//! The analyser borrows the dump's memory and never copies more than a
//! requested slice; a dump can be inspected repeatedly without touching
//! its contents.

use thiserror::Error;

use crate::dump::{ForensicDump, WASM_PAGE_SIZE};

/// A rejected read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The requested range does not fit inside the memory snapshot.
    #[error("read of {width} bytes at offset {offset} is out of bounds (memory is {size} bytes)")]
    OutOfBounds {
        /// Requested start offset.
        offset: usize,
        /// Requested width in bytes.
        width: usize,
        /// Memory snapshot size.
        size: usize,
    },
}

/// Options for printable-string extraction.
#[derive(Debug, Clone, Copy)]
pub struct StringScanOptions {
    /// Runs shorter than this are skipped.
    pub min_length: usize,

    /// Runs longer than this are truncated at the boundary.
    pub max_length: usize,
}

impl Default for StringScanOptions {
    fn default() -> Self {
        Self {
            min_length: 4,
            max_length: 256,
        }
    }
}

/// Memory utilization statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryStats {
    /// Snapshot size in bytes.
    pub size_bytes: usize,

    /// Snapshot size in 64 KiB pages.
    pub size_pages: usize,

    /// Number of zero bytes.
    pub zero_bytes: usize,

    /// Number of non-zero bytes.
    pub non_zero_bytes: usize,

    /// Fraction of non-zero bytes; `0.0` for an empty snapshot.
    pub utilization: f64,
}

/// Read-only views over a dump's memory snapshot.
pub struct MemoryAnalyzer<'a> {
    memory: &'a [u8],
}

impl<'a> MemoryAnalyzer<'a> {
    /// Analyse a dump's memory.
    pub fn new(dump: &'a ForensicDump) -> Self {
        Self {
            memory: dump.memory(),
        }
    }

    /// Analyse a raw byte buffer.
    pub fn over(memory: &'a [u8]) -> Self {
        Self { memory }
    }

    /// Snapshot size in bytes.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// All offsets where `needle` occurs, ascending.
    ///
    /// Matches may overlap: after a match at offset `k`, the search resumes
    /// at `k + 1`. An empty needle matches nothing.
    pub fn find_pattern(&self, needle: &[u8]) -> Vec<usize> {
        if needle.is_empty() || needle.len() > self.memory.len() {
            return Vec::new();
        }
        self.memory
            .windows(needle.len())
            .enumerate()
            .filter(|(_, window)| *window == needle)
            .map(|(offset, _)| offset)
            .collect()
    }

    /// Extract printable ASCII runs as `(offset, string)` pairs.
    ///
    /// A run is a maximal sequence of bytes in `[0x20, 0x7E]`. Runs
    /// shorter than `min_length` are skipped; longer runs are emitted
    /// truncated to `max_length`.
    pub fn extract_strings(&self, options: StringScanOptions) -> Vec<(usize, String)> {
        let mut found = Vec::new();
        let mut i = 0;
        while i < self.memory.len() {
            if !is_printable(self.memory[i]) {
                i += 1;
                continue;
            }
            let start = i;
            while i < self.memory.len() && is_printable(self.memory[i]) {
                i += 1;
            }
            let run = &self.memory[start..i];
            if run.len() >= options.min_length {
                let taken = &run[..run.len().min(options.max_length)];
                // Printable ASCII is valid UTF-8 by construction.
                found.push((start, String::from_utf8_lossy(taken).into_owned()));
            }
        }
        found
    }

    /// Little-endian signed 32-bit read.
    pub fn read_i32(&self, offset: usize) -> Result<i32, AnalysisError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.read_bytes(offset, 4)?);
        Ok(i32::from_le_bytes(buf))
    }

    /// Little-endian signed 64-bit read.
    pub fn read_i64(&self, offset: usize) -> Result<i64, AnalysisError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.read_bytes(offset, 8)?);
        Ok(i64::from_le_bytes(buf))
    }

    /// Borrow `length` bytes starting at `offset`.
    pub fn read_bytes(&self, offset: usize, length: usize) -> Result<&'a [u8], AnalysisError> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= self.memory.len())
            .ok_or(AnalysisError::OutOfBounds {
                offset,
                width: length,
                size: self.memory.len(),
            })?;
        Ok(&self.memory[offset..end])
    }

    /// Canonical 16-bytes-per-row hex rendering.
    ///
    /// Each row: 8-hex-digit absolute offset, two spaces, space-separated
    /// two-digit hex bytes padded to 48 columns, two spaces, ASCII gutter
    /// with `.` for non-printable bytes. Ranges past the end of memory are
    /// clamped.
    pub fn hex_dump(&self, offset: usize, length: usize) -> String {
        let end = offset.saturating_add(length).min(self.memory.len());
        if offset >= end {
            return String::new();
        }

        let mut out = String::new();
        for (row, chunk) in self.memory[offset..end].chunks(16).enumerate() {
            let row_offset = offset + row * 16;
            let hex: Vec<String> = chunk.iter().map(|byte| format!("{byte:02x}")).collect();
            let ascii: String = chunk
                .iter()
                .map(|&byte| if is_printable(byte) { byte as char } else { '.' })
                .collect();
            out.push_str(&format!(
                "{row_offset:08x}  {:<48}  {ascii}\n",
                hex.join(" ")
            ));
        }
        out
    }

    /// Memory utilization statistics.
    pub fn stats(&self) -> MemoryStats {
        let zero_bytes = self.memory.iter().filter(|&&byte| byte == 0).count();
        let non_zero_bytes = self.memory.len() - zero_bytes;
        let utilization = if self.memory.is_empty() {
            0.0
        } else {
            non_zero_bytes as f64 / self.memory.len() as f64
        };
        MemoryStats {
            size_bytes: self.memory.len(),
            size_pages: self.memory.len() / WASM_PAGE_SIZE,
            zero_bytes,
            non_zero_bytes,
            utilization,
        }
    }
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_pattern_ascending_and_overlapping() {
        let memory = [0xAA, 0xAA, 0xAA, 0x00, 0xAA, 0xAA];
        let analyzer = MemoryAnalyzer::over(&memory);

        // Overlapping matches of "AA AA" inside "AA AA AA".
        assert_eq!(analyzer.find_pattern(&[0xAA, 0xAA]), vec![0, 1, 4]);
    }

    #[test]
    fn test_find_pattern_matches_memory() {
        let memory = b"the needle in the haystack";
        let analyzer = MemoryAnalyzer::over(memory);

        for offset in analyzer.find_pattern(b"the") {
            assert_eq!(&memory[offset..offset + 3], b"the");
        }
        assert_eq!(analyzer.find_pattern(b"the"), vec![0, 14]);
    }

    #[test]
    fn test_find_pattern_edges() {
        let analyzer = MemoryAnalyzer::over(b"abc");
        assert!(analyzer.find_pattern(&[]).is_empty());
        assert!(analyzer.find_pattern(b"abcd").is_empty());
        assert!(MemoryAnalyzer::over(&[]).find_pattern(b"a").is_empty());
    }

    #[test]
    fn test_extract_strings() {
        let mut memory = vec![0u8; 32];
        memory[3..8].copy_from_slice(b"hello");
        memory[10..12].copy_from_slice(b"no"); // too short
        memory[20..26].copy_from_slice(b"world!");

        let analyzer = MemoryAnalyzer::over(&memory);
        let strings = analyzer.extract_strings(StringScanOptions::default());

        assert_eq!(
            strings,
            vec![(3, "hello".to_string()), (20, "world!".to_string())]
        );
    }

    #[test]
    fn test_extract_strings_truncates_long_runs() {
        let memory = vec![b'a'; 20];
        let analyzer = MemoryAnalyzer::over(&memory);

        let strings = analyzer.extract_strings(StringScanOptions {
            min_length: 4,
            max_length: 8,
        });

        assert_eq!(strings, vec![(0, "aaaaaaaa".to_string())]);
    }

    #[test]
    fn test_extract_strings_all_zero() {
        let memory = vec![0u8; 1024];
        let analyzer = MemoryAnalyzer::over(&memory);
        assert!(analyzer
            .extract_strings(StringScanOptions::default())
            .is_empty());
    }

    #[test]
    fn test_read_i32_little_endian() {
        let memory = [0x2A, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        let analyzer = MemoryAnalyzer::over(&memory);

        assert_eq!(analyzer.read_i32(0), Ok(42));
        assert_eq!(analyzer.read_i32(4), Ok(-1));
    }

    #[test]
    fn test_read_i64_little_endian() {
        let memory = 1_234_567_890_123i64.to_le_bytes();
        let analyzer = MemoryAnalyzer::over(&memory);
        assert_eq!(analyzer.read_i64(0), Ok(1_234_567_890_123));
    }

    #[test]
    fn test_read_bounds() {
        let memory = [0u8; 16];
        let analyzer = MemoryAnalyzer::over(&memory);

        assert!(analyzer.read_i32(12).is_ok());
        assert_eq!(
            analyzer.read_i32(13),
            Err(AnalysisError::OutOfBounds {
                offset: 13,
                width: 4,
                size: 16
            })
        );
        assert!(analyzer.read_bytes(0, 16).is_ok());
        assert!(analyzer.read_bytes(1, 16).is_err());
        assert!(analyzer.read_bytes(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_hex_dump_format() {
        let mut memory = vec![0u8; 20];
        memory[..5].copy_from_slice(b"hello");
        let analyzer = MemoryAnalyzer::over(&memory);

        let rendered = analyzer.hex_dump(0, 20);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);

        // 8-digit offset, two spaces, 48 hex columns, two spaces, gutter.
        assert!(lines[0].starts_with("00000000  68 65 6c 6c 6f"));
        assert_eq!(lines[0].len(), 8 + 2 + 48 + 2 + 16);
        assert!(lines[0].ends_with("hello..........."));
        assert!(lines[1].starts_with("00000010  "));
    }

    #[test]
    fn test_hex_dump_clamps() {
        let analyzer = MemoryAnalyzer::over(b"abc");
        assert_eq!(analyzer.hex_dump(100, 16), "");
        assert_eq!(analyzer.hex_dump(0, 1000).lines().count(), 1);
    }

    #[test]
    fn test_stats() {
        let mut memory = vec![0u8; WASM_PAGE_SIZE];
        memory[..1024].fill(0xFF);
        let analyzer = MemoryAnalyzer::over(&memory);

        let stats = analyzer.stats();
        assert_eq!(stats.size_bytes, WASM_PAGE_SIZE);
        assert_eq!(stats.size_pages, 1);
        assert_eq!(stats.non_zero_bytes, 1024);
        assert_eq!(stats.zero_bytes, WASM_PAGE_SIZE - 1024);
        assert!((stats.utilization - 1024.0 / WASM_PAGE_SIZE as f64).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_empty() {
        let stats = MemoryAnalyzer::over(&[]).stats();
        assert_eq!(stats.size_bytes, 0);
        assert_eq!(stats.utilization, 0.0);
    }
}
