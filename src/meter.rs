//! Fuel-accounting sidecar.
//!
//! An opt-in, process-wide tally of fuel consumption keyed by function
//! name. Writes go through an mpsc channel to a single writer thread, so
//! recording from the execution path is a non-blocking send; reads clone a
//! snapshot. The meter is observability only: no call depends on it to
//! succeed, and a dropped record is acceptable.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, Utc};

/// Accumulated fuel statistics for one function name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuelStats {
    /// Number of recorded calls.
    pub count: u64,

    /// Total fuel consumed across all calls.
    pub total_consumed: u64,

    /// Largest single-call consumption.
    pub max: u64,

    /// Smallest single-call consumption.
    pub min: u64,

    /// Most recent consumption.
    pub last: u64,

    /// When the most recent record arrived.
    pub last_timestamp: DateTime<Utc>,
}

enum MeterCommand {
    Record { function: String, consumed: u64 },
    Reset,
    Flush(mpsc::Sender<()>),
}

/// Process-wide fuel consumption tally.
pub struct FuelMeter {
    entries: Arc<Mutex<HashMap<String, FuelStats>>>,
    tx: Mutex<mpsc::Sender<MeterCommand>>,
}

impl FuelMeter {
    /// Start the meter and its writer thread.
    ///
    /// The writer exits when the meter is dropped and the channel closes.
    pub fn new() -> Self {
        let entries: Arc<Mutex<HashMap<String, FuelStats>>> = Arc::default();
        let (tx, rx) = mpsc::channel::<MeterCommand>();

        let writer_entries = Arc::clone(&entries);
        thread::spawn(move || {
            while let Ok(command) = rx.recv() {
                match command {
                    MeterCommand::Record { function, consumed } => {
                        let Ok(mut entries) = writer_entries.lock() else {
                            continue;
                        };
                        let now = Utc::now();
                        entries
                            .entry(function)
                            .and_modify(|stats| {
                                stats.count += 1;
                                stats.total_consumed += consumed;
                                stats.max = stats.max.max(consumed);
                                stats.min = stats.min.min(consumed);
                                stats.last = consumed;
                                stats.last_timestamp = now;
                            })
                            .or_insert_with(|| FuelStats {
                                count: 1,
                                total_consumed: consumed,
                                max: consumed,
                                min: consumed,
                                last: consumed,
                                last_timestamp: now,
                            });
                    }
                    MeterCommand::Reset => {
                        if let Ok(mut entries) = writer_entries.lock() {
                            entries.clear();
                        }
                    }
                    MeterCommand::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self {
            entries,
            tx: Mutex::new(tx),
        }
    }

    /// Record one call's fuel consumption. Fire-and-forget.
    pub fn record(&self, function: &str, consumed: u64) {
        self.send(MeterCommand::Record {
            function: function.to_string(),
            consumed,
        });
    }

    /// Clear all entries atomically.
    pub fn reset(&self) {
        self.send(MeterCommand::Reset);
    }

    /// Wait until every record sent so far has been applied.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.send(MeterCommand::Flush(ack_tx));
        let _ = ack_rx.recv();
    }

    /// Clone the current table.
    pub fn snapshot(&self) -> HashMap<String, FuelStats> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn send(&self, command: MeterCommand) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(command);
        }
    }
}

impl Default for FuelMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FuelMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuelMeter")
            .field("entries", &self.snapshot().len())
            .finish_non_exhaustive()
    }
}
