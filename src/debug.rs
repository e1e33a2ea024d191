use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSONL sink for layout and font-resolution events.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

// Counters are kept per call so concurrent renders never share a summary.
struct DebugState {
    writer: BufWriter<File>,
    counters: BTreeMap<u64, BTreeMap<String, u64>>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            })),
        })
    }

    /// Writes `{"type": kind, ...fields}` as one line.
    pub fn log_event(&self, kind: &str, fields: Value) {
        let mut record = serde_json::Map::new();
        record.insert("type".to_string(), Value::String(kind.to_string()));
        if let Value::Object(extra) = fields {
            record.extend(extra);
        }
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{}", Value::Object(record));
        }
    }

    pub fn increment(&self, call: u64, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state
                .counters
                .entry(call)
                .or_default()
                .entry(key.to_string())
                .or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    /// Writes and clears the counters recorded under `call`.
    pub fn emit_summary(&self, call: u64, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counters = state.counters.remove(&call).unwrap_or_default();
            let record = json!({
                "type": "debug.summary",
                "context": context,
                "call": call,
                "counts": counters,
            });
            let _ = writeln!(state.writer, "{record}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}
