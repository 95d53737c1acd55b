use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::utils::{now_millis, truncate_text};

pub const LOG_CAPACITY: usize = 2000;
const MAX_PAYLOAD_TEXT: usize = 500;

/// One append-only event log entry (on-disk shape `{t, evt, info}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "evt")]
    pub kind: String,
    #[serde(rename = "info", default)]
    pub payload: serde_json::Value,
}

impl LogEntry {
    pub fn now(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            timestamp: now_millis(),
            kind: kind.into(),
            payload: truncate_payload(payload),
        }
    }
}

/// Capacity-bounded ring of log entries; the oldest entry is dropped first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
}

impl EventLog {
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > LOG_CAPACITY {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Trim an over-capacity log loaded from disk.
    pub(crate) fn enforce_capacity(&mut self) {
        while self.entries.len() > LOG_CAPACITY {
            self.entries.pop_front();
        }
    }
}

fn truncate_payload(v: serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::String(s) => {
            serde_json::Value::String(truncate_text(&s, MAX_PAYLOAD_TEXT))
        }
        serde_json::Value::Array(xs) => {
            serde_json::Value::Array(xs.into_iter().map(truncate_payload).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, truncate_payload(v)))
                .collect(),
        ),
        other => other,
    }
}
