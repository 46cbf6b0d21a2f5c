use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 1024;
const HISTORY_CAPACITY: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Command,
    Success,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub at_unix_millis: i64,
    pub kind: LogKind,
    pub message: String,
    pub device_id: Option<String>,
}

/// Merged append-only log: bounded in-memory history plus a broadcast
/// fan-out for live consumers. Any task may append at any time; appends
/// never depend on other writers.
pub struct LogStream {
    history: Mutex<VecDeque<LogEntry>>,
    broadcaster: broadcast::Sender<LogEntry>,
    seq: AtomicU64,
}

impl LogStream {
    pub fn new() -> Self {
        let (broadcaster, _) = broadcast::channel(BROADCAST_CAPACITY);
        LogStream {
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            broadcaster,
            seq: AtomicU64::new(0),
        }
    }

    pub fn push(&self, kind: LogKind, message: impl Into<String>, device_id: Option<&str>) {
        let entry = LogEntry {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            at_unix_millis: cvp_util::now_millis(),
            kind,
            message: message.into(),
            device_id: device_id.map(str::to_string),
        };

        {
            let mut history = self.history.lock().unwrap();
            if history.len() >= HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(entry.clone());
        }

        // Broadcast (ignore send errors if no listeners).
        let _ = self.broadcaster.send(entry);
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    /// History snapshot plus a live receiver, taken under one lock so no
    /// entry is lost or duplicated between the two.
    pub fn subscribe(&self) -> (Vec<LogEntry>, broadcast::Receiver<LogEntry>) {
        let history = self.history.lock().unwrap();
        let snapshot = history.iter().cloned().collect();
        (snapshot, self.broadcaster.subscribe())
    }

    /// Drops the history. The sequence counter keeps climbing so entries
    /// stay ordered across clears.
    pub fn clear(&self) {
        self.history.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.history.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().unwrap().is_empty()
    }
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic_across_clears() {
        let logs = LogStream::new();
        logs.push(LogKind::Info, "one", None);
        logs.push(LogKind::Info, "two", Some("dev"));
        let before = logs.snapshot();
        assert_eq!(before.len(), 2);
        assert!(before[0].seq < before[1].seq);

        logs.clear();
        assert!(logs.is_empty());
        logs.push(LogKind::Error, "three", None);
        let after = logs.snapshot();
        assert_eq!(after.len(), 1);
        assert!(after[0].seq > before[1].seq);
    }

    #[test]
    fn history_is_bounded() {
        let logs = LogStream::new();
        for i in 0..(HISTORY_CAPACITY + 10) {
            logs.push(LogKind::Info, format!("entry {i}"), None);
        }
        let snapshot = logs.snapshot();
        assert_eq!(snapshot.len(), HISTORY_CAPACITY);
        assert_eq!(snapshot[0].message, "entry 10");
    }

    #[tokio::test]
    async fn subscribers_see_live_entries() {
        let logs = LogStream::new();
        logs.push(LogKind::Info, "historic", None);

        let (history, mut rx) = logs.subscribe();
        assert_eq!(history.len(), 1);

        logs.push(LogKind::Command, "live", Some("emulator-5554"));
        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.kind, LogKind::Command);
        assert_eq!(entry.message, "live");
        assert_eq!(entry.device_id.as_deref(), Some("emulator-5554"));
    }
}
