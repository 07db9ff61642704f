use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::Verdict;
use crate::error::{Error, Result};
use crate::TrackId;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub track_id: TrackId,
    pub verdict: Verdict,
}

impl LogEntry {
    pub fn new(track_id: TrackId, verdict: Verdict) -> Self {
        Self {
            timestamp: Local::now(),
            track_id,
            verdict,
        }
    }

    /// `time<TAB>track<TAB>verdict` line of the text log.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t\t{}",
            self.timestamp.format(TIME_FORMAT),
            self.track_id,
            self.verdict
        )
    }
}

/// Durable backend of the audit log.
pub trait LogStore: Send {
    fn append(&mut self, entry: &LogEntry) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Text log file in the tab separated layout reports are generated from.
pub struct FileLogStore {
    path: PathBuf,
    out: BufWriter<File>,
}

impl FileLogStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let fresh = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut out = BufWriter::new(file);

        if fresh {
            writeln!(out, "Suspicious Behavior Log")?;
            writeln!(out, "Time\t\t\t\tTrack ID\tStatus")?;
            writeln!(out, "{}", "-".repeat(50))?;
            out.flush()?;
        }

        Ok(Self { path, out })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogStore for FileLogStore {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        writeln!(self.out, "{}", entry.to_line())
            .and_then(|_| self.out.flush())
            .map_err(|e| Error::PersistenceError(format!("{}: {}", self.path.display(), e)))
    }

    fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .map_err(|e| Error::PersistenceError(e.to_string()))
    }
}

/// Keeps persisted entries in memory; shares them through an `Arc` so the
/// owner of the store can inspect what reached the backend.
#[derive(Clone, Default)]
pub struct MemoryLogStore {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }
}

impl LogStore for MemoryLogStore {
    fn append(&mut self, entry: &LogEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// What to do with an entry the backend refused.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum PersistencePolicy {
    /// The entry stays in the in-memory ledger but is never persisted.
    Drop,
    /// Failed entries are retried, oldest first, before every later append.
    /// At most `max_pending` are kept; overflow drops the oldest.
    Retry { max_pending: usize },
}

impl Default for PersistencePolicy {
    fn default() -> Self {
        PersistencePolicy::Retry { max_pending: 256 }
    }
}

/// Append-only ledger of verdict transitions.
pub struct AuditLog {
    entries: Vec<LogEntry>,
    store: Box<dyn LogStore>,
    policy: PersistencePolicy,
    pending: VecDeque<LogEntry>,
    lost: u64,
}

impl AuditLog {
    pub fn new(store: Box<dyn LogStore>, policy: PersistencePolicy) -> Self {
        Self {
            entries: Vec::new(),
            store,
            policy,
            pending: VecDeque::new(),
            lost: 0,
        }
    }

    /// Ledger backed by nothing but memory.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryLogStore::new()), PersistencePolicy::Drop)
    }

    /// Records the entry and persists it. The entry is part of the ledger
    /// even when persisting fails; the error tells the caller it is not
    /// durable (yet).
    pub fn append(&mut self, entry: LogEntry) -> Result<()> {
        self.entries.push(entry.clone());

        if let Err(err) = self.retry_pending() {
            self.defer(entry);
            return Err(err);
        }

        match self.store.append(&entry) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.defer(entry);
                Err(err)
            }
        }
    }

    /// Retries buffered entries and flushes the backend.
    pub fn flush(&mut self) -> Result<()> {
        self.retry_pending()?;
        self.store.flush()
    }

    /// All entries in append order.
    #[inline]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries waiting to be persisted.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Entries that will never be persisted.
    #[inline]
    pub fn lost(&self) -> u64 {
        self.lost
    }

    fn retry_pending(&mut self) -> Result<()> {
        while let Some(entry) = self.pending.front() {
            self.store.append(entry)?;
            debug!(track_id = %entry.track_id, "buffered audit entry persisted");
            self.pending.pop_front();
        }

        Ok(())
    }

    fn defer(&mut self, entry: LogEntry) {
        match self.policy {
            PersistencePolicy::Drop => {
                self.lost += 1;
                warn!(track_id = %entry.track_id, verdict = %entry.verdict, "audit entry lost");
            }
            PersistencePolicy::Retry { max_pending } => {
                if self.pending.len() >= max_pending {
                    if let Some(old) = self.pending.pop_front() {
                        self.lost += 1;
                        warn!(track_id = %old.track_id, "audit retry buffer full, oldest entry lost");
                    }
                }

                if max_pending > 0 {
                    self.pending.push_back(entry);
                } else {
                    self.lost += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store that refuses appends while `down` is set.
    #[derive(Clone, Default)]
    struct FlakyStore {
        down: Arc<Mutex<bool>>,
        inner: MemoryLogStore,
    }

    impl LogStore for FlakyStore {
        fn append(&mut self, entry: &LogEntry) -> Result<()> {
            if *self.down.lock() {
                return Err(Error::PersistenceError("store offline".into()));
            }

            self.inner.append(entry)
        }
    }

    #[test]
    fn keeps_append_order() {
        let mut log = AuditLog::in_memory();

        log.append(LogEntry::new(TrackId(1), Verdict::Running)).unwrap();
        log.append(LogEntry::new(TrackId(2), Verdict::Loitering)).unwrap();
        log.append(LogEntry::new(TrackId(1), Verdict::Loitering)).unwrap();

        let ids: Vec<u32> = log.entries().iter().map(|e| e.track_id.0).collect();
        assert_eq!(ids, vec![1, 2, 1]);
        assert!(log.entries()[0].timestamp <= log.entries()[2].timestamp);
    }

    #[test]
    fn drop_policy_counts_lost_entries() {
        let store = FlakyStore::default();
        *store.down.lock() = true;
        let mut log = AuditLog::new(Box::new(store.clone()), PersistencePolicy::Drop);

        let err = log.append(LogEntry::new(TrackId(1), Verdict::Running)).unwrap_err();
        assert!(matches!(err, Error::PersistenceError(_)));
        assert_eq!(log.lost(), 1);
        assert_eq!(log.len(), 1);

        *store.down.lock() = false;
        log.flush().unwrap();
        assert!(store.inner.entries().is_empty());
    }

    #[test]
    fn retry_policy_persists_in_order() {
        let store = FlakyStore::default();
        *store.down.lock() = true;
        let mut log = AuditLog::new(
            Box::new(store.clone()),
            PersistencePolicy::Retry { max_pending: 8 },
        );

        assert!(log.append(LogEntry::new(TrackId(1), Verdict::Running)).is_err());
        assert!(log.append(LogEntry::new(TrackId(2), Verdict::Running)).is_err());
        assert_eq!(log.pending(), 2);

        *store.down.lock() = false;
        log.append(LogEntry::new(TrackId(3), Verdict::Loitering)).unwrap();

        let ids: Vec<u32> = store.inner.entries().iter().map(|e| e.track_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(log.pending(), 0);
        assert_eq!(log.lost(), 0);
    }

    #[test]
    fn retry_buffer_is_bounded() {
        let store = FlakyStore::default();
        *store.down.lock() = true;
        let mut log = AuditLog::new(
            Box::new(store.clone()),
            PersistencePolicy::Retry { max_pending: 2 },
        );

        for id in 0..5 {
            let _ = log.append(LogEntry::new(TrackId(id), Verdict::Running));
        }

        assert_eq!(log.pending(), 2);
        assert_eq!(log.lost(), 3);

        *store.down.lock() = false;
        log.flush().unwrap();

        let ids: Vec<u32> = store.inner.entries().iter().map(|e| e.track_id.0).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");

        {
            let mut store = FileLogStore::open(&path).unwrap();
            store
                .append(&LogEntry::new(TrackId(9), Verdict::Loitering))
                .unwrap();
        }
        {
            // reopening must not repeat the header
            let mut store = FileLogStore::open(&path).unwrap();
            store
                .append(&LogEntry::new(TrackId(9), Verdict::Running))
                .unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Suspicious Behavior Log");
        assert!(lines[3].ends_with("\t9\t\tLoitering"));
        assert!(lines[4].ends_with("\t9\t\tRunning"));
        assert_eq!(lines.iter().filter(|l| l.starts_with("Suspicious")).count(), 1);
    }
}
