//! # raft-storage
//!
//! why: optional durability for the state raft needs after a restart
//! relations: driven by raft-node's runner when a data dir is configured
//! what: Storage trait, FileStorage (json files), InMemoryStorage for tests
//!
//! the node runs purely in memory by default. a data dir turns persistence
//! on: term, vote and log are flushed after every event, before replies go
//! out, and reloaded on startup.

use raft_core::{LogEntry, LogIndex, NodeId, Term};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// trait for durable storage of raft state
pub trait Storage {
    /// persist the current term and voted_for
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<NodeId>) -> io::Result<()>;

    /// load the persisted term and voted_for, `(0, None)` for a fresh node
    fn load_term_and_vote(&self) -> io::Result<(Term, Option<NodeId>)>;

    /// append entries to the tail of the log
    fn append_entries(&mut self, entries: &[LogEntry]) -> io::Result<()>;

    /// load all log entries (for crash recovery)
    fn load_log(&self) -> io::Result<Vec<LogEntry>>;

    /// drop every entry with index >= `from_index` (conflict resolution)
    fn truncate_log_from(&mut self, from_index: LogIndex) -> io::Result<()>;

    /// rewrite the log tail starting at `from_index`
    fn replace_log_from(&mut self, from_index: LogIndex, entries: &[LogEntry]) -> io::Result<()> {
        self.truncate_log_from(from_index)?;
        self.append_entries(entries)
    }

    /// clear all persisted state
    fn clear(&mut self) -> io::Result<()>;
}

fn invalid_data(e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

// -- file storage implementation --

/// file-based storage
///
/// stores raft state in a directory with:
/// - meta.json: term and voted_for
/// - log.json: array of log entries
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// open (and create if needed) a storage directory
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join("log.json")
    }

    /// write to a temp file, fsync, then rename over the target
    fn write_atomic(&self, target: &Path, temp_name: &str, bytes: &[u8]) -> io::Result<()> {
        let temp_path = self.dir.join(temp_name);
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, target)
    }

    fn write_log(&self, log: &[LogEntry]) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(log).map_err(invalid_data)?;
        self.write_atomic(&self.log_path(), "log.tmp", &json)
    }

    fn read_file(path: &Path) -> io::Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        Ok(Some(contents))
    }
}

/// metadata structure for term and vote
#[derive(serde::Serialize, serde::Deserialize, Default)]
struct MetaData {
    term: Term,
    voted_for: Option<NodeId>,
}

impl Storage for FileStorage {
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<NodeId>) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(&MetaData { term, voted_for }).map_err(invalid_data)?;
        self.write_atomic(&self.meta_path(), "meta.tmp", &json)
    }

    fn load_term_and_vote(&self) -> io::Result<(Term, Option<NodeId>)> {
        let Some(contents) = Self::read_file(&self.meta_path())? else {
            return Ok((0, None));
        };
        let meta: MetaData = serde_json::from_str(&contents).map_err(invalid_data)?;
        Ok((meta.term, meta.voted_for))
    }

    fn append_entries(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut log = self.load_log()?;
        log.extend(entries.iter().cloned());
        self.write_log(&log)
    }

    fn load_log(&self) -> io::Result<Vec<LogEntry>> {
        match Self::read_file(&self.log_path())? {
            Some(contents) => serde_json::from_str(&contents).map_err(invalid_data),
            None => Ok(Vec::new()),
        }
    }

    fn truncate_log_from(&mut self, from_index: LogIndex) -> io::Result<()> {
        let mut log = self.load_log()?;
        log.retain(|e| e.index < from_index);
        self.write_log(&log)
    }

    fn replace_log_from(&mut self, from_index: LogIndex, entries: &[LogEntry]) -> io::Result<()> {
        // one rewrite instead of truncate + append
        let mut log = self.load_log()?;
        log.retain(|e| e.index < from_index);
        log.extend(entries.iter().cloned());
        self.write_log(&log)
    }

    fn clear(&mut self) -> io::Result<()> {
        for path in [self.meta_path(), self.log_path()] {
            match fs::remove_file(path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }
}

// -- in-memory storage implementation --

/// in-memory storage, nothing survives the process
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    term: Term,
    voted_for: Option<NodeId>,
    log: Vec<LogEntry>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<NodeId>) -> io::Result<()> {
        self.term = term;
        self.voted_for = voted_for;
        Ok(())
    }

    fn load_term_and_vote(&self) -> io::Result<(Term, Option<NodeId>)> {
        Ok((self.term, self.voted_for))
    }

    fn append_entries(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        self.log.extend(entries.iter().cloned());
        Ok(())
    }

    fn load_log(&self) -> io::Result<Vec<LogEntry>> {
        Ok(self.log.clone())
    }

    fn truncate_log_from(&mut self, from_index: LogIndex) -> io::Result<()> {
        self.log.retain(|e| e.index < from_index);
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        *self = Self::default();
        Ok(())
    }
}
