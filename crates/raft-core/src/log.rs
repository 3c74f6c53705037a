//! # log
//!
//! why: manage the append-only log of commands that raft replicates
//! relations: owned by node.rs, entries shipped in message.rs, persisted via raft-storage
//! what: LogEntry struct, Log container, consistency check and up-to-date comparison

use serde::{Deserialize, Serialize};

/// Election epoch counter
pub type Term = u64;

/// Position of an entry in the log (0-based)
pub type LogIndex = i64;

/// Sentinel index meaning "before the first entry"
pub const NO_INDEX: LogIndex = -1;

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term when this entry was created
    pub term: Term,
    /// The index of this entry in the log (0-based, contiguous)
    pub index: LogIndex,
    /// The command to be applied to the state machine
    pub command: Vec<u8>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: Term, index: LogIndex, command: Vec<u8>) -> Self {
        Self { term, index, command }
    }
}

/// Ordered, contiguous sequence of entries where `entries[i].index == i`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Log {
    /// create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// rebuild a log from entries loaded off disk
    ///
    /// entries are re-numbered by position; anything after the first gap
    /// in the stored indices is dropped.
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        let mut log = Self::new();
        for entry in entries {
            if entry.index != log.len() {
                break;
            }
            log.entries.push(entry);
        }
        log
    }

    /// number of entries, as an index type
    pub fn len(&self) -> LogIndex {
        self.entries.len() as LogIndex
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// index of the last entry, `NO_INDEX` when empty
    pub fn last_index(&self) -> LogIndex {
        self.len() - 1
    }

    /// term of the last entry, 0 when empty
    pub fn last_term(&self) -> Term {
        self.entries.last().map(|e| e.term).unwrap_or(0)
    }

    pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
        if index < 0 {
            return None;
        }
        self.entries.get(index as usize)
    }

    /// term stored at `index`; `NO_INDEX` maps to term 0
    pub fn term_at(&self, index: LogIndex) -> Option<Term> {
        if index == NO_INDEX {
            return Some(0);
        }
        self.get(index).map(|e| e.term)
    }

    /// append a new command at the tail and return the created entry
    pub fn append(&mut self, term: Term, command: Vec<u8>) -> &LogEntry {
        let index = self.len();
        self.entries.push(LogEntry::new(term, index, command));
        &self.entries[index as usize]
    }

    /// drop every entry at `index` and after
    pub fn truncate_from(&mut self, index: LogIndex) {
        self.entries.truncate(index.max(0) as usize);
    }

    /// clone of the entries from `index` to the end
    pub fn entries_from(&self, index: LogIndex) -> Vec<LogEntry> {
        let start = (index.max(0) as usize).min(self.entries.len());
        self.entries[start..].to_vec()
    }

    /// borrowed inclusive range `[from, to]`, clamped to the log
    pub fn slice(&self, from: LogIndex, to: LogIndex) -> &[LogEntry] {
        let start = (from.max(0) as usize).min(self.entries.len());
        let end = ((to + 1).max(0) as usize).min(self.entries.len());
        if start >= end {
            return &[];
        }
        &self.entries[start..end]
    }

    /// consistency check anchor for AppendEntries
    pub fn matches(&self, prev_log_index: LogIndex, prev_log_term: Term) -> bool {
        self.term_at(prev_log_index) == Some(prev_log_term)
    }

    /// is a candidate's log at least as up to date as ours
    ///
    /// compares last-entry term first and only on a tie the last index.
    pub fn is_up_to_date(&self, last_log_term: Term, last_log_index: LogIndex) -> bool {
        (last_log_term, last_log_index) >= (self.last_term(), self.last_index())
    }

    /// merge entries from a leader after a successful consistency check
    ///
    /// entries already present with the same term are left alone, the first
    /// conflicting one truncates the rest of the log. returns the lowest
    /// index that changed, if any.
    pub fn merge(&mut self, entries: Vec<LogEntry>) -> Option<LogIndex> {
        let mut changed_from = None;
        for entry in entries {
            match self.term_at(entry.index) {
                Some(term) if term == entry.term => continue,
                Some(_) => {
                    self.truncate_from(entry.index);
                    changed_from.get_or_insert(entry.index);
                }
                None => {
                    if entry.index != self.len() {
                        // gap, the consistency check should have prevented this
                        break;
                    }
                    changed_from.get_or_insert(entry.index);
                }
            }
            self.entries.push(entry);
        }
        changed_from
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}
