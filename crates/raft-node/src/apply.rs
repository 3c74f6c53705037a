//! # apply
//!
//! why: hand committed entries to the application exactly once, in log order
//! relations: driven by runner.rs whenever the commit index moves
//! what: StateMachine trait, ApplyError, ApplyPipeline, LoggingStateMachine

use raft_core::{LogEntry, LogIndex, NO_INDEX};
use thiserror::Error;
use tracing::{info, warn};

/// The application's view of a committed entry
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ApplyError(pub String);

impl ApplyError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Downstream consumer of committed commands
///
/// called from the runner task, so an implementation should not block for long.
pub trait StateMachine: Send + 'static {
    fn apply(&mut self, entry: &LogEntry) -> Result<(), ApplyError>;
}

/// Delivers entries to the state machine with strictly increasing indices
pub struct ApplyPipeline {
    machine: Box<dyn StateMachine>,
    last_delivered: LogIndex,
}

impl ApplyPipeline {
    pub fn new(machine: Box<dyn StateMachine>) -> Self {
        Self {
            machine,
            last_delivered: NO_INDEX,
        }
    }

    pub fn last_delivered(&self) -> LogIndex {
        self.last_delivered
    }

    /// Deliver one entry; `None` when it was already delivered
    ///
    /// a failing apply still counts as delivered, the error goes to whoever proposed it.
    pub fn deliver(&mut self, entry: &LogEntry) -> Option<Result<(), ApplyError>> {
        if entry.index <= self.last_delivered {
            return None;
        }
        let outcome = self.machine.apply(entry);
        if let Err(e) = &outcome {
            warn!(index = entry.index, term = entry.term, error = %e, "state machine rejected entry");
        }
        self.last_delivered = entry.index;
        Some(outcome)
    }
}

/// Stand-in machine for a bare node: logs every applied command
#[derive(Debug, Default)]
pub struct LoggingStateMachine {
    applied: u64,
}

impl LoggingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }
}

impl StateMachine for LoggingStateMachine {
    fn apply(&mut self, entry: &LogEntry) -> Result<(), ApplyError> {
        self.applied += 1;
        info!(
            index = entry.index,
            term = entry.term,
            command = %String::from_utf8_lossy(&entry.command),
            "applied"
        );
        Ok(())
    }
}
