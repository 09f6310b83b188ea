//! Per-invocation progress of a sync operation. Nothing here is persisted.

use crate::models::SyncResult;
use crate::utils::errors::Result;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    ManifestFetched,
    DataDecided,
    AssetsDecided,
    ManifestCommitted,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    /// Phases only move forward one step at a time. Any live phase may end
    /// in `Done` (early exit, e.g. legacy fallback) or `Failed`.
    pub fn can_advance_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Phase::Done | Phase::Failed => true,
            Phase::Idle => false,
            _ => next as u8 == self as u8 + 1,
        }
    }
}

/// Tracks one invocation and turns its outcome into a [`SyncResult`].
pub(crate) struct Run {
    operation: &'static str,
    phase: Phase,
}

impl Run {
    pub fn start(operation: &'static str) -> Self {
        debug!("{}: started", operation);
        Self {
            operation,
            phase: Phase::Idle,
        }
    }

    pub fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "{}: illegal transition {:?} -> {:?}",
            self.operation,
            self.phase,
            next
        );
        debug!("{}: {:?} -> {:?}", self.operation, self.phase, next);
        self.phase = next;
    }

    /// Local persistence failures are returned as `Err`; every other error
    /// becomes a failed result naming the operation.
    pub fn finish(mut self, outcome: Result<SyncResult>) -> Result<SyncResult> {
        match outcome {
            Ok(result) => {
                self.advance(Phase::Done);
                info!("{}: {}", self.operation, result.message);
                Ok(result)
            }
            Err(e) => {
                error!("{} failed after {:?}: {}", self.operation, self.phase, e);
                self.advance(Phase::Failed);
                if e.is_unrecoverable() {
                    Err(e)
                } else {
                    Ok(SyncResult::from_error(self.operation, &e))
                }
            }
        }
    }
}
