//! Review run orchestration.
//!
//! Every CLI command is one stateless step over the persisted run:
//! `init → explore → plan → run → ingest* → verdict`, then optionally
//! `handoff`, `merge` and `cleanup`. Steps check their own preconditions
//! against the stored artifacts, so they can be invoked in separate
//! processes.

mod closing;
mod ingest;
pub mod requests;
pub mod state;
mod workflow;

pub use closing::{CleanupOptions, CleanupOutcome, MergeOutcome};
pub use ingest::{IngestOptions, IngestOutcome, ParticipantRow, StatusSnapshot};
pub use state::{Branches, Run, RunStatus, RunStore};
pub use workflow::{ExploreKind, ExploreOutcome, InitOptions, PlanOutcome, RunOutcome, Workflow};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::ReviewError;

/// Shared interrupt flag, set from the Ctrl-C handler and observed by the
/// workflow between phases.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`ReviewError::Aborted`] once cancellation was requested.
    pub fn checkpoint(&self, phase: &str) -> Result<(), ReviewError> {
        if self.is_cancelled() {
            tracing::warn!(phase, "interrupted at checkpoint");
            return Err(ReviewError::Aborted);
        }
        Ok(())
    }
}
