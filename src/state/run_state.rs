use crate::state::RunPhase;
use crate::storage::{MergeStats, RecordSet};
use crate::ScrapeError;

/// Counters accumulated over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    /// Pages that were fetched, extracted and persisted
    pub pages_completed: u32,

    /// Pages skipped because their fetch failed
    pub pages_failed: u32,

    /// Rows dropped by the extractor
    pub records_dropped: usize,

    pub covers_downloaded: usize,
    pub covers_failed: usize,

    /// Rows inserted into the record set
    pub inserted: usize,

    /// Existing rows that gained at least one field
    pub updated: usize,
}

impl RunCounts {
    /// Page, record and cover failures combined
    pub fn errors(&self) -> usize {
        self.pages_failed as usize + self.records_dropped + self.covers_failed
    }

    pub fn add_merge(&mut self, stats: MergeStats) {
        self.inserted += stats.inserted;
        self.updated += stats.updated;
    }
}

/// Everything the coordinator tracks while a run is in progress
///
/// The record set starts as whatever the output file held and grows page by
/// page; it is the value written back to disk after every page.
#[derive(Debug)]
pub struct RunState {
    phase: RunPhase,

    /// Page currently being processed, if any
    pub current_page: Option<u32>,

    pub records: RecordSet,
    pub counts: RunCounts,
}

impl RunState {
    /// Creates an idle run state over previously stored records
    pub fn new(records: RecordSet) -> Self {
        Self {
            phase: RunPhase::Idle,
            current_page: None,
            records,
            counts: RunCounts::default(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Moves to `next`, rejecting moves the phase graph does not allow
    pub fn transition(&mut self, next: RunPhase) -> crate::Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(ScrapeError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!("Run phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }
}
