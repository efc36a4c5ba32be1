/// Run phase definitions for tracking scrape progress
///
/// This module defines every phase a scrape run moves through and the legal
/// moves between them.
use std::fmt;

/// Represents the current phase of a scrape run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    // ===== Initial State =====
    /// Run has been set up but no page has been requested
    Idle,

    // ===== Active State =====
    /// Pages are being fetched, extracted and merged
    Running,

    // ===== Outcome States =====
    /// The user asked the run to stop
    Interrupted,

    /// The page range was exhausted or the list ran out of pages
    Completed,

    /// A fatal storage error ended the run
    Failed,

    // ===== Closing States =====
    /// The final persist and summary are being produced
    Finalizing,

    /// Nothing more will happen
    Done,
}

impl RunPhase {
    /// Returns true for the three ways a running scrape can end
    pub fn is_outcome(&self) -> bool {
        matches!(self, Self::Interrupted | Self::Completed | Self::Failed)
    }

    /// Returns true if moving from this phase to `next` is allowed
    ///
    /// The only paths are `Idle -> Running -> outcome -> Finalizing -> Done`,
    /// plus `Idle -> Failed` for runs that cannot start.
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        match (self, next) {
            (Self::Idle, Self::Running) | (Self::Idle, Self::Failed) => true,
            (Self::Running, n) => n.is_outcome(),
            (s, Self::Finalizing) => s.is_outcome(),
            (Self::Finalizing, Self::Done) => true,
            _ => false,
        }
    }

    /// Lowercase name used in logs and the run summary
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Interrupted => "interrupted",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
