//! Per-request lifecycle tracking.

use std::fmt;
use std::sync::Arc;

use transmute_domain::DomainError;

/// Receives the seconds elapsed since submission on every poll tick.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Idle,
    Mapping,
    /// Local backend only
    GraphBuilding,
    Submitting,
    Polling,
    Resolved,
    Failed,
    TimedOut,
}

impl LifecyclePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Failed | Self::TimedOut)
    }

    fn can_move_to(self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Idle, Mapping)
            | (Mapping, GraphBuilding)
            | (Mapping, Submitting)
            | (GraphBuilding, Submitting)
            | (Submitting, Polling)
            | (Submitting, Resolved)
            | (Polling, Polling)
            | (Polling, Resolved)
            | (Polling, TimedOut) => true,
            _ => false,
        }
    }
}

/// Phase tracker for one request; refuses backwards and skipped moves.
pub struct RequestLifecycle {
    phase: LifecyclePhase,
    history: Vec<LifecyclePhase>,
    progress: Option<ProgressCallback>,
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self {
            phase: LifecyclePhase::Idle,
            history: vec![LifecyclePhase::Idle],
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Every phase entered so far, in order (repeats collapsed).
    pub fn history(&self) -> &[LifecyclePhase] {
        &self.history
    }

    pub fn advance(&mut self, next: LifecyclePhase) -> Result<(), DomainError> {
        if !self.phase.can_move_to(next) {
            return Err(DomainError::invalid_state_transition(format!(
                "request lifecycle cannot move from {:?} to {:?}",
                self.phase, next
            )));
        }
        if self.phase != next {
            tracing::trace!(from = ?self.phase, to = ?next, "Lifecycle phase change");
            self.history.push(next);
        }
        self.phase = next;
        Ok(())
    }

    pub fn report_progress(&self, elapsed_secs: u64) {
        if let Some(callback) = &self.progress {
            callback(elapsed_secs);
        }
    }
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLifecycle")
            .field("phase", &self.phase)
            .field("history", &self.history)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
