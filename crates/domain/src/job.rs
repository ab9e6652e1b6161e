//! Backend jobs and their state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Which backend family runs a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Submit-and-poll predictions API
    Hosted,
    /// Node-graph engine
    Local,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hosted => "hosted",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hosted" | "replicate" => Ok(Self::Hosted),
            "local" | "comfyui" => Ok(Self::Local),
            other => Err(DomainError::parse(format!("Unknown backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }
}

/// A unit of work submitted to one backend.
///
/// Created at submission; only polling moves it forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: String,
    backend: BackendKind,
    state: JobState,
}

impl Job {
    pub fn submitted(id: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            id: id.into(),
            backend,
            state: JobState::Queued,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Move to `next`. Repeating a non-terminal state is allowed (a poll that
    /// sees no change); leaving a terminal state is not.
    pub fn transition(&mut self, next: JobState) -> Result<(), DomainError> {
        if self.state.is_terminal() {
            return Err(DomainError::invalid_state_transition(format!(
                "job {} is already {:?}, cannot become {:?}",
                self.id, self.state, next
            )));
        }
        if self.state == JobState::Processing && next == JobState::Queued {
            return Err(DomainError::invalid_state_transition(format!(
                "job {} cannot return to queued",
                self.id
            )));
        }
        self.state = next;
        Ok(())
    }
}
