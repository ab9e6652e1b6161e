//! Generation backends.
//!
//! Both backends take the same mapped request and produce the same output,
//! so the orchestrator never branches on which one is configured.

mod hosted;
mod lifecycle;
mod local;
mod resolution;

use std::time::Duration;

use async_trait::async_trait;
use transmute_domain::{BackendKind, BackendParameters, GenerationRequest, Job};

use crate::infrastructure::ports::GenerationError;

pub use hosted::HostedBackend;
pub use lifecycle::{LifecyclePhase, ProgressCallback, RequestLifecycle};
pub use local::LocalBackend;
pub use resolution::{output_url, Resolution};

/// What a backend hands back on success.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendOutput {
    /// Terminal job record
    pub job: Job,
    pub image_url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Run one request to completion.
    ///
    /// The lifecycle arrives in `Mapping`; the backend moves it through
    /// submission and polling. Terminal phases are set by the caller.
    async fn generate(
        &self,
        request: &GenerationRequest,
        params: &BackendParameters,
        lifecycle: &mut RequestLifecycle,
    ) -> Result<BackendOutput, GenerationError>;

    async fn check_health(&self) -> bool;
}

/// When polling gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollLimit {
    /// Stop after this many polls
    Attempts(u32),
    /// Stop once this much time has passed since submission
    WallClock(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub limit: PollLimit,
}

impl PollPolicy {
    /// 60 polls, one second apart.
    pub fn hosted_default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            limit: PollLimit::Attempts(60),
        }
    }

    /// Every 1.5 s for at most five minutes.
    pub fn local_default() -> Self {
        Self {
            interval: Duration::from_millis(1500),
            limit: PollLimit::WallClock(Duration::from_secs(300)),
        }
    }

    /// Time left before a wall-clock limit expires; `None` for attempt limits.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        match self.limit {
            PollLimit::Attempts(_) => None,
            PollLimit::WallClock(ceiling) => Some(ceiling.saturating_sub(elapsed)),
        }
    }

    /// Whether another poll is allowed after `attempts` polls and `elapsed` time.
    pub fn allows(&self, attempts: u32, elapsed: Duration) -> bool {
        match self.limit {
            PollLimit::Attempts(max) => attempts < max,
            PollLimit::WallClock(ceiling) => elapsed < ceiling,
        }
    }
}
