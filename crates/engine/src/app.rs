//! Application state and composition.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use transmute_domain::BackendKind;

use crate::infrastructure::{
    clock::{SystemClock, SystemRandom},
    comfyui::ComfyUIClient,
    config::AppConfig,
    ports::{ClockPort, RandomPort},
    replicate::ReplicateClient,
    source_images::SourceImageLoader,
};
use crate::use_cases::generation::{
    GenerationBackend, HostedBackend, LocalBackend, PollLimit, PollPolicy,
};
use crate::use_cases::TransmuteImage;

/// Main application state.
///
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub transmute: TransmuteImage,
}

impl App {
    pub fn new(transmute: TransmuteImage) -> Self {
        Self { transmute }
    }

    /// Wire the configured backend and its adapters.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock);
        let random: Arc<dyn RandomPort> = Arc::new(SystemRandom);

        let backend: Arc<dyn GenerationBackend> = match config.backend {
            BackendKind::Hosted => {
                let token = config
                    .hosted
                    .api_token
                    .as_deref()
                    .context("REPLICATE_API_TOKEN is required for the hosted backend")?;
                let client = ReplicateClient::new(
                    &config.hosted.base_url,
                    token,
                    Duration::from_secs(config.hosted.request_timeout_secs),
                );
                let poll = PollPolicy {
                    interval: config.hosted.poll_interval(),
                    limit: PollLimit::Attempts(config.hosted.max_poll_attempts),
                };
                tracing::info!(
                    base_url = %config.hosted.base_url,
                    model = %config.hosted.model,
                    "Using hosted predictions backend"
                );
                Arc::new(HostedBackend::new(
                    Arc::new(client),
                    config.hosted_model()?,
                    poll,
                ))
            }
            BackendKind::Local => {
                let client =
                    ComfyUIClient::new(&config.local.base_url, &config.local.public_base_url);
                let sources = SourceImageLoader::new(
                    Duration::from_secs(config.sources.fetch_timeout_secs),
                    config.sources.max_bytes,
                );
                let poll = PollPolicy {
                    interval: config.local.poll_interval(),
                    limit: PollLimit::WallClock(config.local.timeout()),
                };
                tracing::info!(
                    base_url = %config.local.base_url,
                    checkpoint = %config.local.checkpoint,
                    "Using local node-graph backend"
                );
                Arc::new(LocalBackend::new(
                    Arc::new(client),
                    Arc::new(sources),
                    random.clone(),
                    config.graph_settings(),
                    poll,
                ))
            }
        };

        Ok(Self::new(TransmuteImage::new(backend, clock, random)))
    }
}
