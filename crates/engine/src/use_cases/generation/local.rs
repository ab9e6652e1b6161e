//! Local node-graph engine backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use transmute_domain::{
    build_graph, BackendKind, BackendParameters, GenerationRequest, GraphSettings, GraphSpec,
    ImageRef, Job, JobState, TransmuteMode,
};

use super::{
    BackendOutput, GenerationBackend, LifecyclePhase, PollPolicy, RequestLifecycle, Resolution,
};
use crate::infrastructure::ports::{
    GenerationError, ImageUpload, NodeGraphPort, RandomPort, SourceImagePort,
};
use crate::infrastructure::source_images::upload_filename;

/// Runs generations as explicit compute graphs on a local engine.
pub struct LocalBackend {
    engine: Arc<dyn NodeGraphPort>,
    sources: Arc<dyn SourceImagePort>,
    random: Arc<dyn RandomPort>,
    settings: GraphSettings,
    poll: PollPolicy,
}

impl LocalBackend {
    pub fn new(
        engine: Arc<dyn NodeGraphPort>,
        sources: Arc<dyn SourceImagePort>,
        random: Arc<dyn RandomPort>,
        settings: GraphSettings,
        poll: PollPolicy,
    ) -> Self {
        Self {
            engine,
            sources,
            random,
            settings,
            poll,
        }
    }

    /// Mark the job timed out; the returned error is what the caller reports.
    fn give_up(
        &self,
        job: &mut Job,
        attempts: u32,
        started: Instant,
    ) -> Result<GenerationError, GenerationError> {
        job.transition(JobState::TimedOut)?;
        let elapsed_secs = started.elapsed().as_secs();
        tracing::warn!(
            prompt_id = %job.id(),
            polls = attempts,
            elapsed_secs,
            "Workflow polling gave up"
        );
        Ok(GenerationError::GenerationTimedOut { elapsed_secs })
    }

    /// Push one image into the engine; returns the name loader nodes use.
    async fn upload(&self, image: &ImageRef, role: &'static str) -> Result<String, GenerationError> {
        let source = self.sources.load(image).await?;
        let filename = upload_filename(&source.bytes, &source.content_type);
        tracing::debug!(role, filename = %filename, source = %image.summary(), "Uploading asset");

        let asset = self
            .engine
            .upload_image(ImageUpload {
                filename,
                content_type: source.content_type,
                bytes: source.bytes,
            })
            .await?;
        Ok(asset.graph_name())
    }
}

#[async_trait]
impl GenerationBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        params: &BackendParameters,
        lifecycle: &mut RequestLifecycle,
    ) -> Result<BackendOutput, GenerationError> {
        lifecycle.advance(LifecyclePhase::GraphBuilding)?;

        let asset = match request.primary_image() {
            Some(image) => Some(self.upload(image, "source").await?),
            None => None,
        };
        let mask_asset = match (&request.mask, request.mode) {
            (Some(mask), TransmuteMode::Inpaint) if request.has_mask() => {
                Some(self.upload(mask, "mask").await?)
            }
            _ => None,
        };

        let graph = build_graph(
            &GraphSpec {
                asset: asset.as_deref(),
                mask_asset: mask_asset.as_deref(),
                positive: &params.prompt,
                negative: &params.negative_prompt,
                strength: params.strength,
                guidance_scale: params.guidance_scale,
                steps: params.steps,
                seed: request.seed,
                settings: &self.settings,
            },
            || self.random.gen_seed(),
        );
        tracing::debug!(
            nodes = graph.len(),
            image_to_image = asset.is_some(),
            masked = mask_asset.is_some(),
            "Compute graph built"
        );

        lifecycle.advance(LifecyclePhase::Submitting)?;
        let started = Instant::now();
        let prompt_id = self.engine.queue_prompt(graph.to_workflow()).await?;
        let mut job = Job::submitted(prompt_id.clone(), BackendKind::Local);
        tracing::info!(prompt_id = %job.id(), mode = %request.mode, "Workflow queued");

        job.transition(JobState::Processing)?;
        lifecycle.advance(LifecyclePhase::Polling)?;
        // Wall-clock limits also bound each in-flight history request.
        let deadline = self
            .poll
            .remaining(Duration::ZERO)
            .map(|budget| started + budget);
        let mut attempts: u32 = 0;
        loop {
            if !self.poll.allows(attempts, started.elapsed()) {
                return Err(self.give_up(&mut job, attempts, started)?);
            }

            match deadline {
                Some(deadline) => {
                    sleep_until(deadline.min(Instant::now() + self.poll.interval)).await
                }
                None => sleep(self.poll.interval).await,
            }
            if !self.poll.allows(attempts, started.elapsed()) {
                return Err(self.give_up(&mut job, attempts, started)?);
            }
            attempts += 1;
            lifecycle.report_progress(started.elapsed().as_secs());

            let poll = self.engine.get_history(&prompt_id);
            let history = match deadline {
                Some(deadline) => match timeout_at(deadline, poll).await {
                    Ok(history) => history?,
                    Err(_) => return Err(self.give_up(&mut job, attempts, started)?),
                },
                None => poll.await?,
            };
            let resolution =
                Resolution::from_history(history.as_ref(), |image| self.engine.view_url(image))?;
            match resolution {
                Resolution::Pending => continue,
                Resolution::Succeeded(image_url) => {
                    job.transition(JobState::Succeeded)?;
                    tracing::info!(
                        prompt_id = %job.id(),
                        polls = attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Workflow finished"
                    );
                    return Ok(BackendOutput { job, image_url });
                }
                Resolution::Failed(reason) => {
                    job.transition(JobState::Failed)?;
                    tracing::warn!(prompt_id = %job.id(), reason = %reason, "Workflow failed");
                    return Err(GenerationError::GenerationFailed(reason));
                }
            }
        }
    }

    async fn check_health(&self) -> bool {
        match self.engine.check_health().await {
            Ok(healthy) => healthy,
            Err(e) => {
                tracing::warn!(error = %e, "Node-graph engine health check failed");
                false
            }
        }
    }
}
