//! Hosted submit-and-poll backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use transmute_domain::{
    BackendKind, BackendParameters, GenerationRequest, Job, JobState, ModelRef, TransmuteMode,
};

use super::{
    BackendOutput, GenerationBackend, LifecyclePhase, PollPolicy, RequestLifecycle, Resolution,
};
use crate::infrastructure::ports::{GenerationError, PredictionsPort};

/// Runs generations as predictions on a hosted API.
pub struct HostedBackend {
    api: Arc<dyn PredictionsPort>,
    model: ModelRef,
    poll: PollPolicy,
}

impl HostedBackend {
    pub fn new(api: Arc<dyn PredictionsPort>, model: ModelRef, poll: PollPolicy) -> Self {
        Self { api, model, poll }
    }

    /// Prediction input object. Image fields travel as the caller sent them;
    /// the API accepts both data URIs and URLs.
    pub fn build_input(request: &GenerationRequest, params: &BackendParameters) -> Value {
        let mut input = json!({
            "prompt": params.prompt,
            "negative_prompt": params.negative_prompt,
            "prompt_strength": params.strength,
            "guidance_scale": params.guidance_scale,
            "num_inference_steps": params.steps,
            "scheduler": params.scheduler,
        });
        if let Value::Object(fields) = &mut input {
            if let Some(image) = request.primary_image() {
                fields.insert("image".to_string(), json!(image.as_str()));
            }
            if request.mode == TransmuteMode::Inpaint {
                if let Some(mask) = request.mask.as_ref().filter(|_| request.has_mask()) {
                    fields.insert("mask".to_string(), json!(mask.as_str()));
                }
            }
            if let Some(seed) = request.seed {
                fields.insert("seed".to_string(), json!(seed));
            }
        }
        input
    }
}

#[async_trait]
impl GenerationBackend for HostedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hosted
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        params: &BackendParameters,
        lifecycle: &mut RequestLifecycle,
    ) -> Result<BackendOutput, GenerationError> {
        lifecycle.advance(LifecyclePhase::Submitting)?;
        let input = Self::build_input(request, params);
        let started = Instant::now();

        let prediction = self.api.create_prediction(&self.model, input).await?;
        let mut job = Job::submitted(prediction.id.clone(), BackendKind::Hosted);
        tracing::info!(
            prediction_id = %job.id(),
            model = %self.model,
            mode = %request.mode,
            "Prediction submitted"
        );

        let mut resolution = Resolution::from_prediction(&prediction);
        let mut attempts: u32 = 0;
        loop {
            match resolution {
                Resolution::Succeeded(image_url) => {
                    job.transition(JobState::Succeeded)?;
                    tracing::info!(
                        prediction_id = %job.id(),
                        polls = attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Prediction succeeded"
                    );
                    return Ok(BackendOutput { job, image_url });
                }
                Resolution::Failed(reason) => {
                    job.transition(JobState::Failed)?;
                    tracing::warn!(prediction_id = %job.id(), reason = %reason, "Prediction failed");
                    return Err(GenerationError::GenerationFailed(reason));
                }
                Resolution::Pending => {}
            }

            job.transition(JobState::Processing)?;
            lifecycle.advance(LifecyclePhase::Polling)?;
            if !self.poll.allows(attempts, started.elapsed()) {
                job.transition(JobState::TimedOut)?;
                let elapsed_secs = started.elapsed().as_secs();
                tracing::warn!(
                    prediction_id = %job.id(),
                    polls = attempts,
                    elapsed_secs,
                    "Prediction polling gave up"
                );
                return Err(GenerationError::GenerationTimedOut { elapsed_secs });
            }

            sleep(self.poll.interval).await;
            attempts += 1;
            lifecycle.report_progress(started.elapsed().as_secs());

            let snapshot = self.api.get_prediction(job.id()).await?;
            resolution = Resolution::from_prediction(&snapshot);
        }
    }

    async fn check_health(&self) -> bool {
        match self.api.check_health().await {
            Ok(healthy) => healthy,
            Err(e) => {
                tracing::warn!(error = %e, "Predictions API health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{MockPredictionsPort, Prediction};
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::time::Duration;
    use transmute_domain::{map_parameters, ImageRef, MappingInput};

    fn prediction(status: &str, output: Value, error: Value) -> Prediction {
        serde_json::from_value(json!({
            "id": "pred-1",
            "status": status,
            "output": output,
            "error": error,
        }))
        .expect("valid prediction")
    }

    fn image() -> ImageRef {
        ImageRef::new("data:image/png;base64,iVBORw0KGgo=").expect("valid ref")
    }

    fn params_for(request: &GenerationRequest) -> BackendParameters {
        map_parameters(MappingInput {
            mode: request.mode,
            creativity: request.creativity,
            chaos: request.chaos,
            prompt_override: request.prompt.as_deref(),
            source_count: request.source_images.len(),
            has_mask: request.has_mask(),
        })
        .expect("valid mapping")
    }

    fn backend(api: MockPredictionsPort) -> HostedBackend {
        HostedBackend::new(
            Arc::new(api),
            "stability-ai/sdxl:abc".parse().expect("valid model"),
            PollPolicy::hosted_default(),
        )
    }

    fn mapping_lifecycle() -> RequestLifecycle {
        let mut lifecycle = RequestLifecycle::new();
        lifecycle
            .advance(LifecyclePhase::Mapping)
            .expect("idle -> mapping");
        lifecycle
    }

    #[test]
    fn input_carries_mapped_parameters_and_source() {
        let request = GenerationRequest::new(TransmuteMode::Remix, vec![image()])
            .with_sliders(50.0, 30.0)
            .with_seed(7);
        let input = HostedBackend::build_input(&request, &params_for(&request));

        assert_eq!(input["prompt_strength"], 0.5);
        assert_eq!(input["guidance_scale"], 9.0);
        assert_eq!(input["num_inference_steps"], 30);
        assert_eq!(input["scheduler"], "K_EULER");
        assert_eq!(input["image"], image().as_str());
        assert_eq!(input["seed"], 7);
        assert!(input.get("mask").is_none());
    }

    #[test]
    fn text_to_image_input_has_no_image() {
        let request = GenerationRequest::new(TransmuteMode::Remix, vec![]).with_prompt("owl");
        let input = HostedBackend::build_input(&request, &params_for(&request));
        assert!(input.get("image").is_none());
        assert_eq!(input["prompt"], "owl");
    }

    #[test]
    fn inpaint_input_includes_mask() {
        let mask = ImageRef::new("data:image/png;base64,AAAA").expect("valid mask");
        let request = GenerationRequest::new(TransmuteMode::Inpaint, vec![image()])
            .with_mask(mask.clone());
        let input = HostedBackend::build_input(&request, &params_for(&request));
        assert_eq!(input["mask"], mask.as_str());
        assert_eq!(input["prompt_strength"], 0.8);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_skips_polling() {
        let mut api = MockPredictionsPort::new();
        api.expect_create_prediction().times(1).returning(|_, _| {
            Ok(prediction("succeeded", json!(["https://cdn/out.png"]), Value::Null))
        });
        api.expect_get_prediction().never();

        let request = GenerationRequest::new(TransmuteMode::Style, vec![image()]);
        let mut lifecycle = mapping_lifecycle();
        let output = backend(api)
            .generate(&request, &params_for(&request), &mut lifecycle)
            .await
            .expect("success");

        assert_eq!(output.image_url, "https://cdn/out.png");
        assert_eq!(output.job.state(), JobState::Succeeded);
        assert_eq!(output.job.id(), "pred-1");
        assert_eq!(lifecycle.phase(), LifecyclePhase::Submitting);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_success() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let mut api = MockPredictionsPort::new();
        api.expect_create_prediction()
            .returning(|_, _| Ok(prediction("starting", Value::Null, Value::Null)));
        api.expect_get_prediction().times(3).returning(move |id| {
            assert_eq!(id, "pred-1");
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(prediction("processing", Value::Null, Value::Null))
            } else {
                Ok(prediction("succeeded", json!("https://cdn/final.png"), Value::Null))
            }
        });

        let progress = Arc::new(AtomicU64::new(0));
        let sink = progress.clone();
        let mut lifecycle = mapping_lifecycle()
            .with_progress(Arc::new(move |secs| sink.store(secs, Ordering::SeqCst)));
        let request = GenerationRequest::new(TransmuteMode::Remix, vec![image()]);
        let output = backend(api)
            .generate(&request, &params_for(&request), &mut lifecycle)
            .await
            .expect("success");

        assert_eq!(output.image_url, "https://cdn/final.png");
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(progress.load(Ordering::SeqCst), 3);
        assert_eq!(lifecycle.phase(), LifecyclePhase::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_during_polling_carries_upstream_error() {
        let mut api = MockPredictionsPort::new();
        api.expect_create_prediction()
            .returning(|_, _| Ok(prediction("processing", Value::Null, Value::Null)));
        api.expect_get_prediction()
            .times(1)
            .returning(|_| Ok(prediction("failed", Value::Null, json!("NSFW content detected"))));

        let request = GenerationRequest::new(TransmuteMode::Style, vec![image()]);
        let err = backend(api)
            .generate(&request, &params_for(&request), &mut mapping_lifecycle())
            .await
            .expect_err("prediction failed");

        assert_eq!(
            err,
            GenerationError::GenerationFailed("NSFW content detected".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_at_submission_is_reported_without_polling() {
        let mut api = MockPredictionsPort::new();
        api.expect_create_prediction()
            .returning(|_, _| Ok(prediction("failed", Value::Null, json!("bad input"))));
        api.expect_get_prediction().never();

        let request = GenerationRequest::new(TransmuteMode::Style, vec![image()]);
        let err = backend(api)
            .generate(&request, &params_for(&request), &mut mapping_lifecycle())
            .await
            .expect_err("prediction failed");
        assert_eq!(err, GenerationError::GenerationFailed("bad input".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_sixty_polls() {
        let mut api = MockPredictionsPort::new();
        api.expect_create_prediction()
            .returning(|_, _| Ok(prediction("starting", Value::Null, Value::Null)));
        api.expect_get_prediction()
            .times(60)
            .returning(|_| Ok(prediction("processing", Value::Null, Value::Null)));

        let request = GenerationRequest::new(TransmuteMode::Mashup, vec![image()]);
        let err = backend(api)
            .generate(&request, &params_for(&request), &mut mapping_lifecycle())
            .await
            .expect_err("never finishes");

        match err {
            GenerationError::GenerationTimedOut { elapsed_secs } => assert_eq!(elapsed_secs, 60),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_submission_propagates() {
        let mut api = MockPredictionsPort::new();
        api.expect_create_prediction().returning(|_, _| {
            Err(GenerationError::UpstreamRejected {
                status: 422,
                message: "invalid version".to_string(),
            })
        });

        let request = GenerationRequest::new(TransmuteMode::Style, vec![image()]);
        let err = backend(api)
            .generate(&request, &params_for(&request), &mut mapping_lifecycle())
            .await
            .expect_err("rejected");
        assert!(matches!(err, GenerationError::UpstreamRejected { status: 422, .. }));
    }

    #[tokio::test]
    async fn health_errors_count_as_unhealthy() {
        let mut api = MockPredictionsPort::new();
        api.expect_check_health()
            .returning(|| Err(GenerationError::transport("refused")));
        assert!(!backend(api).check_health().await);
    }

    #[test]
    fn poll_interval_is_one_second() {
        assert_eq!(PollPolicy::hosted_default().interval, Duration::from_secs(1));
    }
}
