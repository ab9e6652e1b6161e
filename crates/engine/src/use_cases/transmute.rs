//! Transmute use case - turns one UI request into one finished image.

use std::sync::Arc;

use tracing::Instrument;
use transmute_domain::{
    map_parameters, BackendKind, GeneratedResult, GenerationRequest, MappingInput, TransmuteMode,
};

use crate::infrastructure::correlation::CorrelationId;
use crate::infrastructure::ports::{ClockPort, GenerationError, RandomPort};
use crate::use_cases::generation::{
    BackendOutput, GenerationBackend, LifecyclePhase, ProgressCallback, RequestLifecycle,
};

/// Range of the display number handed back with every finished piece.
const TRANSMISSION_NUMBER_MIN: i32 = 1000;
const TRANSMISSION_NUMBER_MAX: i32 = 9999;

/// A finished generation plus its display number.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmuteOutcome {
    pub result: GeneratedResult,
    pub transmission_number: u32,
}

/// Validates, maps and dispatches a request to the configured backend.
///
/// One backend job per call. Nothing is retried; the caller decides what to
/// do with a retryable error.
pub struct TransmuteImage {
    backend: Arc<dyn GenerationBackend>,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
}

impl TransmuteImage {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        Self {
            backend,
            clock,
            random,
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub async fn check_backend_health(&self) -> bool {
        self.backend.check_health().await
    }

    pub async fn execute(
        &self,
        request: GenerationRequest,
        correlation_id: CorrelationId,
    ) -> Result<TransmuteOutcome, GenerationError> {
        self.execute_with_progress(request, correlation_id, None)
            .await
    }

    /// Like [`Self::execute`], reporting elapsed seconds on every poll.
    pub async fn execute_with_progress(
        &self,
        request: GenerationRequest,
        correlation_id: CorrelationId,
        progress: Option<ProgressCallback>,
    ) -> Result<TransmuteOutcome, GenerationError> {
        let span = tracing::info_span!(
            "transmute",
            correlation_id = %correlation_id.short(),
            mode = %request.mode,
            backend = %self.backend.kind(),
        );
        self.run(request, progress).instrument(span).await
    }

    async fn run(
        &self,
        request: GenerationRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<TransmuteOutcome, GenerationError> {
        let mut lifecycle = match progress {
            Some(callback) => RequestLifecycle::new().with_progress(callback),
            None => RequestLifecycle::new(),
        };
        lifecycle.advance(LifecyclePhase::Mapping)?;
        tracing::info!(
            sources = request.source_images.len(),
            creativity = request.creativity,
            chaos = request.chaos,
            "Transmute requested"
        );

        match self.dispatch(&request, &mut lifecycle).await {
            Ok(output) => {
                lifecycle.advance(LifecyclePhase::Resolved)?;
                let transmission_number = u32::try_from(
                    self.random
                        .gen_range(TRANSMISSION_NUMBER_MIN, TRANSMISSION_NUMBER_MAX),
                )
                .unwrap_or(TRANSMISSION_NUMBER_MIN as u32);
                let result = GeneratedResult::new(
                    output.job.id(),
                    output.image_url,
                    request.mode,
                    request.source_images,
                    self.clock.now(),
                );
                tracing::info!(
                    job_id = %result.job_id,
                    transmission_number,
                    "Transmute resolved"
                );
                Ok(TransmuteOutcome {
                    result,
                    transmission_number,
                })
            }
            Err(err) => {
                let failed_in = lifecycle.phase();
                let terminal = match err {
                    GenerationError::GenerationTimedOut { .. } => LifecyclePhase::TimedOut,
                    _ => LifecyclePhase::Failed,
                };
                if let Err(transition) = lifecycle.advance(terminal) {
                    tracing::error!(error = %transition, "Lifecycle out of order");
                }
                tracing::warn!(
                    error = %err,
                    retryable = err.is_retryable(),
                    phase = ?failed_in,
                    "Transmute failed"
                );
                Err(err)
            }
        }
    }

    async fn dispatch(
        &self,
        request: &GenerationRequest,
        lifecycle: &mut RequestLifecycle,
    ) -> Result<BackendOutput, GenerationError> {
        request.validate()?;
        if request.mask.is_some() && request.mode != TransmuteMode::Inpaint {
            tracing::warn!(mode = %request.mode, "Mask supplied for a non-inpaint mode; ignoring it");
        }

        let params = map_parameters(MappingInput {
            mode: request.mode,
            creativity: request.creativity,
            chaos: request.chaos,
            prompt_override: request.prompt.as_deref(),
            source_count: request.source_images.len(),
            has_mask: request.has_mask(),
        })?;
        tracing::debug!(
            strength = params.strength,
            guidance_scale = params.guidance_scale,
            steps = params.steps,
            "Parameters mapped"
        );

        self.backend.generate(request, &params, lifecycle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::{FixedClock, FixedRandom};
    use crate::infrastructure::ports::{MockClockPort, MockRandomPort};
    use crate::use_cases::generation::MockGenerationBackend;
    use chrono::{TimeZone, Utc};
    use transmute_domain::{BackendParameters, ImageRef, Job, JobState};

    fn image(n: u8) -> ImageRef {
        ImageRef::new(format!("data:image/png;base64,AAAA{}", n)).expect("valid ref")
    }

    type GenerateResult = Result<BackendOutput, GenerationError>;

    fn succeeded(
        url: &'static str,
    ) -> impl Fn(&GenerationRequest, &BackendParameters, &mut RequestLifecycle) -> GenerateResult + Send
    {
        move |_: &GenerationRequest,
              _: &BackendParameters,
              lifecycle: &mut RequestLifecycle|
              -> GenerateResult {
            lifecycle.advance(LifecyclePhase::Submitting)?;
            let mut job = Job::submitted("job-1", BackendKind::Hosted);
            job.transition(JobState::Succeeded)?;
            Ok(BackendOutput {
                job,
                image_url: url.to_string(),
            })
        }
    }

    fn use_case(backend: MockGenerationBackend) -> TransmuteImage {
        TransmuteImage::new(
            Arc::new(backend),
            Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
                    .single()
                    .expect("valid time"),
            )),
            Arc::new(FixedRandom(4821)),
        )
    }

    fn backend() -> MockGenerationBackend {
        let mut backend = MockGenerationBackend::new();
        backend.expect_kind().return_const(BackendKind::Hosted);
        backend
    }

    #[tokio::test]
    async fn returns_normalized_result() {
        let mut backend = backend();
        backend
            .expect_generate()
            .times(1)
            .returning(succeeded("https://cdn/out.png"));

        let request = GenerationRequest::new(TransmuteMode::Style, vec![image(1)]);
        let outcome = use_case(backend)
            .execute(request, CorrelationId::new())
            .await
            .expect("success");

        assert_eq!(outcome.transmission_number, 4821);
        assert_eq!(outcome.result.job_id, "job-1");
        assert_eq!(outcome.result.image_url, "https://cdn/out.png");
        assert_eq!(outcome.result.mode, TransmuteMode::Style);
        assert_eq!(outcome.result.source_image_refs, vec![image(1)]);
        assert_eq!(
            outcome.result.created_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
                .single()
                .expect("valid time")
        );
    }

    #[tokio::test]
    async fn empty_sources_never_reach_backend() {
        let mut backend = backend();
        backend.expect_generate().never();

        let request = GenerationRequest::new(TransmuteMode::Style, vec![]);
        let err = use_case(backend)
            .execute(request, CorrelationId::new())
            .await
            .expect_err("invalid");
        assert!(matches!(err, GenerationError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn inpaint_without_mask_never_reaches_backend() {
        let mut backend = backend();
        backend.expect_generate().never();

        let request = GenerationRequest::new(TransmuteMode::Inpaint, vec![image(1)]);
        let err = use_case(backend)
            .execute(request, CorrelationId::new())
            .await
            .expect_err("invalid");
        assert!(matches!(err, GenerationError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn remix_parameters_reach_backend() {
        let mut backend = backend();
        backend
            .expect_generate()
            .withf(|request, params, lifecycle| {
                request.mode == TransmuteMode::Remix
                    && (params.strength - 0.5).abs() < 1e-9
                    && (params.guidance_scale - 9.0).abs() < 1e-9
                    && lifecycle.phase() == LifecyclePhase::Mapping
            })
            .times(1)
            .returning(succeeded("https://cdn/remix.png"));

        let request = GenerationRequest::new(TransmuteMode::Remix, vec![image(1)])
            .with_prompt("a gilded fox")
            .with_sliders(50.0, 30.0);
        let outcome = use_case(backend)
            .execute(request, CorrelationId::new())
            .await
            .expect("success");
        assert_eq!(outcome.result.image_url, "https://cdn/remix.png");
    }

    #[tokio::test]
    async fn mashup_prompt_references_extra_sources() {
        let mut backend = backend();
        backend
            .expect_generate()
            .withf(|_, params, _| {
                params.prompt.contains("source image 2") && params.prompt.contains("source image 3")
            })
            .returning(succeeded("https://cdn/mashup.png"));

        let request =
            GenerationRequest::new(TransmuteMode::Mashup, vec![image(1), image(2), image(3)])
                .with_sliders(10.0, 100.0);
        let outcome = use_case(backend)
            .execute(request, CorrelationId::new())
            .await
            .expect("success");
        assert_eq!(outcome.result.source_count(), 3);
    }

    #[tokio::test]
    async fn mask_on_style_is_ignored() {
        let mut backend = backend();
        backend
            .expect_generate()
            .returning(succeeded("https://cdn/style.png"));

        let request =
            GenerationRequest::new(TransmuteMode::Style, vec![image(1)]).with_mask(image(9));
        assert!(use_case(backend)
            .execute(request, CorrelationId::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn failures_never_stamp_a_result() {
        let mut backend = backend();
        backend
            .expect_generate()
            .returning(|_, _, _| Err(GenerationError::failed("NSFW content detected")));
        let mut clock = MockClockPort::new();
        clock.expect_now().never();
        let mut random = MockRandomPort::new();
        random.expect_gen_range().never();

        let use_case = TransmuteImage::new(Arc::new(backend), Arc::new(clock), Arc::new(random));
        let request = GenerationRequest::new(TransmuteMode::Style, vec![image(1)]);
        let err = use_case
            .execute(request, CorrelationId::new())
            .await
            .expect_err("failed");
        assert_eq!(
            err,
            GenerationError::GenerationFailed("NSFW content detected".to_string())
        );
    }

    #[tokio::test]
    async fn backend_errors_pass_through_unchanged() {
        let mut backend = backend();
        backend.expect_generate().returning(|_, _, _| {
            Err(GenerationError::GenerationTimedOut { elapsed_secs: 60 })
        });

        let request = GenerationRequest::new(TransmuteMode::Style, vec![image(1)]);
        let err = use_case(backend)
            .execute(request, CorrelationId::new())
            .await
            .expect_err("timed out");
        assert_eq!(err, GenerationError::GenerationTimedOut { elapsed_secs: 60 });
    }
}
