//! Parameter mapping from UI sliders to backend sampling parameters.
//!
//! Pure functions only. `strength` is the fraction of the source that gets
//! re-noised (0 keeps the source, 1 ignores it); `guidance_scale` is the
//! classifier-free guidance weight. Both are monotonic in their sliders and
//! never supplied by the caller directly.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::mode::TransmuteMode;

/// Quality/artifact exclusions attached to every mode.
pub const NEGATIVE_PROMPT: &str = "blurry, low quality, lowres, jpeg artifacts, watermark, \
signature, text, deformed, disfigured, extra limbs, bad anatomy, oversaturated";

/// Scheduler name understood by the hosted predictions API.
pub const DEFAULT_SCHEDULER: &str = "K_EULER";

/// Guidance used by modes that do not derive it from chaos.
pub const BASE_GUIDANCE_SCALE: f64 = 7.5;

/// Strength used for inpaint; the masked region is expected to be replaced.
pub const INPAINT_STRENGTH: f64 = 0.8;

/// Backend-agnostic sampling parameters derived from a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendParameters {
    /// Finished positive prompt (never empty)
    pub prompt: String,
    pub negative_prompt: String,
    /// 0.0-1.0
    pub strength: f64,
    pub guidance_scale: f64,
    pub steps: u32,
    pub scheduler: String,
}

/// Inputs to [`map_parameters`].
#[derive(Debug, Clone, Copy)]
pub struct MappingInput<'a> {
    pub mode: TransmuteMode,
    pub creativity: f64,
    pub chaos: f64,
    pub prompt_override: Option<&'a str>,
    pub source_count: usize,
    pub has_mask: bool,
}

/// Map a mode and its sliders to backend parameters.
///
/// Fails only when inpaint is requested without a mask.
pub fn map_parameters(input: MappingInput<'_>) -> Result<BackendParameters, DomainError> {
    let creativity = unit(input.creativity);
    let chaos = unit(input.chaos);

    let (strength, guidance_scale) = match input.mode {
        TransmuteMode::Style => (0.3 + creativity * 0.4, BASE_GUIDANCE_SCALE),
        TransmuteMode::Remix => (creativity, BASE_GUIDANCE_SCALE + chaos * 5.0),
        TransmuteMode::Inpaint => {
            if !input.has_mask {
                return Err(DomainError::validation(
                    "inpaint requires a non-empty mask",
                ));
            }
            (INPAINT_STRENGTH, BASE_GUIDANCE_SCALE)
        }
        TransmuteMode::Mashup => (0.5 + chaos * 0.4, 8.0 + chaos * 4.0),
    };

    let mut prompt = input
        .prompt_override
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| input.mode.default_prompt())
        .to_string();

    // Only the primary image is diffused; the rest can only steer via text.
    if input.mode == TransmuteMode::Mashup && input.source_count > 1 {
        let kept = prompt
            .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
            .len();
        prompt.truncate(kept);
        prompt.push_str(&mashup_references(input.source_count));
    }

    Ok(BackendParameters {
        prompt,
        negative_prompt: NEGATIVE_PROMPT.to_string(),
        strength: strength.clamp(0.0, 1.0),
        guidance_scale,
        steps: steps_for(input.mode),
        scheduler: DEFAULT_SCHEDULER.to_string(),
    })
}

/// Sampling steps per mode.
pub fn steps_for(mode: TransmuteMode) -> u32 {
    match mode {
        TransmuteMode::Style | TransmuteMode::Remix => 30,
        TransmuteMode::Inpaint => 40,
        TransmuteMode::Mashup => 35,
    }
}

fn mashup_references(source_count: usize) -> String {
    let refs: Vec<String> = (2..=source_count)
        .map(|n| format!("source image {}", n))
        .collect();
    format!(". Weave in motifs from {}.", refs.join(", "))
}

fn unit(slider: f64) -> f64 {
    (slider / 100.0).clamp(0.0, 1.0)
}
