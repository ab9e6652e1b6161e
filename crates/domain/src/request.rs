//! Generation requests as accepted from the UI layer.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::image::ImageRef;
use crate::mode::TransmuteMode;

/// Lower bound of the creativity and chaos sliders.
pub const SLIDER_MIN: f64 = 0.0;
/// Upper bound of the creativity and chaos sliders.
pub const SLIDER_MAX: f64 = 100.0;

/// A single transmutation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub mode: TransmuteMode,
    /// Ordered; the first image is the primary (diffusion seed) image.
    pub source_images: Vec<ImageRef>,
    pub prompt: Option<String>,
    /// 0-100, how far the output may drift from the source
    pub creativity: f64,
    /// 0-100, how wild the guidance gets
    pub chaos: f64,
    /// Required for inpaint; white marks the region to replace
    pub mask: Option<ImageRef>,
    /// Fixed sampler seed; a random one is drawn when absent
    pub seed: Option<u32>,
}

impl GenerationRequest {
    /// Create a request with neutral sliders and no prompt.
    pub fn new(mode: TransmuteMode, source_images: Vec<ImageRef>) -> Self {
        Self {
            mode,
            source_images,
            prompt: None,
            creativity: 50.0,
            chaos: 50.0,
            mask: None,
            seed: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_sliders(mut self, creativity: f64, chaos: f64) -> Self {
        self.creativity = creativity;
        self.chaos = chaos;
        self
    }

    pub fn with_mask(mut self, mask: ImageRef) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The image that participates as the literal diffusion input.
    pub fn primary_image(&self) -> Option<&ImageRef> {
        self.source_images.first()
    }

    /// Whether a usable mask was supplied.
    pub fn has_mask(&self) -> bool {
        self.mask
            .as_ref()
            .map(|mask| !mask.is_blank_payload())
            .unwrap_or(false)
    }

    /// Check the structural rules that do not depend on the mode's mapping.
    ///
    /// Mask presence for inpaint is checked by the parameter mapper.
    pub fn validate(&self) -> Result<(), DomainError> {
        let count = self.source_images.len();
        let (min, max) = self.mode.source_bounds();
        if count == 0 && min > 0 {
            return Err(DomainError::validation(format!(
                "{} requires at least one source image",
                self.mode
            )));
        }
        if count < min || count > max {
            return Err(DomainError::validation(format!(
                "{} accepts {}-{} source images, got {}",
                self.mode, min, max, count
            )));
        }
        if let Some(blank) = self.source_images.iter().position(ImageRef::is_blank_payload) {
            return Err(DomainError::validation(format!(
                "source image {} is empty",
                blank + 1
            )));
        }
        validate_slider("creativity", self.creativity)?;
        validate_slider("chaos", self.chaos)?;
        Ok(())
    }
}

fn validate_slider(name: &str, value: f64) -> Result<(), DomainError> {
    if !value.is_finite() || !(SLIDER_MIN..=SLIDER_MAX).contains(&value) {
        return Err(DomainError::validation(format!(
            "{} must be between {} and {}, got {}",
            name, SLIDER_MIN, SLIDER_MAX, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(n: u8) -> ImageRef {
        ImageRef::new(format!("data:image/png;base64,AAAA{}", n)).expect("valid image ref")
    }

    #[test]
    fn style_with_one_image_is_valid() {
        let request = GenerationRequest::new(TransmuteMode::Style, vec![image(1)]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn style_without_source_is_rejected() {
        let request = GenerationRequest::new(TransmuteMode::Style, vec![]);
        let err = request.validate().expect_err("empty source list");
        assert!(err.is_validation());
        assert!(err.to_string().contains("at least one source image"));
    }

    #[test]
    fn remix_without_source_falls_back_to_text_to_image() {
        let request =
            GenerationRequest::new(TransmuteMode::Remix, vec![]).with_prompt("a brass owl");
        assert!(request.validate().is_ok());
        assert!(request.primary_image().is_none());
    }

    #[test]
    fn mashup_accepts_up_to_four_sources() {
        let four = GenerationRequest::new(
            TransmuteMode::Mashup,
            vec![image(1), image(2), image(3), image(4)],
        );
        assert!(four.validate().is_ok());

        let five = GenerationRequest::new(
            TransmuteMode::Mashup,
            vec![image(1), image(2), image(3), image(4), image(5)],
        );
        assert!(five.validate().is_err());
    }

    #[test]
    fn single_image_modes_reject_extra_sources() {
        let request = GenerationRequest::new(TransmuteMode::Inpaint, vec![image(1), image(2)]);
        assert!(request.validate().is_err());
    }

    #[test]
    fn sliders_outside_range_are_rejected() {
        let base = GenerationRequest::new(TransmuteMode::Remix, vec![image(1)]);
        assert!(base.clone().with_sliders(101.0, 0.0).validate().is_err());
        assert!(base.clone().with_sliders(0.0, -1.0).validate().is_err());
        assert!(base.clone().with_sliders(f64::NAN, 0.0).validate().is_err());
        assert!(base.with_sliders(100.0, 0.0).validate().is_ok());
    }

    #[test]
    fn blank_mask_does_not_count_as_mask() {
        let blank = ImageRef::new("data:image/png;base64,").expect("valid shape");
        let request =
            GenerationRequest::new(TransmuteMode::Inpaint, vec![image(1)]).with_mask(blank);
        assert!(!request.has_mask());
        assert!(request.clone().with_mask(image(9)).has_mask());
    }

    #[test]
    fn deserialized_request_cannot_smuggle_invalid_images() {
        let body = r#"{"mode":"style","source_images":["not-an-image"],"creativity":50.0,"chaos":50.0}"#;
        assert!(serde_json::from_str::<GenerationRequest>(body).is_err());
    }
}
