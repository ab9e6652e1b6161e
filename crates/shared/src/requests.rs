//! Request bodies accepted by the engine.

use serde::{Deserialize, Serialize};

fn default_slider() -> f64 {
    50.0
}

/// Body of `POST /api/transmute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmuteRequest {
    /// `style`, `remix`, `inpaint` or `mashup`
    pub mode: String,
    /// Data URIs (or URLs); the first one is the primary image
    #[serde(default)]
    pub source_images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default = "default_slider")]
    pub creativity: f64,
    #[serde(default = "default_slider")]
    pub chaos: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_body_with_defaults() {
        let body = r#"{"mode":"remix","sourceImages":["data:image/png;base64,AAAA"],"prompt":"owl"}"#;
        let request: TransmuteRequest = serde_json::from_str(body).expect("valid body");
        assert_eq!(request.mode, "remix");
        assert_eq!(request.source_images.len(), 1);
        assert_eq!(request.prompt.as_deref(), Some("owl"));
        assert_eq!(request.creativity, 50.0);
        assert_eq!(request.chaos, 50.0);
        assert!(request.mask.is_none());
        assert!(request.seed.is_none());
    }

    #[test]
    fn missing_source_images_is_an_empty_list() {
        let request: TransmuteRequest =
            serde_json::from_str(r#"{"mode":"remix","creativity":10,"chaos":90}"#)
                .expect("valid body");
        assert!(request.source_images.is_empty());
        assert_eq!(request.chaos, 90.0);
    }
}
