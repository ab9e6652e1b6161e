//! The normalized outcome of a successful generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::image::ImageRef;
use crate::mode::TransmuteMode;

/// Backend-independent result handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedResult {
    pub job_id: String,
    /// Fetchable URL of the finished image
    pub image_url: String,
    pub mode: TransmuteMode,
    pub source_image_refs: Vec<ImageRef>,
    pub created_at: DateTime<Utc>,
}

impl GeneratedResult {
    pub fn new(
        job_id: impl Into<String>,
        image_url: impl Into<String>,
        mode: TransmuteMode,
        source_image_refs: Vec<ImageRef>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            image_url: image_url.into(),
            mode,
            source_image_refs,
            created_at,
        }
    }

    pub fn source_count(&self) -> usize {
        self.source_image_refs.len()
    }
}
