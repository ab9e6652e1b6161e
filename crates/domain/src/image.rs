//! Image references supplied by the caller.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Reference to a caller-supplied image.
///
/// Either a `data:` URI carrying the bytes inline (what the UI sends) or an
/// `http(s)` URL the engine can fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef(String);

impl TryFrom<String> for ImageRef {
    type Error = DomainError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<ImageRef> for String {
    fn from(image: ImageRef) -> Self {
        image.0
    }
}

impl ImageRef {
    /// Wrap a raw reference, rejecting blanks and unsupported schemes.
    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("image reference cannot be empty"));
        }
        let lowered = trimmed.to_ascii_lowercase();
        if !(lowered.starts_with("data:")
            || lowered.starts_with("http://")
            || lowered.starts_with("https://"))
        {
            return Err(DomainError::validation(
                "image reference must be a data URI or an http(s) URL",
            ));
        }
        if lowered.starts_with("data:") && !trimmed.contains(',') {
            return Err(DomainError::validation("data URI has no payload"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the bytes travel inline.
    pub fn is_data_uri(&self) -> bool {
        self.0
            .get(..5)
            .map(|scheme| scheme.eq_ignore_ascii_case("data:"))
            .unwrap_or(false)
    }

    /// True when the reference carries no image bytes at all (`data:...,`).
    pub fn is_blank_payload(&self) -> bool {
        self.is_data_uri()
            && self
                .0
                .split_once(',')
                .map(|(_, payload)| payload.trim().is_empty())
                .unwrap_or(true)
    }

    /// Short form for logs; data URIs are never logged whole.
    pub fn summary(&self) -> String {
        if self.is_data_uri() {
            let meta = self.0.split(',').next().unwrap_or("data:");
            format!("{meta},<{} bytes>", self.0.len())
        } else {
            self.0.clone()
        }
    }
}
