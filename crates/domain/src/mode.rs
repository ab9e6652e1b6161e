//! Transmutation modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// How the source images are transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmuteMode {
    /// Re-render the source in a new style while keeping its composition
    Style,
    /// Free reinterpretation; creativity decides how much of the source survives
    Remix,
    /// Replace only the masked region of the source
    Inpaint,
    /// Fuse several sources into one picture
    Mashup,
}

impl TransmuteMode {
    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Remix => "remix",
            Self::Inpaint => "inpaint",
            Self::Mashup => "mashup",
        }
    }

    /// Inclusive bounds on the number of source images this mode accepts.
    ///
    /// Remix is the only mode that also runs without a source (plain
    /// text-to-image).
    pub fn source_bounds(&self) -> (usize, usize) {
        match self {
            Self::Style | Self::Inpaint => (1, 1),
            Self::Remix => (0, 1),
            Self::Mashup => (1, 4),
        }
    }

    /// Prompt used when the caller leaves the prompt blank.
    pub fn default_prompt(&self) -> &'static str {
        match self {
            Self::Style => {
                "the same scene reimagined as a luminous alchemical painting, rich texture, gilded light"
            }
            Self::Remix => {
                "a surreal transmutation of the subject, dreamlike colors, intricate detail"
            }
            Self::Inpaint => "seamlessly continue the surrounding artwork, matching light and texture",
            Self::Mashup => {
                "a single coherent composition fusing the subjects, mystical atmosphere, unified palette"
            }
        }
    }

    /// All modes, in display order.
    pub fn all() -> &'static [TransmuteMode] {
        &[Self::Style, Self::Remix, Self::Inpaint, Self::Mashup]
    }
}

impl fmt::Display for TransmuteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransmuteMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "style" => Ok(Self::Style),
            "remix" => Ok(Self::Remix),
            "inpaint" => Ok(Self::Inpaint),
            "mashup" => Ok(Self::Mashup),
            other => Err(DomainError::parse(format!("Unknown transmute mode: {}", other))),
        }
    }
}
