//! Port traits for infrastructure boundaries.
//!
//! Every external dependency sits behind one of these. Ports exist for:
//! - Hosted predictions (could swap Replicate -> another submit-and-poll API)
//! - Node-graph engine (could swap ComfyUI -> another graph executor)
//! - Source image loading (data URIs, URLs)
//! - Clock/Random (for testing)

mod error;
mod external;
mod testing;

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    HistoryEntry, HistoryStatus, ImageUpload, NodeGraphPort, NodeOutput, OutputImage, Prediction,
    PredictionStatus, PredictionsPort, SourceImage, SourceImagePort, UploadedAsset,
};

#[cfg(test)]
pub use external::{MockNodeGraphPort, MockPredictionsPort, MockSourceImagePort};

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};

#[cfg(test)]
pub use testing::{MockClockPort, MockRandomPort};

// =============================================================================
// Error Types
// =============================================================================
pub use error::GenerationError;
