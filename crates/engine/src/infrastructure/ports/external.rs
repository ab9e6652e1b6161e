//! External service port traits (hosted predictions, node-graph engine, source images).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use transmute_domain::{ImageRef, ModelRef};

use super::error::GenerationError;

// =============================================================================
// Hosted Predictions
// =============================================================================

/// Lifecycle status reported by the predictions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

/// A prediction snapshot as returned by create/get.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    /// A URL string or a list of URL strings once succeeded
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    /// Upstream error text, if the API supplied one.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(message) if message.trim().is_empty() => None,
            Value::String(message) => Some(message.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionsPort: Send + Sync {
    /// Submit a prediction. `Prefer: wait` may make the first answer terminal.
    async fn create_prediction(
        &self,
        model: &ModelRef,
        input: Value,
    ) -> Result<Prediction, GenerationError>;

    async fn get_prediction(&self, id: &str) -> Result<Prediction, GenerationError>;

    async fn check_health(&self) -> Result<bool, GenerationError>;
}

// =============================================================================
// Node-Graph Engine
// =============================================================================

/// An image to push into the engine's input folder.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Engine acknowledgement of an upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadedAsset {
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(default, rename = "type")]
    pub folder_type: String,
}

impl UploadedAsset {
    /// Name to reference from a loader node.
    pub fn graph_name(&self) -> String {
        if self.subfolder.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.subfolder, self.name)
        }
    }
}

/// One image written by an output node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(default = "default_output_type", rename = "type")]
    pub folder_type: String,
}

fn default_output_type() -> String {
    "output".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Vec<OutputImage>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: String,
    #[serde(default)]
    pub completed: bool,
    /// `[event_name, payload]` pairs
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// History record of one queued prompt.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: Option<HistoryStatus>,
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
}

impl HistoryEntry {
    pub fn is_error(&self) -> bool {
        self.status
            .as_ref()
            .map(|status| status.status_str == "error")
            .unwrap_or(false)
    }

    pub fn first_image(&self) -> Option<&OutputImage> {
        self.outputs
            .values()
            .find_map(|output| output.images.first())
    }

    /// `exception_message` of the first `execution_error` event.
    pub fn error_message(&self) -> Option<String> {
        let status = self.status.as_ref()?;
        status.messages.iter().find_map(|message| {
            let event = message.get(0)?.as_str()?;
            if event != "execution_error" {
                return None;
            }
            message
                .get(1)?
                .get("exception_message")?
                .as_str()
                .map(|text| text.trim().to_string())
        })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeGraphPort: Send + Sync {
    async fn upload_image(&self, upload: ImageUpload) -> Result<UploadedAsset, GenerationError>;

    /// Queue a workflow; returns the engine's prompt id.
    async fn queue_prompt(&self, workflow: Value) -> Result<String, GenerationError>;

    /// `None` while the prompt has not produced a history record yet.
    async fn get_history(&self, prompt_id: &str) -> Result<Option<HistoryEntry>, GenerationError>;

    /// Publicly fetchable URL of an output image.
    fn view_url(&self, image: &OutputImage) -> Result<String, GenerationError>;

    async fn check_health(&self) -> Result<bool, GenerationError>;
}

// =============================================================================
// Source Images
// =============================================================================

/// Raw bytes behind an [`ImageRef`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceImagePort: Send + Sync {
    /// Decode a data URI or download a URL.
    async fn load(&self, image: &ImageRef) -> Result<SourceImage, GenerationError>;
}
