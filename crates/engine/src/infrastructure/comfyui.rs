//! ComfyUI node-graph engine client
//!
//! Implements the NodeGraphPort trait using ComfyUI's HTTP API.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::infrastructure::ports::{
    GenerationError, HistoryEntry, ImageUpload, NodeGraphPort, OutputImage, UploadedAsset,
};

/// Client for ComfyUI API
#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
    /// Base handed out in result links; may differ from `base_url` behind a proxy
    public_base_url: String,
}

impl ComfyUIClient {
    pub fn new(base_url: &str, public_base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn read_json<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, GenerationError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(
                operation,
                status = status.as_u16(),
                body = %error_text,
                "ComfyUI rejected request"
            );
            return Err(GenerationError::from_status(status.as_u16(), error_text));
        }

        response.json().await.map_err(GenerationError::from)
    }
}

#[async_trait]
impl NodeGraphPort for ComfyUIClient {
    async fn upload_image(&self, upload: ImageUpload) -> Result<UploadedAsset, GenerationError> {
        let size = upload.bytes.len();
        let part = Part::bytes(upload.bytes)
            .file_name(upload.filename.clone())
            .mime_str(&upload.content_type)
            .map_err(|e| GenerationError::invalid_request(format!("bad content type: {}", e)))?;
        let form = Form::new()
            .part("image", part)
            .text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let asset: UploadedAsset = Self::read_json("upload_image", response).await?;
        tracing::debug!(
            filename = %upload.filename,
            stored_as = %asset.graph_name(),
            bytes = size,
            "Uploaded source image"
        );
        Ok(asset)
    }

    async fn queue_prompt(&self, workflow: serde_json::Value) -> Result<String, GenerationError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let request = QueuePromptRequest {
            prompt: workflow,
            client_id,
        };

        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&request)
            .send()
            .await?;

        let queued: QueueResponse = Self::read_json("queue_prompt", response).await?;
        if let Some(errors) = queued.node_errors.filter(|errors| !errors.is_empty()) {
            return Err(GenerationError::UpstreamRejected {
                status: 400,
                message: format!("workflow has node errors: {}", serde_json::Value::from(errors)),
            });
        }
        Ok(queued.prompt_id)
    }

    async fn get_history(&self, prompt_id: &str) -> Result<Option<HistoryEntry>, GenerationError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.base_url, prompt_id))
            .send()
            .await?;

        let mut history: HistoryResponse = Self::read_json("get_history", response).await?;
        Ok(history.prompts.remove(prompt_id))
    }

    fn view_url(&self, image: &OutputImage) -> Result<String, GenerationError> {
        let mut url = Url::parse(&format!("{}/view", self.public_base_url)).map_err(|e| {
            GenerationError::configuration(format!(
                "invalid ComfyUI public URL '{}': {}",
                self.public_base_url, e
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("filename", &image.filename)
            .append_pair("subfolder", &image.subfolder)
            .append_pair("type", &image.folder_type);
        Ok(url.into())
    }

    async fn check_health(&self) -> Result<bool, GenerationError> {
        let response = self
            .client
            .get(format!("{}/system_stats", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(GenerationError::transport)?;

        Ok(response.status().is_success())
    }
}

// =============================================================================
// ComfyUI API types
// =============================================================================

#[derive(Debug, Serialize)]
struct QueuePromptRequest {
    prompt: serde_json::Value,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    prompt_id: String,
    #[serde(default)]
    node_errors: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(flatten)]
    prompts: HashMap<String, HistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn view_url_encodes_query() {
        let client = ComfyUIClient::new("http://127.0.0.1:8188", "https://render.example.com/");
        let url = client
            .view_url(&OutputImage {
                filename: "transmute 01.png".to_string(),
                subfolder: "a&b".to_string(),
                folder_type: "output".to_string(),
            })
            .expect("valid url");
        assert_eq!(
            url,
            "https://render.example.com/view?filename=transmute+01.png&subfolder=a%26b&type=output"
        );
    }

    #[test]
    fn view_url_rejects_unparseable_base() {
        let client = ComfyUIClient::new("http://127.0.0.1:8188", "not a url");
        let result = client.view_url(&OutputImage {
            filename: "x.png".to_string(),
            subfolder: String::new(),
            folder_type: "output".to_string(),
        });
        assert!(matches!(result, Err(GenerationError::Configuration(_))));
    }

    #[test]
    fn history_response_is_keyed_by_prompt_id() {
        let history: HistoryResponse = serde_json::from_value(json!({
            "p-1": {
                "status": {"status_str": "success", "completed": true, "messages": []},
                "outputs": {"9": {"images": [{"filename": "a.png", "subfolder": "", "type": "output"}]}}
            }
        }))
        .expect("valid history");
        let entry = history.prompts.get("p-1").expect("entry present");
        assert_eq!(entry.first_image().map(|i| i.filename.as_str()), Some("a.png"));
    }

    #[test]
    fn queue_response_tolerates_empty_node_errors() {
        let queued: QueueResponse = serde_json::from_value(json!({
            "prompt_id": "p-2",
            "number": 4,
            "node_errors": {}
        }))
        .expect("valid response");
        assert_eq!(queued.prompt_id, "p-2");
        assert!(queued.node_errors.map(|e| e.is_empty()).unwrap_or(true));
    }
}
