//! Replicate predictions client
//!
//! Implements the PredictionsPort trait against Replicate's HTTP API.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;
use transmute_domain::ModelRef;

use crate::infrastructure::ports::{GenerationError, Prediction, PredictionsPort};

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Client for the hosted predictions API
#[derive(Clone)]
pub struct ReplicateClient {
    client: Client,
    base_url: String,
    api_token: String,
}

impl ReplicateClient {
    pub fn new(base_url: &str, api_token: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    /// Versioned references use the generic endpoint; bare `owner/name`
    /// targets the model's latest version.
    fn create_url(&self, model: &ModelRef) -> String {
        if model.is_versioned() {
            format!("{}/predictions", self.base_url)
        } else {
            format!(
                "{}/models/{}/{}/predictions",
                self.base_url, model.owner, model.name
            )
        }
    }

    fn create_body(model: &ModelRef, input: Value) -> Value {
        match &model.version {
            Some(version) => json!({ "version": version, "input": input }),
            None => json!({ "input": input }),
        }
    }

    async fn read_prediction(
        &self,
        operation: &'static str,
        response: Response,
    ) -> Result<Prediction, GenerationError> {
        if let Some(remaining) = response
            .headers()
            .get(RATE_LIMIT_REMAINING)
            .and_then(|value| value.to_str().ok())
        {
            tracing::debug!(operation, remaining, "Predictions API rate limit");
        }

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
                "Predictions API rejected request"
            );
            return Err(GenerationError::from_status(
                status.as_u16(),
                upstream_detail(&error_text),
            ));
        }

        response.json().await.map_err(GenerationError::from)
    }
}

#[async_trait]
impl PredictionsPort for ReplicateClient {
    async fn create_prediction(
        &self,
        model: &ModelRef,
        input: Value,
    ) -> Result<Prediction, GenerationError> {
        let url = self.create_url(model);
        tracing::debug!(model = %model, url = %url, "Creating prediction");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&Self::create_body(model, input))
            .send()
            .await?;

        self.read_prediction("create_prediction", response).await
    }

    async fn get_prediction(&self, id: &str) -> Result<Prediction, GenerationError> {
        let response = self
            .client
            .get(format!("{}/predictions/{}", self.base_url, id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        self.read_prediction("get_prediction", response).await
    }

    async fn check_health(&self) -> Result<bool, GenerationError> {
        let response = self
            .client
            .get(format!("{}/account", self.base_url))
            .bearer_auth(&self.api_token)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(GenerationError::transport)?;

        Ok(response.status().is_success())
    }
}

/// Pull `detail` out of an API error body, falling back to the raw text.
fn upstream_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("detail")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
