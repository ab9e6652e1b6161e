//! Classifying backend snapshots into a uniform resolution.

use serde_json::Value;
use transmute_domain::JobState;

use crate::infrastructure::ports::{
    GenerationError, HistoryEntry, OutputImage, Prediction, PredictionStatus,
};

/// Where a job stands after one look at the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Pending,
    /// Fetchable URL of the finished image
    Succeeded(String),
    /// Reason reported by (or inferred from) the backend
    Failed(String),
}

impl Resolution {
    pub fn from_prediction(prediction: &Prediction) -> Self {
        match prediction.status {
            PredictionStatus::Starting
            | PredictionStatus::Processing
            | PredictionStatus::Unknown => Self::Pending,
            PredictionStatus::Succeeded => match prediction.output.as_ref().and_then(output_url) {
                Some(url) => Self::Succeeded(url),
                None => Self::Failed("no output".to_string()),
            },
            PredictionStatus::Failed | PredictionStatus::Canceled => Self::Failed(
                prediction
                    .error_message()
                    .unwrap_or_else(|| format!("prediction {:?}", prediction.status).to_lowercase()),
            ),
        }
    }

    /// `entry` is `None` until the engine has recorded the prompt.
    pub fn from_history(
        entry: Option<&HistoryEntry>,
        view_url: impl FnOnce(&OutputImage) -> Result<String, GenerationError>,
    ) -> Result<Self, GenerationError> {
        let Some(entry) = entry else {
            return Ok(Self::Pending);
        };
        if entry.is_error() {
            return Ok(Self::Failed(entry.error_message().unwrap_or_else(|| {
                "engine reported an execution error".to_string()
            })));
        }
        if let Some(image) = entry.first_image() {
            return Ok(Self::Succeeded(view_url(image)?));
        }
        let completed = entry
            .status
            .as_ref()
            .map(|status| status.completed)
            .unwrap_or(false);
        if completed {
            return Ok(Self::Failed("no output".to_string()));
        }
        Ok(Self::Pending)
    }

    /// Job state this resolution moves a job into.
    pub fn job_state(&self) -> JobState {
        match self {
            Self::Pending => JobState::Processing,
            Self::Succeeded(_) => JobState::Succeeded,
            Self::Failed(_) => JobState::Failed,
        }
    }
}

/// First usable URL of a prediction output: a string, or the first string of a list.
pub fn output_url(output: &Value) -> Option<String> {
    let candidate = match output {
        Value::String(url) => Some(url.as_str()),
        Value::Array(items) => items.iter().find_map(Value::as_str),
        _ => None,
    }?;
    let trimmed = candidate.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prediction(value: Value) -> Prediction {
        serde_json::from_value(value).expect("valid prediction")
    }

    fn history(value: Value) -> HistoryEntry {
        serde_json::from_value(value).expect("valid history")
    }

    fn view(image: &OutputImage) -> Result<String, GenerationError> {
        Ok(format!("http://engine/view?filename={}", image.filename))
    }

    #[test]
    fn output_url_accepts_string_or_list() {
        assert_eq!(output_url(&json!("https://x/a.png")), Some("https://x/a.png".to_string()));
        assert_eq!(
            output_url(&json!(["https://x/a.png", "https://x/b.png"])),
            Some("https://x/a.png".to_string())
        );
        assert_eq!(output_url(&json!([])), None);
        assert_eq!(output_url(&json!("  ")), None);
        assert_eq!(output_url(&json!({"url": "https://x"})), None);
    }

    #[test]
    fn prediction_in_progress_is_pending() {
        for status in ["starting", "processing"] {
            let p = prediction(json!({"id": "a", "status": status}));
            assert_eq!(Resolution::from_prediction(&p), Resolution::Pending);
        }
    }

    #[test]
    fn succeeded_prediction_without_output_fails() {
        let p = prediction(json!({"id": "a", "status": "succeeded", "output": null}));
        assert_eq!(
            Resolution::from_prediction(&p),
            Resolution::Failed("no output".to_string())
        );
    }

    #[test]
    fn failed_prediction_carries_upstream_error() {
        let p = prediction(json!({"id": "a", "status": "failed", "error": "NSFW content detected"}));
        assert_eq!(
            Resolution::from_prediction(&p),
            Resolution::Failed("NSFW content detected".to_string())
        );
        let canceled = prediction(json!({"id": "a", "status": "canceled"}));
        assert_eq!(
            Resolution::from_prediction(&canceled),
            Resolution::Failed("prediction canceled".to_string())
        );
    }

    #[test]
    fn missing_history_is_pending() {
        assert_eq!(Resolution::from_history(None, view), Ok(Resolution::Pending));
    }

    #[test]
    fn history_error_is_failed() {
        let entry = history(json!({
            "status": {"status_str": "error", "completed": false, "messages": []},
            "outputs": {}
        }));
        assert_eq!(
            Resolution::from_history(Some(&entry), view),
            Ok(Resolution::Failed("engine reported an execution error".to_string()))
        );
    }

    #[test]
    fn history_image_becomes_view_url() {
        let entry = history(json!({
            "status": {"status_str": "success", "completed": true, "messages": []},
            "outputs": {"9": {"images": [{"filename": "out.png", "subfolder": "", "type": "output"}]}}
        }));
        assert_eq!(
            Resolution::from_history(Some(&entry), view),
            Ok(Resolution::Succeeded("http://engine/view?filename=out.png".to_string()))
        );
    }

    #[test]
    fn completed_history_without_images_fails() {
        let entry = history(json!({
            "status": {"status_str": "success", "completed": true, "messages": []},
            "outputs": {}
        }));
        assert_eq!(
            Resolution::from_history(Some(&entry), view),
            Ok(Resolution::Failed("no output".to_string()))
        );
    }

    #[test]
    fn job_state_follows_resolution() {
        assert_eq!(Resolution::Pending.job_state(), JobState::Processing);
        assert_eq!(Resolution::Succeeded(String::new()).job_state(), JobState::Succeeded);
        assert_eq!(Resolution::Failed(String::new()).job_state(), JobState::Failed);
    }
}
