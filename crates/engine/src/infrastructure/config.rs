//! Application configuration

use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use transmute_domain::{BackendKind, GraphSettings, ModelRef};

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP server port
    pub server_port: u16,

    /// CORS allowed origins (comma-separated, or "*" for any)
    pub cors_allowed_origins: Vec<String>,

    /// Which backend serves generations
    pub backend: BackendKind,

    /// Hosted predictions API
    pub hosted: HostedConfig,

    /// Local node-graph engine
    pub local: LocalConfig,

    /// Source image loading
    pub sources: SourceConfig,
}

/// Hosted predictions API configuration
#[derive(Debug, Clone)]
pub struct HostedConfig {
    /// API base URL, without trailing slash
    pub base_url: String,
    /// Bearer token (required when the hosted backend is selected)
    pub api_token: Option<String>,
    /// `owner/name` or `owner/name:version`
    pub model: String,
    /// Delay between polls (milliseconds)
    pub poll_interval_ms: u64,
    /// Polls before giving up
    pub max_poll_attempts: u32,
    /// Per-request HTTP timeout (seconds)
    pub request_timeout_secs: u64,
}

/// Local node-graph engine configuration
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Engine URL the service talks to
    pub base_url: String,
    /// Engine URL handed to browsers in result links
    pub public_base_url: String,
    pub checkpoint: String,
    pub width: u32,
    pub height: u32,
    pub sampler_name: String,
    pub scheduler: String,
    pub filename_prefix: String,
    /// Delay between history polls (milliseconds)
    pub poll_interval_ms: u64,
    /// Wall-clock ceiling for one generation (seconds)
    pub timeout_secs: u64,
}

/// Source image loading configuration
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Timeout for downloading URL sources (seconds)
    pub fetch_timeout_secs: u64,
    /// Largest accepted source image (bytes)
    pub max_bytes: usize,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a non-negative integer", key)),
                None => Ok(default),
            }
        };

        let local_base_url = trim_url(&var("COMFYUI_BASE_URL", "http://127.0.0.1:8188"));
        let public_base_url = lookup("COMFYUI_PUBLIC_URL")
            .map(|url| trim_url(&url))
            .unwrap_or_else(|| local_base_url.clone());
        let defaults = GraphSettings::default();

        let config = Self {
            server_port: var("SERVER_PORT", "3000")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,

            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            backend: var("TRANSMUTE_BACKEND", "hosted")
                .parse()
                .context("TRANSMUTE_BACKEND must be 'hosted' or 'local'")?,

            hosted: HostedConfig {
                base_url: trim_url(&var("REPLICATE_BASE_URL", "https://api.replicate.com/v1")),
                api_token: lookup("REPLICATE_API_TOKEN").filter(|t| !t.trim().is_empty()),
                model: var(
                    "REPLICATE_MODEL",
                    "stability-ai/sdxl:7762fd07cf82c948538e41f63f77d685e02b063e37e496e96eefd46c929f9bdc",
                ),
                poll_interval_ms: number("REPLICATE_POLL_INTERVAL_MS", 1000)?,
                max_poll_attempts: u32::try_from(number("REPLICATE_MAX_POLL_ATTEMPTS", 60)?)
                    .context("REPLICATE_MAX_POLL_ATTEMPTS is too large")?,
                request_timeout_secs: number("REPLICATE_REQUEST_TIMEOUT_SECS", 90)?,
            },

            local: LocalConfig {
                base_url: local_base_url,
                public_base_url,
                checkpoint: var("COMFYUI_CHECKPOINT", &defaults.checkpoint),
                width: u32::try_from(number("COMFYUI_WIDTH", u64::from(defaults.width))?)
                    .context("COMFYUI_WIDTH is too large")?,
                height: u32::try_from(number("COMFYUI_HEIGHT", u64::from(defaults.height))?)
                    .context("COMFYUI_HEIGHT is too large")?,
                sampler_name: var("COMFYUI_SAMPLER", &defaults.sampler_name),
                scheduler: var("COMFYUI_SCHEDULER", &defaults.scheduler),
                filename_prefix: var("COMFYUI_FILENAME_PREFIX", &defaults.filename_prefix),
                poll_interval_ms: number("COMFYUI_POLL_INTERVAL_MS", 1500)?,
                timeout_secs: number("COMFYUI_TIMEOUT_SECS", 300)?,
            },

            sources: SourceConfig {
                fetch_timeout_secs: number("SOURCE_FETCH_TIMEOUT_SECS", 30)?,
                max_bytes: usize::try_from(number("SOURCE_MAX_BYTES", 20 * 1024 * 1024)?)
                    .context("SOURCE_MAX_BYTES is too large")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every request fail or never end.
    pub fn validate(&self) -> Result<()> {
        if self.hosted.poll_interval_ms == 0 || self.local.poll_interval_ms == 0 {
            bail!("poll intervals must be greater than zero");
        }
        if self.hosted.max_poll_attempts == 0 {
            bail!("REPLICATE_MAX_POLL_ATTEMPTS must be greater than zero");
        }
        if self.local.timeout_secs == 0 {
            bail!("COMFYUI_TIMEOUT_SECS must be greater than zero");
        }
        if self.local.width == 0 || self.local.height == 0 {
            bail!("COMFYUI_WIDTH and COMFYUI_HEIGHT must be greater than zero");
        }
        if self.backend == BackendKind::Hosted {
            if self.hosted.api_token.is_none() {
                bail!("REPLICATE_API_TOKEN is required when TRANSMUTE_BACKEND=hosted");
            }
            self.hosted_model()?;
        }
        Ok(())
    }

    pub fn hosted_model(&self) -> Result<ModelRef> {
        self.hosted
            .model
            .parse::<ModelRef>()
            .map_err(|e| anyhow::anyhow!("REPLICATE_MODEL is invalid: {}", e))
    }

    pub fn graph_settings(&self) -> GraphSettings {
        GraphSettings {
            checkpoint: self.local.checkpoint.clone(),
            width: self.local.width,
            height: self.local.height,
            sampler_name: self.local.sampler_name.clone(),
            scheduler: self.local.scheduler.clone(),
            filename_prefix: self.local.filename_prefix.clone(),
        }
    }
}

impl HostedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl LocalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn local_backend_needs_no_token() {
        let config = load(&[("TRANSMUTE_BACKEND", "local")]).expect("valid config");
        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.local.base_url, "http://127.0.0.1:8188");
        assert_eq!(config.local.public_base_url, config.local.base_url);
        assert_eq!(config.local.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.local.timeout(), Duration::from_secs(300));
        assert_eq!(config.graph_settings(), GraphSettings::default());
    }

    #[test]
    fn hosted_backend_requires_token() {
        let err = load(&[("TRANSMUTE_BACKEND", "hosted")]).expect_err("token missing");
        assert!(err.to_string().contains("REPLICATE_API_TOKEN"));

        let config = load(&[("TRANSMUTE_BACKEND", "hosted"), ("REPLICATE_API_TOKEN", "r8_x")])
            .expect("valid config");
        assert_eq!(config.hosted.max_poll_attempts, 60);
        assert_eq!(config.hosted.poll_interval(), Duration::from_secs(1));
        assert!(config.hosted_model().expect("default model").is_versioned());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let err = load(&[("TRANSMUTE_BACKEND", "local"), ("COMFYUI_POLL_INTERVAL_MS", "0")])
            .expect_err("zero interval");
        assert!(err.to_string().contains("poll intervals"));
    }

    #[test]
    fn rejects_malformed_model() {
        let result = load(&[
            ("TRANSMUTE_BACKEND", "hosted"),
            ("REPLICATE_API_TOKEN", "r8_x"),
            ("REPLICATE_MODEL", "just-a-name"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn trims_trailing_slashes_and_splits_origins() {
        let config = load(&[
            ("TRANSMUTE_BACKEND", "local"),
            ("COMFYUI_BASE_URL", "http://gpu-box:8188/"),
            ("COMFYUI_PUBLIC_URL", "https://render.example.com/"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
        ])
        .expect("valid config");
        assert_eq!(config.local.base_url, "http://gpu-box:8188");
        assert_eq!(config.local.public_base_url, "https://render.example.com");
        assert_eq!(
            config.cors_allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn rejects_non_numeric_values() {
        assert!(load(&[("TRANSMUTE_BACKEND", "local"), ("COMFYUI_TIMEOUT_SECS", "soon")]).is_err());
        assert!(load(&[("TRANSMUTE_BACKEND", "gpu")]).is_err());
    }
}
