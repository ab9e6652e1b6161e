//! Source image loading
//!
//! Turns caller image references into bytes: base64 data URIs are decoded in
//! place, http(s) URLs are downloaded. Also names uploads by content hash.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use transmute_domain::ImageRef;

use crate::infrastructure::ports::{GenerationError, SourceImage, SourceImagePort};

const DEFAULT_CONTENT_TYPE: &str = "image/png";

/// Loads source images from data URIs and URLs.
#[derive(Clone)]
pub struct SourceImageLoader {
    client: Client,
    max_bytes: usize,
}

impl SourceImageLoader {
    pub fn new(fetch_timeout: Duration, max_bytes: usize) -> Self {
        let client = Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, max_bytes }
    }

    fn check_size(&self, len: usize) -> Result<(), GenerationError> {
        if len > self.max_bytes {
            return Err(GenerationError::invalid_request(format!(
                "source image is {} bytes, limit is {}",
                len, self.max_bytes
            )));
        }
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<SourceImage, GenerationError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::invalid_request(format!(
                "source image download failed ({}): {}",
                status.as_u16(),
                url
            )));
        }

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| value.starts_with("image/"));
        if let Some(declared) = response.content_length() {
            self.check_size(usize::try_from(declared).unwrap_or(usize::MAX))?;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            self.check_size(bytes.len().saturating_add(chunk.len()))?;
            bytes.extend_from_slice(&chunk);
        }

        let content_type = header_type
            .or_else(|| sniff_content_type(&bytes).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        Ok(SourceImage {
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl SourceImagePort for SourceImageLoader {
    async fn load(&self, image: &ImageRef) -> Result<SourceImage, GenerationError> {
        if image.is_data_uri() {
            let decoded = decode_data_uri(image.as_str())?;
            self.check_size(decoded.bytes.len())?;
            Ok(decoded)
        } else {
            tracing::debug!(source = %image.summary(), "Downloading source image");
            self.download(image.as_str()).await
        }
    }
}

/// Decode a `data:<mime>;base64,<payload>` URI.
///
/// The declared media type wins; without one the bytes are sniffed.
pub fn decode_data_uri(value: &str) -> Result<SourceImage, GenerationError> {
    let (meta, payload) = value
        .split_once(',')
        .ok_or_else(|| GenerationError::invalid_request("data URI has no payload"))?;
    let meta = meta.trim();
    let params = match meta.get(..5) {
        Some(scheme) if scheme.eq_ignore_ascii_case("data:") => &meta[5..],
        _ => return Err(GenerationError::invalid_request("not a data URI")),
    };
    let mut parts = params.split(';').map(str::trim);
    let declared = parts
        .next()
        .filter(|mime| !mime.is_empty())
        .map(str::to_ascii_lowercase);
    if !parts.any(|part| part.eq_ignore_ascii_case("base64")) {
        return Err(GenerationError::invalid_request(
            "only base64 data URIs are supported",
        ));
    }

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| GenerationError::invalid_request(format!("invalid base64 image: {}", e)))?;
    if bytes.is_empty() {
        return Err(GenerationError::invalid_request("image payload is empty"));
    }

    let content_type = declared
        .filter(|mime| mime.starts_with("image/"))
        .or_else(|| sniff_content_type(&bytes).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    Ok(SourceImage {
        bytes,
        content_type,
    })
}

/// Identify common image formats by their magic bytes.
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Content-addressed upload name: identical bytes map to the same file, so
/// re-uploads overwrite instead of piling up.
pub fn upload_filename(bytes: &[u8], content_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    format!(
        "transmute-{}.{}",
        hex::encode(&digest[..8]),
        extension_for(content_type)
    )
}
