//! Outbound relay clients — best-effort collaborators.
//!
//! Two remote services receive a copy of each submission:
//! - a **media store** that takes the raw video via unsigned multipart upload
//!   and returns a durable URL;
//! - a **notification service** that takes a flat key-value parameter set and
//!   mails it to the coordinators.
//!
//! Both are strictly best-effort: the local record store is the source of
//! truth, and relay failures are logged by the caller, never surfaced as
//! blocking. Non-2xx responses are errors; nothing here retries.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::{MediaRelayConfig, NotificationRelayConfig};
use crate::models::VideoAsset;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// Media store client
// ============================================================================

/// Durable location and metadata of an uploaded asset.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUploadInfo {
    pub url: String,
    pub public_id: Option<String>,
    pub format: Option<String>,
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    secure_url: Option<String>,
    public_id: Option<String>,
    format: Option<String>,
    duration: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    bytes: Option<u64>,
}

/// Client for the unsigned video-upload endpoint of the media store.
#[derive(Debug, Clone)]
pub struct MediaStoreClient {
    client: Client,
    config: MediaRelayConfig,
    base_url: String,
}

impl MediaStoreClient {
    pub fn new(config: MediaRelayConfig) -> Result<Self, RelayError> {
        let base_url = format!("https://api.cloudinary.com/v1_1/{}", config.cloud_name);
        Self::with_base_url(config, base_url)
    }

    /// Create a client with a custom base URL (for testing / integration).
    pub fn with_base_url(
        config: MediaRelayConfig,
        base_url: String,
    ) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Upload one video asset, returning its durable URL and metadata.
    pub async fn upload_video(
        &self,
        asset: &VideoAsset,
        session_id: &str,
    ) -> Result<MediaUploadInfo, RelayError> {
        let part = Part::bytes(asset.data.to_vec())
            .file_name(format!("video_{}.webm", session_id))
            .mime_str(&asset.mime_type)?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.config.upload_preset.clone())
            .text("folder", self.config.folder.clone());

        let response = self
            .client
            .post(format!("{}/video/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Api {
                code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: MediaUploadResponse = response.json().await?;
        let url = body
            .secure_url
            .ok_or_else(|| RelayError::InvalidResponse("missing secure_url".to_string()))?;

        tracing::info!(url = %url, session_id, "Video uploaded to media store");
        Ok(MediaUploadInfo {
            url,
            public_id: body.public_id,
            format: body.format,
            duration: body.duration,
            width: body.width,
            height: body.height,
            bytes: body.bytes,
        })
    }
}

// ============================================================================
// Notification client
// ============================================================================

/// Client for the outbound e-mail notification relay.
#[derive(Debug, Clone)]
pub struct NotificationClient {
    client: Client,
    config: NotificationRelayConfig,
    base_url: String,
}

impl NotificationClient {
    pub fn new(config: NotificationRelayConfig) -> Result<Self, RelayError> {
        Self::with_base_url(config, "https://api.emailjs.com".to_string())
    }

    /// Create a client with a custom base URL (for testing / integration).
    pub fn with_base_url(
        config: NotificationRelayConfig,
        base_url: String,
    ) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Send one notification described by a flat key-value parameter set.
    pub async fn send(&self, params: &BTreeMap<String, String>) -> Result<(), RelayError> {
        let body = serde_json::json!({
            "service_id": self.config.service_id,
            "template_id": self.config.template_id,
            "user_id": self.config.public_key,
            "template_params": params,
        });

        let response = self
            .client
            .post(format!("{}/api/v1.0/email/send", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Api {
                code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        tracing::info!("Notification relayed");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
