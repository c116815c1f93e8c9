//! Capture coordinator — camera recording and geolocation acquisition.
//!
//! Both acquisitions start together and run as independent tokio tasks:
//! - **video**: buffers encoded chunks from the camera stream until a fixed
//!   wall-clock cutoff, finalizes them into a single asset, and releases the
//!   stream exactly once;
//! - **geolocation**: a single-shot position request with a bounded wait.
//!
//! Neither task blocks the other, and neither blocks step navigation; results
//! land in set-once slots shared with the wizard session. Camera denial is the
//! one fatal capture failure — the asset is required. Geolocation failures and
//! timeouts are logged and never surfaced as blocking. Acquisition is attempted
//! exactly once per session; there is no automatic retry.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::CaptureSettings;
use crate::models::{LocationData, VideoAsset};

/// Extra time `settle` allows beyond the slowest configured acquisition.
const SETTLE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Camera,
    Geolocation,
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureKind::Camera => f.write_str("camera"),
            CaptureKind::Geolocation => f.write_str("geolocation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("{kind} permission denied: {reason}")]
    PermissionDenied { kind: CaptureKind, reason: String },

    #[error("{kind} acquisition timed out after {seconds}s")]
    Timeout { kind: CaptureKind, seconds: u64 },

    #[error("camera stream error: {0}")]
    Stream(String),
}

impl CaptureError {
    pub fn camera_denied(reason: impl Into<String>) -> Self {
        CaptureError::PermissionDenied {
            kind: CaptureKind::Camera,
            reason: reason.into(),
        }
    }

    pub fn geolocation_denied(reason: impl Into<String>) -> Self {
        CaptureError::PermissionDenied {
            kind: CaptureKind::Geolocation,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Backend traits
// ============================================================================

/// Requested video constraints, passed to the camera backend on open.
#[derive(Debug, Clone)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub bits_per_second: u32,
    pub audio: bool,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            bits_per_second: 250_000,
            audio: false,
        }
    }
}

/// Abstraction over a camera device/permission surface.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Request a camera stream. `PermissionDenied` here is fatal for the
    /// session's capture.
    async fn open(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Box<dyn CameraStream>, CaptureError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// A granted camera stream producing encoded chunks.
#[async_trait]
pub trait CameraStream: Send {
    /// Next encoded chunk; `Ok(None)` when the stream ends on its own.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, CaptureError>;

    /// Mime type of the encoded chunks.
    fn mime_type(&self) -> &str;

    /// Stop all tracks and release the device.
    async fn stop(&mut self);
}

/// Abstraction over a geolocation provider.
#[async_trait]
pub trait GeolocationBackend: Send + Sync {
    async fn current_position(&self) -> Result<LocationData, CaptureError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub video_duration: Duration,
    pub geolocation_timeout: Duration,
    pub mime_type: String,
    pub constraints: VideoConstraints,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::from(&CaptureSettings::default())
    }
}

impl From<&CaptureSettings> for CaptureConfig {
    fn from(settings: &CaptureSettings) -> Self {
        Self {
            video_duration: Duration::from_secs(settings.video_duration_seconds),
            geolocation_timeout: Duration::from_secs(settings.geolocation_timeout_seconds),
            mime_type: settings.video_mime_type.clone(),
            constraints: VideoConstraints {
                width: settings.video_width,
                height: settings.video_height,
                bits_per_second: settings.video_bits_per_second,
                audio: settings.audio,
            },
        }
    }
}

impl CaptureConfig {
    /// Upper bound for waiting on in-flight acquisitions at submission time.
    pub fn settle_bound(&self) -> Duration {
        self.video_duration.max(self.geolocation_timeout) + SETTLE_GRACE
    }
}

// ============================================================================
// Result slots
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum CameraOutcome {
    Granted,
    Denied(String),
}

/// Set-once landing area for capture results, shared between the wizard
/// session and the capture tasks. Writes may arrive at any point of the
/// session; the first write per slot wins and later ones are dropped.
#[derive(Debug, Default)]
pub struct CaptureSlots {
    camera: OnceLock<CameraOutcome>,
    location: OnceLock<LocationData>,
    video: OnceLock<VideoAsset>,
}

impl CaptureSlots {
    pub fn camera_granted(&self) -> bool {
        matches!(self.camera.get(), Some(CameraOutcome::Granted))
    }

    /// Denial reason, when the camera was refused.
    pub fn camera_denied(&self) -> Option<&str> {
        match self.camera.get() {
            Some(CameraOutcome::Denied(reason)) => Some(reason.as_str()),
            _ => None,
        }
    }

    pub fn location(&self) -> Option<LocationData> {
        self.location.get().cloned()
    }

    pub fn video(&self) -> Option<VideoAsset> {
        self.video.get().cloned()
    }

    fn set_camera(&self, outcome: CameraOutcome) {
        let _ = self.camera.set(outcome);
    }

    fn set_location(&self, location: LocationData) -> bool {
        self.location.set(location).is_ok()
    }

    fn set_video(&self, asset: VideoAsset) -> bool {
        self.video.set(asset).is_ok()
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Handles to the in-flight acquisition tasks. Submission settles these
/// before snapshotting so it never races a half-written asset.
pub struct CaptureHandle {
    video: JoinHandle<()>,
    location: JoinHandle<()>,
}

impl CaptureHandle {
    /// Wait for both acquisitions to finish, bounded by `bound`. The video
    /// task has its own wall-clock cutoff, so the bound only triggers when a
    /// backend misbehaves; in that case submission proceeds with whatever has
    /// landed in the slots.
    pub async fn settle(self, bound: Duration) {
        let both = async {
            let _ = self.video.await;
            let _ = self.location.await;
        };
        if tokio::time::timeout(bound, both).await.is_err() {
            tracing::warn!(bound_ms = bound.as_millis() as u64, "Capture did not settle in time");
        }
    }
}

/// Request the camera and, on grant, start the video and geolocation tasks.
///
/// Camera denial marks the slots accordingly and returns the error — the
/// caller keeps the wizard on the permissions step and tells the user the
/// camera is mandatory. On grant the tasks run in the background and the
/// wizard may advance immediately.
pub async fn begin_capture(
    slots: Arc<CaptureSlots>,
    camera: Arc<dyn CameraBackend>,
    geolocation: Arc<dyn GeolocationBackend>,
    config: &CaptureConfig,
) -> Result<CaptureHandle, CaptureError> {
    let stream = match camera.open(&config.constraints).await {
        Ok(stream) => stream,
        Err(e) => {
            slots.set_camera(CameraOutcome::Denied(e.to_string()));
            tracing::error!(backend = camera.name(), error = %e, "Camera access denied");
            return Err(e);
        }
    };
    slots.set_camera(CameraOutcome::Granted);
    tracing::info!(backend = camera.name(), "Camera stream granted, recording started");

    let video = tokio::spawn(record_video(stream, slots.clone(), config.video_duration));

    let geo_slots = slots.clone();
    let geo_timeout = config.geolocation_timeout;
    let location = tokio::spawn(async move {
        acquire_location(geolocation, geo_slots, geo_timeout).await;
    });

    Ok(CaptureHandle { video, location })
}

/// Buffer chunks until the cutoff, then finalize the asset. The stream is
/// stopped exactly once, on every path out of the loop.
async fn record_video(
    mut stream: Box<dyn CameraStream>,
    slots: Arc<CaptureSlots>,
    duration: Duration,
) {
    let started = Instant::now();
    let mime_type = stream.mime_type().to_string();
    let mut chunks: Vec<Bytes> = Vec::new();

    let cutoff = tokio::time::sleep(duration);
    tokio::pin!(cutoff);

    let outcome: Result<(), CaptureError> = loop {
        tokio::select! {
            _ = &mut cutoff => break Ok(()),
            chunk = stream.next_chunk() => match chunk {
                Ok(Some(chunk)) => {
                    if !chunk.is_empty() {
                        chunks.push(chunk);
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        }
    };

    stream.stop().await;

    match outcome {
        Ok(()) => {
            let data: Bytes = chunks.concat().into();
            let asset = VideoAsset {
                size: data.len() as u64,
                data,
                mime_type,
                duration: started.elapsed().as_secs_f64(),
                recorded_at: Utc::now(),
            };
            let size = asset.size;
            if slots.set_video(asset) {
                tracing::info!(size_bytes = size, "Video capture finished");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Video capture failed, no asset recorded");
        }
    }
}

/// Single-shot geolocation request with a bounded wait. Failure and timeout
/// are logged only; the session proceeds without a location.
async fn acquire_location(
    backend: Arc<dyn GeolocationBackend>,
    slots: Arc<CaptureSlots>,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, backend.current_position()).await {
        Ok(Ok(location)) => {
            tracing::info!(
                backend = backend.name(),
                latitude = location.latitude,
                longitude = location.longitude,
                "Location acquired"
            );
            slots.set_location(location);
        }
        Ok(Err(e)) => {
            tracing::warn!(backend = backend.name(), error = %e, "Geolocation failed");
        }
        Err(_) => {
            tracing::warn!(
                backend = backend.name(),
                timeout_s = timeout.as_secs(),
                "Geolocation timed out"
            );
        }
    }
}

// ============================================================================
// Test backends
// ============================================================================


// ============================================================================
// TESTS
// ============================================================================
