//! Submission pipeline.
//!
//! Sequence on submit, each failure handled independently:
//! 1. the final step's gate (fails closed — no partial save);
//! 2. settle any in-flight capture so the snapshot never carries a
//!    half-written asset;
//! 3. persist the snapshot locally — the only fatal failure: the session
//!    stays on the final step and the user may retry;
//! 4. best-effort relay (media upload, then notification) — failures are
//!    logged and never affect the outcome;
//! 5. transition the navigator to Success.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::capture::{CaptureConfig, CaptureHandle};
use crate::error::EgresadosError;
use crate::models::SessionRecord;
use crate::relay::{MediaStoreClient, NotificationClient};
use crate::store::RespuestaStore;
use crate::wizard::{WizardSession, WizardState};

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub id: i64,
    pub session_id: String,
    pub video_url: Option<String>,
}

pub struct SubmissionPipeline {
    store: RespuestaStore,
    media: Option<MediaStoreClient>,
    notifier: Option<NotificationClient>,
    settle_bound: Duration,
}

impl SubmissionPipeline {
    pub fn new(store: RespuestaStore, capture: &CaptureConfig) -> Self {
        Self {
            store,
            media: None,
            notifier: None,
            settle_bound: capture.settle_bound(),
        }
    }

    pub fn with_media(mut self, client: MediaStoreClient) -> Self {
        self.media = Some(client);
        self
    }

    pub fn with_notifier(mut self, client: NotificationClient) -> Self {
        self.notifier = Some(client);
        self
    }

    /// Run the submission for the given session. On success the session is in
    /// the Success state; on error it is unchanged and the user may retry.
    pub async fn submit(
        &self,
        session: &mut WizardSession,
        capture: Option<CaptureHandle>,
    ) -> Result<SubmissionReceipt, EgresadosError> {
        if session.state() == WizardState::Success {
            return Err(EgresadosError::Validation {
                step: 5,
                reason: "la sesión ya fue enviada".to_string(),
            });
        }

        session.validate_current()?;

        if let Some(handle) = capture {
            handle.settle(self.settle_bound).await;
        }

        let snapshot = session.snapshot()?;
        let id = self.store.save(&snapshot).await?;

        let video_url = self.relay(&snapshot).await;

        session.mark_completed();
        Ok(SubmissionReceipt {
            id,
            session_id: snapshot.session_id,
            video_url,
        })
    }

    /// Best-effort forwarding to the external collaborators. Never fails the
    /// submission; returns the media URL when the upload succeeded.
    async fn relay(&self, record: &SessionRecord) -> Option<String> {
        let mut video_url = None;

        if let (Some(media), Some(asset)) = (self.media.as_ref(), record.video.as_ref()) {
            match media.upload_video(asset, &record.session_id).await {
                Ok(info) => video_url = Some(info.url),
                Err(e) => {
                    tracing::warn!(session_id = %record.session_id, error = %e, "Video relay failed")
                }
            }
        }

        if let Some(notifier) = self.notifier.as_ref() {
            let params = notification_params(record, video_url.as_deref());
            if let Err(e) = notifier.send(&params).await {
                tracing::warn!(session_id = %record.session_id, error = %e, "Notification relay failed");
            }
        }

        video_url
    }
}

/// Flat key-value parameter set for the notification template. Uses the
/// human-readable labels; anything unavailable becomes "No disponible".
pub fn notification_params(
    record: &SessionRecord,
    video_url: Option<&str>,
) -> BTreeMap<String, String> {
    const NO_DISPONIBLE: &str = "No disponible";

    let mut params = BTreeMap::new();
    params.insert("sessionId".to_string(), record.session_id.clone());

    if let Some(fields) = record.fields.as_ref() {
        params.insert("nombre".to_string(), fields.nombre.clone());
        params.insert("email".to_string(), fields.email.clone());
        params.insert("telefono".to_string(), fields.telefono.clone());
        params.insert("programa".to_string(), fields.programa.label().to_string());
        params.insert(
            "tipoEvento".to_string(),
            fields.tipo_evento.label().to_string(),
        );
        params.insert("horario".to_string(), fields.horario.label().to_string());
        params.insert(
            "actividades".to_string(),
            fields
                .actividades
                .iter()
                .map(|a| a.label())
                .collect::<Vec<_>>()
                .join(", "),
        );
        params.insert("lugar".to_string(), fields.lugar.label().to_string());
        params.insert(
            "acompanante".to_string(),
            fields.acompanante.label().to_string(),
        );
        let sugerencias = if fields.sugerencias.is_empty() {
            "Sin sugerencias".to_string()
        } else {
            fields.sugerencias.clone()
        };
        params.insert("sugerencias".to_string(), sugerencias);
    }

    match record.location.as_ref() {
        Some(location) => {
            params.insert(
                "ubicacion".to_string(),
                format!(
                    "Latitud: {:.6}, Longitud: {:.6} (Precisión: {:.0}m)",
                    location.latitude,
                    location.longitude,
                    location.accuracy.unwrap_or(0.0)
                ),
            );
            params.insert(
                "googleMapsLink".to_string(),
                format!(
                    "https://www.google.com/maps?q={},{}",
                    location.latitude, location.longitude
                ),
            );
        }
        None => {
            params.insert("ubicacion".to_string(), NO_DISPONIBLE.to_string());
            params.insert("googleMapsLink".to_string(), NO_DISPONIBLE.to_string());
        }
    }

    params.insert(
        "videoUrl".to_string(),
        video_url.unwrap_or(NO_DISPONIBLE).to_string(),
    );

    params
}

// ============================================================================
// TESTS
// ============================================================================
