//! In-memory session record for one wizard attempt.
//!
//! The record accumulates telemetry (per-step timings, validation attempts),
//! the device snapshot, and the asynchronously captured location/video as they
//! become available. Late-arriving capture writes are always accepted; a
//! snapshot taken at submission time freezes whatever is known at that point.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::labels::{Acompanante, Actividad, Horario, Lugar, Programa, TipoEvento};
use super::device::DeviceInfo;

/// Timing entry for one visited step. `completed`/`duration` appear only once
/// the user has navigated away; `duration` is derived and never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTiming {
    pub entered: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    /// Seconds between `entered` and `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl StepTiming {
    pub fn enter(now: DateTime<Utc>) -> Self {
        Self {
            entered: now,
            completed: None,
            duration: None,
        }
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.completed = Some(now);
        let seconds = (now - self.entered).num_milliseconds() as f64 / 1000.0;
        self.duration = Some(seconds.max(0.0));
    }
}

/// Single-shot geolocation fix. Written at most once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationData {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub altitude_accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Finalized video capture: raw encoded bytes plus metadata. The bytes are
/// never serialized to JSON; they travel as a separate multipart part and live
/// in a blob column in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAsset {
    #[serde(skip)]
    pub data: Bytes,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Recorded wall-clock duration in seconds.
    pub duration: f64,
    pub recorded_at: DateTime<Utc>,
}

/// The user-entered answers, finalized at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFields {
    pub nombre: String,
    pub email: String,
    pub telefono: String,
    pub programa: Programa,
    pub tipo_evento: TipoEvento,
    pub horario: Horario,
    pub actividades: Vec<Actividad>,
    pub lugar: Lugar,
    pub acompanante: Acompanante,
    #[serde(default)]
    pub sugerencias: String,
}

/// One form attempt. Owned by the active wizard session; exactly one per
/// browser tab / process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub step_times: BTreeMap<String, StepTiming>,
    pub validation_attempts: BTreeMap<String, u32>,
    pub device_info: DeviceInfo,
    #[serde(rename = "ubicacion", skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationData>,
    #[serde(rename = "videoMetadata", skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoAsset>,
    #[serde(flatten)]
    pub fields: Option<FormFields>,
}

impl SessionRecord {
    pub fn new(device_info: DeviceInfo) -> Self {
        Self {
            session_id: generate_session_id(),
            start_time: Utc::now(),
            end_time: None,
            step_times: BTreeMap::new(),
            validation_attempts: BTreeMap::new(),
            device_info,
            location: None,
            video: None,
            fields: None,
        }
    }

    /// Stamp the entry timestamp for a step. Re-entry replaces the whole
    /// timing entry, discarding the earlier visit's completion.
    pub fn enter_step(&mut self, step_key: &str, now: DateTime<Utc>) {
        self.step_times
            .insert(step_key.to_string(), StepTiming::enter(now));
    }

    /// Stamp the completion timestamp for a step, deriving the duration.
    /// A completion without a prior entry is ignored.
    pub fn complete_step(&mut self, step_key: &str, now: DateTime<Utc>) {
        if let Some(timing) = self.step_times.get_mut(step_key) {
            timing.complete(now);
        }
    }

    /// Increment a step's validation attempt counter, returning the new count.
    pub fn bump_attempts(&mut self, step_key: &str) -> u32 {
        let counter = self
            .validation_attempts
            .entry(step_key.to_string())
            .or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn attempts(&self, step_key: &str) -> u32 {
        self.validation_attempts.get(step_key).copied().unwrap_or(0)
    }
}

/// Session ids follow the legacy shape: `session_{unix_millis}_{entropy}`.
pub fn generate_session_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("session_{}_{}", millis, suffix)
}
