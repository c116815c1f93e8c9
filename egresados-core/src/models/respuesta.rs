//! Persisted submissions and the read-side projections served to the
//! admin dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::device::DeviceInfo;
use super::labels::{Acompanante, Actividad, Horario, Lugar, Programa, TipoEvento};
use super::session::{LocationData, StepTiming, VideoAsset};

/// The persisted form of a completed session record: the snapshot plus a
/// store-assigned integer id and a creation stamp. Created once at successful
/// submission, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRespuesta {
    pub id: i64,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub nombre: String,
    pub email: String,
    pub telefono: String,
    pub programa: Programa,
    pub tipo_evento: TipoEvento,
    pub horario: Horario,
    pub lugar: Lugar,
    pub acompanante: Acompanante,
    pub sugerencias: String,
    pub actividades: Vec<Actividad>,
    pub step_times: BTreeMap<String, StepTiming>,
    pub validation_attempts: BTreeMap<String, u32>,
    pub device_info: DeviceInfo,
    pub ubicacion: Option<LocationData>,
    pub video: Option<VideoAsset>,
}

impl StoredRespuesta {
    /// Total time spent in the wizard, in seconds.
    pub fn duracion_total_segundos(&self) -> f64 {
        ((self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0).max(0.0)
    }

    /// Sum of validation attempts across all steps.
    pub fn intentos_validacion_total(&self) -> u32 {
        self.validation_attempts.values().sum()
    }
}

/// Listing row for the paginated admin view. Carries the location triple so
/// the dashboard can draw map pins without fetching each detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespuestaSummary {
    pub id: i64,
    pub session_id: String,
    pub nombre: String,
    pub email: String,
    pub telefono: String,
    pub programa: Programa,
    pub tipo_evento: TipoEvento,
    pub horario: Horario,
    pub lugar: Lugar,
    pub acompanante: Acompanante,
    pub created_at: DateTime<Utc>,
    pub duracion_total_segundos: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramaCount {
    pub programa: Programa,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorarioCount {
    pub horario: Horario,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActividadCount {
    pub actividad: Actividad,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UltimaRespuesta {
    pub id: i64,
    pub nombre: String,
    pub programa: Programa,
    pub created_at: DateTime<Utc>,
}

/// Aggregates for the dashboard landing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_respuestas: i64,
    pub respuestas_hoy: i64,
    /// Average completion time in seconds; 0 when the store is empty.
    pub tiempo_promedio: f64,
    pub por_programa: Vec<ProgramaCount>,
    pub horarios: Vec<HorarioCount>,
    pub actividades_top: Vec<ActividadCount>,
    pub ultimas_respuestas: Vec<UltimaRespuesta>,
}
