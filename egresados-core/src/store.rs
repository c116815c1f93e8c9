//! Local record store for finalized submissions.
//!
//! One row per completed session, keyed by an auto-assigned integer id with a
//! unique secondary index on the session id (a duplicate save is a Conflict,
//! never a silent overwrite) and non-unique indexes on email, creation time
//! and programa. Telemetry and capture metadata live in JSON columns; the
//! video bytes live in a blob column. Rows are append-only and individually
//! deletable.

use bytes::Bytes;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::EgresadosError;
use crate::models::{
    ActividadCount, DashboardStats, HorarioCount, LocationData, Programa, ProgramaCount,
    RespuestaSummary, SessionRecord, StoredRespuesta, UltimaRespuesta, VideoAsset,
};

const CREATE_RESPUESTAS: &str = r#"
CREATE TABLE IF NOT EXISTS respuestas (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    nombre TEXT NOT NULL,
    email TEXT NOT NULL,
    telefono TEXT NOT NULL,
    programa TEXT NOT NULL,
    tipo_evento TEXT NOT NULL,
    horario TEXT NOT NULL,
    lugar TEXT NOT NULL,
    acompanante TEXT NOT NULL,
    sugerencias TEXT NOT NULL DEFAULT '',
    actividades TEXT NOT NULL,
    step_times TEXT NOT NULL,
    validation_attempts TEXT NOT NULL,
    device_info TEXT NOT NULL,
    ubicacion TEXT,
    video_metadata TEXT,
    video_data BLOB
)
"#;

const CREATE_INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_respuestas_session_id ON respuestas(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_respuestas_email ON respuestas(email)",
    "CREATE INDEX IF NOT EXISTS idx_respuestas_created_at ON respuestas(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_respuestas_programa ON respuestas(programa)",
];

#[derive(Clone)]
pub struct RespuestaStore {
    pool: SqlitePool,
}

impl RespuestaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes. Idempotent; concurrent callers all observe
    /// the same store once any one call completes.
    pub async fn init_schema(&self) -> Result<(), EgresadosError> {
        sqlx::query(CREATE_RESPUESTAS).execute(&self.pool).await?;
        for ddl in CREATE_INDEXES {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Persist a completed snapshot, assigning the integer id and the
    /// creation stamp. The snapshot must carry finalized fields and an end
    /// time; a duplicate session id fails with [`EgresadosError::Conflict`].
    pub async fn save(&self, record: &SessionRecord) -> Result<i64, EgresadosError> {
        let fields = record.fields.as_ref().ok_or(EgresadosError::Validation {
            step: 5,
            reason: "el registro no tiene respuestas finalizadas".to_string(),
        })?;
        let end_time = record.end_time.ok_or(EgresadosError::Validation {
            step: 5,
            reason: "el registro no tiene hora de término".to_string(),
        })?;

        let created_at = Utc::now();
        let actividades = serde_json::to_string(&fields.actividades)?;
        let step_times = serde_json::to_string(&record.step_times)?;
        let validation_attempts = serde_json::to_string(&record.validation_attempts)?;
        let device_info = serde_json::to_string(&record.device_info)?;
        let ubicacion = record
            .location
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let video_metadata = record
            .video
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let video_data = record.video.as_ref().map(|v| v.data.to_vec());

        let result = sqlx::query(
            r#"
            INSERT INTO respuestas (
                session_id, created_at, start_time, end_time,
                nombre, email, telefono, programa,
                tipo_evento, horario, lugar, acompanante, sugerencias,
                actividades, step_times, validation_attempts, device_info,
                ubicacion, video_metadata, video_data
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.session_id)
        .bind(created_at)
        .bind(record.start_time)
        .bind(end_time)
        .bind(&fields.nombre)
        .bind(&fields.email)
        .bind(&fields.telefono)
        .bind(fields.programa.as_str())
        .bind(fields.tipo_evento.as_str())
        .bind(fields.horario.as_str())
        .bind(fields.lugar.as_str())
        .bind(fields.acompanante.as_str())
        .bind(&fields.sugerencias)
        .bind(&actividades)
        .bind(&step_times)
        .bind(&validation_attempts)
        .bind(&device_info)
        .bind(&ubicacion)
        .bind(&video_metadata)
        .bind(&video_data)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                let id = done.last_insert_rowid();
                tracing::info!(id, session_id = %record.session_id, "Respuesta guardada");
                Ok(id)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(EgresadosError::Conflict {
                    session_id: record.session_id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<StoredRespuesta>, EgresadosError> {
        let row: Option<RespuestaRow> =
            sqlx::query_as("SELECT * FROM respuestas WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(RespuestaRow::into_respuesta).transpose()
    }

    /// Secondary lookup by the wizard's opaque session identifier.
    pub async fn get_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<StoredRespuesta>, EgresadosError> {
        let row: Option<RespuestaRow> =
            sqlx::query_as("SELECT * FROM respuestas WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(RespuestaRow::into_respuesta).transpose()
    }

    pub async fn list_all(&self) -> Result<Vec<RespuestaSummary>, EgresadosError> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT id, session_id, nombre, email, telefono, programa, tipo_evento,
                    horario, lugar, acompanante, created_at, start_time, end_time, ubicacion
             FROM respuestas ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    /// One page of summaries (1-based page number) plus the total row count.
    pub async fn list_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<RespuestaSummary>, i64), EgresadosError> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = (page as i64 - 1) * per_page as i64;

        let total = self.count().await?;
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT id, session_id, nombre, email, telefono, programa, tipo_evento,
                    horario, lugar, acompanante, created_at, start_time, end_time, ubicacion
             FROM respuestas ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let summaries = rows
            .into_iter()
            .map(SummaryRow::into_summary)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((summaries, total))
    }

    pub async fn delete(&self, id: i64) -> Result<bool, EgresadosError> {
        let done = sqlx::query("DELETE FROM respuestas WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let deleted = done.rows_affected() > 0;
        if deleted {
            tracing::info!(id, "Respuesta eliminada");
        }
        Ok(deleted)
    }

    pub async fn count(&self) -> Result<i64, EgresadosError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM respuestas")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Raw video bytes and mime type for one respuesta, when it has a video.
    pub async fn video_content(
        &self,
        id: i64,
    ) -> Result<Option<(Vec<u8>, String)>, EgresadosError> {
        let row: Option<(Option<Vec<u8>>, Option<String>)> =
            sqlx::query_as("SELECT video_data, video_metadata FROM respuestas WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((data, metadata)) = row else {
            return Ok(None);
        };
        let Some(data) = data else {
            return Ok(None);
        };
        let mime_type = match metadata {
            Some(json) => serde_json::from_str::<VideoAsset>(&json)?.mime_type,
            None => "video/webm".to_string(),
        };
        Ok(Some((data, mime_type)))
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, EgresadosError> {
        let total_respuestas = self.count().await?;

        let day_start = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let hoy: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM respuestas WHERE created_at >= ?")
            .bind(day_start)
            .fetch_one(&self.pool)
            .await?;

        let programa_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT programa, COUNT(*) AS count FROM respuestas
             GROUP BY programa ORDER BY count DESC, programa ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let por_programa = parse_counts(programa_rows, |programa, count| ProgramaCount {
            programa,
            count,
        });

        let horario_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT horario, COUNT(*) AS count FROM respuestas
             GROUP BY horario ORDER BY count DESC, horario ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let horarios = parse_counts(horario_rows, |horario, count| HorarioCount { horario, count });

        let actividad_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT j.value AS actividad, COUNT(*) AS count
             FROM respuestas r, json_each(r.actividades) j
             GROUP BY j.value ORDER BY count DESC, j.value ASC LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await?;
        let actividades_top = parse_counts(actividad_rows, |actividad, count| ActividadCount {
            actividad,
            count,
        });

        let spans: Vec<(DateTime<Utc>, DateTime<Utc>)> =
            sqlx::query_as("SELECT start_time, end_time FROM respuestas")
                .fetch_all(&self.pool)
                .await?;
        let tiempo_promedio = if spans.is_empty() {
            0.0
        } else {
            let sum: f64 = spans
                .iter()
                .map(|(start, end)| ((*end - *start).num_milliseconds() as f64 / 1000.0).max(0.0))
                .sum();
            sum / spans.len() as f64
        };

        let ultima_rows: Vec<(i64, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, nombre, programa, created_at FROM respuestas
             ORDER BY created_at DESC LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await?;
        let ultimas_respuestas = ultima_rows
            .into_iter()
            .filter_map(|(id, nombre, programa, created_at)| {
                match Programa::from_str(&programa) {
                    Ok(programa) => Some(UltimaRespuesta {
                        id,
                        nombre,
                        programa,
                        created_at,
                    }),
                    Err(e) => {
                        tracing::warn!(id, error = %e, "Fila con programa desconocido, omitida");
                        None
                    }
                }
            })
            .collect();

        Ok(DashboardStats {
            total_respuestas,
            respuestas_hoy: hoy.0,
            tiempo_promedio,
            por_programa,
            horarios,
            actividades_top,
            ultimas_respuestas,
        })
    }
}

/// Parse `(wire_key, count)` rows into typed counts, dropping (and logging)
/// rows whose key no longer parses.
fn parse_counts<T, C, F>(rows: Vec<(String, i64)>, build: F) -> Vec<C>
where
    T: FromStr<Err = crate::models::UnknownLabel>,
    F: Fn(T, i64) -> C,
{
    rows.into_iter()
        .filter_map(|(key, count)| match T::from_str(&key) {
            Ok(value) => Some(build(value, count)),
            Err(e) => {
                tracing::warn!(error = %e, "Clave de categoría desconocida, omitida");
                None
            }
        })
        .collect()
}

#[derive(sqlx::FromRow)]
struct RespuestaRow {
    id: i64,
    session_id: String,
    created_at: DateTime<Utc>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    nombre: String,
    email: String,
    telefono: String,
    programa: String,
    tipo_evento: String,
    horario: String,
    lugar: String,
    acompanante: String,
    sugerencias: String,
    actividades: String,
    step_times: String,
    validation_attempts: String,
    device_info: String,
    ubicacion: Option<String>,
    video_metadata: Option<String>,
    video_data: Option<Vec<u8>>,
}

impl RespuestaRow {
    fn into_respuesta(self) -> Result<StoredRespuesta, EgresadosError> {
        let video = match self.video_metadata {
            Some(json) => {
                let mut asset: VideoAsset = serde_json::from_str(&json)?;
                asset.data = Bytes::from(self.video_data.unwrap_or_default());
                Some(asset)
            }
            None => None,
        };
        let ubicacion = self
            .ubicacion
            .as_deref()
            .map(serde_json::from_str::<LocationData>)
            .transpose()?;

        Ok(StoredRespuesta {
            id: self.id,
            session_id: self.session_id,
            created_at: self.created_at,
            start_time: self.start_time,
            end_time: self.end_time,
            nombre: self.nombre,
            email: self.email,
            telefono: self.telefono,
            programa: parse_label(&self.programa)?,
            tipo_evento: parse_label(&self.tipo_evento)?,
            horario: parse_label(&self.horario)?,
            lugar: parse_label(&self.lugar)?,
            acompanante: parse_label(&self.acompanante)?,
            sugerencias: self.sugerencias,
            actividades: serde_json::from_str(&self.actividades)?,
            step_times: serde_json::from_str(&self.step_times)?,
            validation_attempts: serde_json::from_str(&self.validation_attempts)?,
            device_info: serde_json::from_str(&self.device_info)?,
            ubicacion,
            video,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: i64,
    session_id: String,
    nombre: String,
    email: String,
    telefono: String,
    programa: String,
    tipo_evento: String,
    horario: String,
    lugar: String,
    acompanante: String,
    created_at: DateTime<Utc>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    ubicacion: Option<String>,
}

impl SummaryRow {
    fn into_summary(self) -> Result<RespuestaSummary, EgresadosError> {
        let location = self
            .ubicacion
            .as_deref()
            .map(serde_json::from_str::<LocationData>)
            .transpose()?;

        Ok(RespuestaSummary {
            id: self.id,
            session_id: self.session_id,
            nombre: self.nombre,
            email: self.email,
            telefono: self.telefono,
            programa: parse_label(&self.programa)?,
            tipo_evento: parse_label(&self.tipo_evento)?,
            horario: parse_label(&self.horario)?,
            lugar: parse_label(&self.lugar)?,
            acompanante: parse_label(&self.acompanante)?,
            created_at: self.created_at,
            duracion_total_segundos: ((self.end_time - self.start_time).num_milliseconds() as f64
                / 1000.0)
                .max(0.0),
            latitude: location.as_ref().map(|l| l.latitude),
            longitude: location.as_ref().map(|l| l.longitude),
            accuracy: location.as_ref().and_then(|l| l.accuracy),
        })
    }
}

fn parse_label<T>(key: &str) -> Result<T, EgresadosError>
where
    T: FromStr<Err = crate::models::UnknownLabel>,
{
    T::from_str(key).map_err(|e| EgresadosError::Other(e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
