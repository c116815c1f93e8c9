//! Egresados HTTP API
//!
//! Axum-based HTTP server exposing the submission intake and the
//! administrative read API over the local record store.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! pure inner function. The inner functions are directly testable without
//! axum dispatch machinery.
//!
//! Endpoints:
//! - GET    /api/health                  — health check with DB status
//! - GET    /api/version                 — server version info
//! - POST   /api/submit-form             — multipart intake (datos JSON + video)
//! - GET    /api/admin/respuestas        — paginated listing
//! - GET    /api/admin/respuesta/{id}    — single-record detail
//! - DELETE /api/admin/respuesta/{id}    — delete one record
//! - GET    /api/admin/video/{id}        — raw video bytes
//! - GET    /api/admin/dashboard         — aggregate statistics

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use egresados_core::db;
use egresados_core::models::{SessionRecord, VideoAsset};
use egresados_core::{EgresadosConfig, EgresadosError, RespuestaStore};

const ALLOWED_VIDEO_EXTENSIONS: &[&str] = &["webm", "mp4", "mov"];

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: RespuestaStore,
    pub config: EgresadosConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let max_body = state.config.http.max_video_bytes;
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/version", get(version_handler))
        .route("/api/submit-form", post(submit_form_handler))
        .route("/api/admin/respuestas", get(respuestas_handler))
        .route(
            "/api/admin/respuesta/:id",
            get(respuesta_detail_handler).delete(delete_respuesta_handler),
        )
        .route("/api/admin/video/:id", get(video_handler))
        .route("/api/admin/dashboard", get(dashboard_handler))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    store: RespuestaStore,
    config: EgresadosConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState { store, config });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Egresados HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

/// Parsed parts of the multipart submission body.
#[derive(Debug, Default)]
pub struct SubmitParts {
    pub datos: Option<String>,
    pub video: Option<VideoPart>,
}

#[derive(Debug)]
pub struct VideoPart {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn status_for(error: &EgresadosError) -> StatusCode {
    match error {
        EgresadosError::Conflict { .. } => StatusCode::CONFLICT,
        EgresadosError::Validation { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — queries the DB and returns (status_code, json_body).
pub async fn health_inner(store: &RespuestaStore, database_url: &str) -> (StatusCode, serde_json::Value) {
    let sqlite_version = match db::health_check(store.pool()).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                }),
            );
        }
    };

    let total = store.count().await.unwrap_or(0);

    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "sqlite": sqlite_version,
            "database": database_url,
            "respuestas": total,
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "egresados/1",
    })
}

/// Inner submit — validates the multipart parts and persists the record.
pub async fn submit_form_inner(
    store: &RespuestaStore,
    parts: SubmitParts,
) -> (StatusCode, serde_json::Value) {
    let Some(datos) = parts.datos else {
        return bad_request("No se recibieron datos");
    };

    let mut record: SessionRecord = match serde_json::from_str(&datos) {
        Ok(record) => record,
        Err(e) => {
            return bad_request(format!("Datos inválidos: {}", e));
        }
    };

    let Some(video) = parts.video else {
        return bad_request("No se recibió el video");
    };
    if video.filename.is_empty() {
        return bad_request("Nombre de archivo vacío");
    }
    if !allowed_file(&video.filename) {
        return bad_request("Tipo de archivo no permitido");
    }
    if record.fields.is_none() {
        return bad_request("Faltan campos del formulario");
    }

    // Marry the raw bytes with the client-reported metadata; the server is
    // authoritative for the size.
    let size = video.data.len() as u64;
    record.video = Some(match record.video.take() {
        Some(mut asset) => {
            asset.data = video.data;
            asset.size = size;
            asset
        }
        None => VideoAsset {
            data: video.data,
            size,
            mime_type: video
                .content_type
                .unwrap_or_else(|| "video/webm".to_string()),
            duration: 0.0,
            recorded_at: Utc::now(),
        },
    });

    if record.end_time.is_none() {
        record.end_time = Some(Utc::now());
    }

    match store.save(&record).await {
        Ok(id) => (
            StatusCode::OK,
            serde_json::json!({
                "success": true,
                "message": "Formulario guardado exitosamente",
                "respuestaId": id,
                "sessionId": record.session_id,
            }),
        ),
        Err(e) => {
            tracing::error!(session_id = %record.session_id, error = %e, "Submit failed");
            (
                status_for(&e),
                serde_json::json!({
                    "error": "Error al procesar el formulario",
                    "details": e.to_string(),
                    "status": "error",
                }),
            )
        }
    }
}

/// Inner paginated listing.
pub async fn respuestas_inner(
    store: &RespuestaStore,
    page: u32,
    per_page: u32,
) -> (StatusCode, serde_json::Value) {
    let page = page.max(1);
    let per_page = per_page.max(1);
    match store.list_page(page, per_page).await {
        Ok((respuestas, total)) => {
            let total_pages = (total + per_page as i64 - 1) / per_page as i64;
            (
                StatusCode::OK,
                serde_json::json!({
                    "respuestas": respuestas,
                    "total": total,
                    "page": page,
                    "per_page": per_page,
                    "total_pages": total_pages,
                }),
            )
        }
        Err(e) => internal_error(e),
    }
}

/// Inner single-record detail, shaped for the dashboard's detail panel.
pub async fn respuesta_detail_inner(
    store: &RespuestaStore,
    id: i64,
) -> (StatusCode, serde_json::Value) {
    let respuesta = match store.get_by_id(id).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": "Respuesta no encontrada"}),
            );
        }
        Err(e) => return internal_error(e),
    };

    (
        StatusCode::OK,
        serde_json::json!({
            "respuesta": {
                "id": respuesta.id,
                "session_id": respuesta.session_id,
                "created_at": respuesta.created_at,
                "start_time": respuesta.start_time,
                "end_time": respuesta.end_time,
                "nombre": respuesta.nombre,
                "email": respuesta.email,
                "telefono": respuesta.telefono,
                "programa": respuesta.programa,
                "tipo_evento": respuesta.tipo_evento,
                "horario": respuesta.horario,
                "lugar": respuesta.lugar,
                "acompanante": respuesta.acompanante,
                "sugerencias": respuesta.sugerencias,
                "duracion_total_segundos": respuesta.duracion_total_segundos(),
                "intentos_validacion_total": respuesta.intentos_validacion_total(),
            },
            "video": respuesta.video,
            "ubicacion": respuesta.ubicacion,
            "actividades": respuesta.actividades,
            "dispositivo": respuesta.device_info,
            "step_times": respuesta.step_times,
            "validation_attempts": respuesta.validation_attempts,
        }),
    )
}

/// Inner delete.
pub async fn delete_respuesta_inner(
    store: &RespuestaStore,
    id: i64,
) -> (StatusCode, serde_json::Value) {
    match store.delete(id).await {
        Ok(deleted) => (StatusCode::OK, serde_json::json!({"deleted": deleted})),
        Err(e) => internal_error(e),
    }
}

/// Inner video fetch — raw bytes plus mime type.
pub async fn video_inner(
    store: &RespuestaStore,
    id: i64,
) -> Result<(Vec<u8>, String), (StatusCode, serde_json::Value)> {
    match store.video_content(id).await {
        Ok(Some(content)) => Ok(content),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            serde_json::json!({"error": "Video no encontrado"}),
        )),
        Err(e) => Err(internal_error(e)),
    }
}

/// Inner dashboard statistics.
pub async fn dashboard_inner(store: &RespuestaStore) -> (StatusCode, serde_json::Value) {
    match store.dashboard_stats().await {
        Ok(stats) => match serde_json::to_value(&stats) {
            Ok(value) => (StatusCode::OK, value),
            Err(e) => internal_error(EgresadosError::Serialization(e)),
        },
        Err(e) => internal_error(e),
    }
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!({"error": msg.into(), "status": "error"}),
    )
}

fn internal_error(e: EgresadosError) -> (StatusCode, serde_json::Value) {
    tracing::error!(error = %e, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        serde_json::json!({"error": e.to_string(), "status": "error"}),
    )
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.store, &state.config.database.url).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn submit_form_handler(
    State(state): State<Arc<HttpState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut parts = SubmitParts::default();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => match field.name().map(str::to_string).as_deref() {
                Some("datos") => match field.text().await {
                    Ok(text) => parts.datos = Some(text),
                    Err(e) => {
                        let (status, body) = bad_request(format!("Datos ilegibles: {}", e));
                        return (status, Json(body));
                    }
                },
                Some("video") => {
                    let filename = field.file_name().unwrap_or("video.webm").to_string();
                    let content_type = field.content_type().map(str::to_string);
                    match field.bytes().await {
                        Ok(data) => {
                            parts.video = Some(VideoPart {
                                filename,
                                content_type,
                                data,
                            });
                        }
                        Err(e) => {
                            let (status, body) = bad_request(format!("Video ilegible: {}", e));
                            return (status, Json(body));
                        }
                    }
                }
                _ => {}
            },
            Ok(None) => break,
            Err(e) => {
                let (status, body) = bad_request(format!("Multipart inválido: {}", e));
                return (status, Json(body));
            }
        }
    }

    let (status, body) = submit_form_inner(&state.store, parts).await;
    (status, Json(body))
}

pub async fn respuestas_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let per_page = query.per_page.unwrap_or(state.config.admin.per_page);
    let (status, body) =
        respuestas_inner(&state.store, query.page.unwrap_or(1), per_page).await;
    (status, Json(body))
}

pub async fn respuesta_detail_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let (status, body) = respuesta_detail_inner(&state.store, id).await;
    (status, Json(body))
}

pub async fn delete_respuesta_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let (status, body) = delete_respuesta_inner(&state.store, id).await;
    (status, Json(body))
}

pub async fn video_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<i64>,
) -> Response {
    match video_inner(&state.store, id).await {
        Ok((data, mime_type)) => {
            ([(header::CONTENT_TYPE, mime_type)], data).into_response()
        }
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

pub async fn dashboard_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = dashboard_inner(&state.store).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> RespuestaStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let store = RespuestaStore::new(pool);
        store.init_schema().await.expect("schema");
        store
    }

    // ========================================================================
    // TEST 1: version_inner is pure and returns correct fields
    // ========================================================================
    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["protocol"], "egresados/1");
    }

    // ========================================================================
    // TEST 2: allowed_file accepts the legacy extensions, case-insensitive
    // ========================================================================
    #[test]
    fn test_allowed_file_extensions() {
        assert!(allowed_file("video_session_1.webm"));
        assert!(allowed_file("clip.MP4"));
        assert!(allowed_file("clip.mov"));
        assert!(!allowed_file("clip.avi"));
        assert!(!allowed_file("noextension"));
    }

    // ========================================================================
    // TEST 3: health_inner reports healthy against a live store
    // ========================================================================
    #[tokio::test]
    async fn test_health_inner_ok() {
        let store = memory_store().await;
        let (status, body) = health_inner(&store, "sqlite::memory:").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert!(body["sqlite"].is_string());
        assert_eq!(body["respuestas"], 0);
    }

    // ========================================================================
    // TEST 4: submit_form_inner — missing datos part returns 400
    // ========================================================================
    #[tokio::test]
    async fn test_submit_inner_missing_datos() {
        let store = memory_store().await;
        let (status, body) = submit_form_inner(&store, SubmitParts::default()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No se recibieron datos");
    }

    /// Minimal parseable record payload, without form answers.
    fn minimal_datos() -> serde_json::Value {
        serde_json::json!({
            "sessionId": "session_1_minimal",
            "startTime": "2026-08-01T10:00:00Z",
            "stepTimes": {},
            "validationAttempts": {},
            "deviceInfo": {
                "userAgent": "test", "platform": "test", "language": "es",
                "screenResolution": null, "viewport": null, "touchSupport": false,
                "deviceMemory": "unknown", "hardwareConcurrency": "4", "timezone": "UTC"
            }
        })
    }

    // ========================================================================
    // TEST 5: submit_form_inner — missing video part returns 400
    // ========================================================================
    #[tokio::test]
    async fn test_submit_inner_missing_video() {
        let store = memory_store().await;
        let parts = SubmitParts {
            datos: Some(minimal_datos().to_string()),
            video: None,
        };
        let (status, body) = submit_form_inner(&store, parts).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No se recibió el video");
    }

    // ========================================================================
    // TEST 6: submit_form_inner — disallowed extension returns 400
    // ========================================================================
    #[tokio::test]
    async fn test_submit_inner_bad_extension() {
        let store = memory_store().await;
        let parts = SubmitParts {
            datos: Some(minimal_datos().to_string()),
            video: Some(VideoPart {
                filename: "clip.avi".to_string(),
                content_type: Some("video/avi".to_string()),
                data: Bytes::from_static(b"data"),
            }),
        };
        let (status, body) = submit_form_inner(&store, parts).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Tipo de archivo no permitido");
    }

    // ========================================================================
    // TEST 7: respuestas_inner — empty store paginates to zero pages
    // ========================================================================
    #[tokio::test]
    async fn test_respuestas_inner_empty() {
        let store = memory_store().await;
        let (status, body) = respuestas_inner(&store, 1, 10).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert_eq!(body["total_pages"], 0);
        assert_eq!(body["respuestas"].as_array().unwrap().len(), 0);
    }

    // ========================================================================
    // TEST 8: respuesta_detail_inner — unknown id returns 404
    // ========================================================================
    #[tokio::test]
    async fn test_detail_inner_not_found() {
        let store = memory_store().await;
        let (status, body) = respuesta_detail_inner(&store, 42).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Respuesta no encontrada");
    }

    // ========================================================================
    // TEST 9: video_inner — unknown id returns 404
    // ========================================================================
    #[tokio::test]
    async fn test_video_inner_not_found() {
        let store = memory_store().await;
        let err = video_inner(&store, 7).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    // ========================================================================
    // TEST 10: delete_respuesta_inner — idempotent delete reports false
    // ========================================================================
    #[tokio::test]
    async fn test_delete_inner_missing_is_false() {
        let store = memory_store().await;
        let (status, body) = delete_respuesta_inner(&store, 999).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], false);
    }
}
