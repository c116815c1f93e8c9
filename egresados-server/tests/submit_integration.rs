//! Submission intake integration tests — multipart POST through the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use tower::util::ServiceExt;

use egresados_core::models::{
    Acompanante, Actividad, DeviceInfo, FormFields, Horario, Lugar, Programa, SessionRecord,
    TipoEvento, VideoAsset,
};
use egresados_core::{EgresadosConfig, RespuestaStore};
use egresados_server::http::{build_router, HttpState};

const BOUNDARY: &str = "X-EGRESADOS-TEST-BOUNDARY";
const WEBM_BYTES: &[u8] = b"\x1a\x45\xdf\xa3uploaded-video";

async fn test_app() -> (Router, RespuestaStore) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let store = RespuestaStore::new(pool);
    store.init_schema().await.expect("schema");

    let state = Arc::new(HttpState {
        store: store.clone(),
        config: EgresadosConfig::default(),
    });
    (build_router(state), store)
}

/// Wire payload a browser client would put in the `datos` part.
fn datos_payload(session_id: &str) -> serde_json::Value {
    let mut record = SessionRecord::new(DeviceInfo::from_host());
    record.session_id = session_id.to_string();
    let t0 = record.start_time;
    record.enter_step("step1", t0);
    record.complete_step("step1", t0 + Duration::seconds(4));
    record.bump_attempts("step3");
    record.video = Some(VideoAsset {
        data: Default::default(),
        size: 0,
        mime_type: "video/webm".to_string(),
        duration: 3.0,
        recorded_at: t0 + Duration::seconds(7),
    });
    record.fields = Some(FormFields {
        nombre: "Sofía Hernández".to_string(),
        email: "sofia@example.com".to_string(),
        telefono: "5512348765".to_string(),
        programa: Programa::MaestriaAdministracion,
        tipo_evento: TipoEvento::Formal,
        horario: Horario::Manana,
        actividades: vec![Actividad::Discursos],
        lugar: Lugar::SalonEventos,
        acompanante: Acompanante::Si,
        sugerencias: "Todo excelente".to_string(),
    });
    record.end_time = Some(t0 + Duration::seconds(90));
    serde_json::to_value(&record).expect("wire payload")
}

fn multipart_request(datos: Option<&str>, video: Option<(&str, &str, &[u8])>) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    if let Some(datos) = datos {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"datos\"\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(datos.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    if let Some((filename, mime, data)) = video {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/submit-form")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_submit_form_end_to_end() {
    let (app, store) = test_app().await;
    let datos = datos_payload("session_1700000000000_itest0001").to_string();

    let (status, body) = send(
        &app,
        multipart_request(Some(&datos), Some(("video_session.webm", "video/webm", WEBM_BYTES))),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "unexpected body: {body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["sessionId"], "session_1700000000000_itest0001");
    let id = body["respuestaId"].as_i64().expect("store-assigned id");

    // The stored record carries the uploaded bytes with server-derived size.
    let stored = store.get_by_id(id).await.unwrap().expect("persisted");
    let video = stored.video.expect("video stored");
    assert_eq!(video.data.as_ref(), WEBM_BYTES);
    assert_eq!(video.size, WEBM_BYTES.len() as u64);
    assert_eq!(video.duration, 3.0);
    assert_eq!(stored.nombre, "Sofía Hernández");
    assert!(stored.created_at <= Utc::now());
}

#[tokio::test]
async fn test_submit_form_duplicate_session_is_conflict() {
    let (app, store) = test_app().await;
    let datos = datos_payload("session_1700000000000_dup000001").to_string();
    let video = Some(("video.webm", "video/webm", WEBM_BYTES));

    let (status, _) = send(&app, multipart_request(Some(&datos), video)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, multipart_request(Some(&datos), video)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");

    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_submit_form_without_video_is_rejected() {
    let (app, store) = test_app().await;
    let datos = datos_payload("session_1700000000000_novideo01").to_string();

    let (status, body) = send(&app, multipart_request(Some(&datos), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No se recibió el video");
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_submit_form_rejects_malformed_datos() {
    let (app, store) = test_app().await;

    let (status, body) = send(
        &app,
        multipart_request(Some("not-json"), Some(("v.webm", "video/webm", WEBM_BYTES))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Datos inválidos"));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_submit_form_rejects_disallowed_extension() {
    let (app, store) = test_app().await;
    let datos = datos_payload("session_1700000000000_badext001").to_string();

    let (status, body) = send(
        &app,
        multipart_request(Some(&datos), Some(("clip.avi", "video/avi", WEBM_BYTES))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Tipo de archivo no permitido");
    assert_eq!(store.count().await.unwrap(), 0);
}
