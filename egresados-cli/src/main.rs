//! egresados-cli — admin console for the alumni-survey record store
//!
//! Talks to the egresados HTTP API and renders the administrative read
//! surface in a terminal: listing, detail, aggregate stats, deletion.
//!
//! # Subcommands
//! - `status`                          — server and store health
//! - `list [--page N] [-n N] [--json]` — paginated listing
//! - `show <id> [--json]`              — full detail for one respuesta
//! - `stats [--json]`                  — dashboard aggregates
//! - `delete <id>`                     — delete one respuesta

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";
const DEFAULT_PER_PAGE: u32 = 10;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "egresados-cli",
    version,
    about = "Consola de administración para la encuesta de egresados"
)]
struct Cli {
    /// Egresados HTTP server URL (overrides EGRESADOS_HTTP_URL env var)
    #[arg(long, env = "EGRESADOS_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server and record-store status
    Status,

    /// List stored respuestas, paginated
    List {
        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Rows per page
        #[arg(short = 'n', long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: u32,

        /// Output the raw JSON page
        #[arg(long)]
        json: bool,
    },

    /// Show the full detail of one respuesta
    Show {
        /// Respuesta id
        id: i64,

        /// Output the raw JSON detail
        #[arg(long)]
        json: bool,
    },

    /// Show dashboard aggregates
    Stats {
        /// Output the raw JSON stats
        #[arg(long)]
        json: bool,
    },

    /// Delete one respuesta
    Delete {
        /// Respuesta id
        id: i64,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

/// One row of the paginated listing (extra fields are ignored).
#[derive(Debug, Deserialize)]
pub struct RespuestaRow {
    pub id: i64,
    pub nombre: String,
    pub email: String,
    pub programa: String,
    pub horario: String,
    pub lugar: String,
    pub created_at: String,
    pub duracion_total_segundos: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ListResponse {
    pub respuestas: Vec<RespuestaRow>,
    pub total: i64,
    pub page: u32,
    pub total_pages: i64,
}

// ============================================================================
// Output formatting
// ============================================================================

/// Render seconds as a compact `MmSSs` duration.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let minutes = total / 60;
    let rest = total % 60;
    if minutes > 0 {
        format!("{}m {:02}s", minutes, rest)
    } else {
        format!("{}s", rest)
    }
}

/// One listing line: id, name, program, duration and an optional map pin.
pub fn format_row(row: &RespuestaRow) -> String {
    let pin = match (row.latitude, row.longitude) {
        (Some(lat), Some(lng)) => format!("  ({:.4}, {:.4})", lat, lng),
        _ => String::new(),
    };
    format!(
        "#{:<5} {:<24} {:<24} {:<10} {}{}",
        row.id,
        truncate(&row.nombre, 24),
        truncate(&row.programa, 24),
        format_duration(row.duracion_total_segundos),
        row.created_at,
        pin
    )
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()?)
}

fn fetch_json(url: &str) -> serde_json::Value {
    let client = match client() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("egresados-cli: {}", e);
            std::process::exit(1);
        }
    };

    let resp = match client.get(url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("egresados-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("egresados-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    match resp.json() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("egresados-cli: failed to parse response: {}", e);
            std::process::exit(1);
        }
    }
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let body = fetch_json(&format!("{}/api/health", server));
    println!("Servidor:   {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Versión:    {}", body["version"].as_str().unwrap_or("?"));
    println!("SQLite:     {}", body["sqlite"].as_str().unwrap_or("?"));
    println!("Base:       {}", body["database"].as_str().unwrap_or("?"));
    println!("Respuestas: {}", body["respuestas"].as_i64().unwrap_or(0));
    Ok(())
}

fn do_list(server: &str, page: u32, per_page: u32, json: bool) -> anyhow::Result<()> {
    let url = format!(
        "{}/api/admin/respuestas?page={}&per_page={}",
        server, page, per_page
    );
    let body = fetch_json(&url);

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let list: ListResponse = serde_json::from_value(body)?;
    if list.respuestas.is_empty() {
        eprintln!("No hay respuestas en la página {}.", page);
        return Ok(());
    }
    for row in &list.respuestas {
        println!("{}", format_row(row));
    }
    println!(
        "\nPágina {} de {} — {} respuestas en total",
        list.page, list.total_pages, list.total
    );
    Ok(())
}

fn do_show(server: &str, id: i64, json: bool) -> anyhow::Result<()> {
    let body = fetch_json(&format!("{}/api/admin/respuesta/{}", server, id));

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let r = &body["respuesta"];
    println!("Respuesta #{}", r["id"]);
    println!("  Sesión:      {}", r["session_id"].as_str().unwrap_or("?"));
    println!("  Nombre:      {}", r["nombre"].as_str().unwrap_or("?"));
    println!("  Email:       {}", r["email"].as_str().unwrap_or("?"));
    println!("  Teléfono:    {}", r["telefono"].as_str().unwrap_or("?"));
    println!("  Programa:    {}", r["programa"].as_str().unwrap_or("?"));
    println!("  Evento:      {}", r["tipo_evento"].as_str().unwrap_or("?"));
    println!("  Horario:     {}", r["horario"].as_str().unwrap_or("?"));
    println!("  Lugar:       {}", r["lugar"].as_str().unwrap_or("?"));
    println!("  Acompañante: {}", r["acompanante"].as_str().unwrap_or("?"));
    println!(
        "  Duración:    {}",
        format_duration(r["duracion_total_segundos"].as_f64().unwrap_or(0.0))
    );

    if let Some(actividades) = body["actividades"].as_array() {
        let joined: Vec<&str> = actividades.iter().filter_map(|a| a.as_str()).collect();
        println!("  Actividades: {}", joined.join(", "));
    }
    match body["ubicacion"].as_object() {
        Some(u) => println!(
            "  Ubicación:   {}, {}",
            u.get("latitude").cloned().unwrap_or_default(),
            u.get("longitude").cloned().unwrap_or_default()
        ),
        None => println!("  Ubicación:   no disponible"),
    }
    match body["video"].as_object() {
        Some(v) => println!(
            "  Video:       {} bytes, {}",
            v.get("size").cloned().unwrap_or_default(),
            v.get("type").and_then(|t| t.as_str()).unwrap_or("?")
        ),
        None => println!("  Video:       no disponible"),
    }
    Ok(())
}

fn do_stats(server: &str, json: bool) -> anyhow::Result<()> {
    let body = fetch_json(&format!("{}/api/admin/dashboard", server));

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Respuestas totales: {}", body["total_respuestas"]);
    println!("Respuestas hoy:     {}", body["respuestas_hoy"]);
    println!(
        "Tiempo promedio:    {}",
        format_duration(body["tiempo_promedio"].as_f64().unwrap_or(0.0))
    );

    if let Some(programas) = body["por_programa"].as_array() {
        println!("\nPor programa:");
        for p in programas {
            println!(
                "  {:<28} {}",
                p["programa"].as_str().unwrap_or("?"),
                p["count"]
            );
        }
    }
    if let Some(actividades) = body["actividades_top"].as_array() {
        println!("\nActividades más pedidas:");
        for a in actividades {
            println!(
                "  {:<28} {}",
                a["actividad"].as_str().unwrap_or("?"),
                a["count"]
            );
        }
    }
    Ok(())
}

fn do_delete(server: &str, id: i64) -> anyhow::Result<()> {
    let client = client()?;
    let url = format!("{}/api/admin/respuesta/{}", server, id);

    let resp = match client.delete(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("egresados-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        eprintln!("egresados-cli: server returned {}", resp.status());
        std::process::exit(1);
    }

    let body: serde_json::Value = resp.json().unwrap_or_default();
    if body["deleted"].as_bool().unwrap_or(false) {
        println!("Respuesta #{} eliminada", id);
    } else {
        eprintln!("Respuesta #{} no existe", id);
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::List {
            page,
            per_page,
            json,
        } => do_list(&server, page, per_page, json),
        Commands::Show { id, json } => do_show(&server, id, json),
        Commands::Stats { json } => do_stats(&server, json),
        Commands::Delete { id } => do_delete(&server, id),
    };

    if let Err(e) = result {
        eprintln!("egresados-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
