use clap::Parser;
use egresados_core::{EgresadosConfig, RespuestaStore};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use egresados_server::http;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "egresados.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match EgresadosConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging at the configured level, overridable via RUST_LOG
    let level: tracing::Level = config
        .service
        .log_level
        .parse()
        .unwrap_or(tracing::Level::INFO);
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    // Connect to the record store
    let pool = match egresados_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let store = RespuestaStore::new(pool);
    store.init_schema().await?;

    if args.health {
        match egresados_core::db::health_check(store.pool()).await {
            Ok(v) => println!("✅ SQLite connected: {}", v),
            Err(e) => {
                println!("❌ SQLite connection failed: {}", e);
                std::process::exit(1);
            }
        }

        match store.count().await {
            Ok(n) => println!("✅ Record store ready: {} respuestas", n),
            Err(e) => {
                println!("❌ Record store check failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Egresados DB health check passed");
        return Ok(());
    }

    // Shutdown signal
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    if config.http.enabled {
        http::start_http_server(store, config, tx.subscribe()).await?;
    } else {
        tracing::warn!("HTTP disabled in config; nothing to serve");
    }

    Ok(())
}
