use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EgresadosConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://egresados.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// Knobs for the camera/geolocation acquisition. The divergent wizard
/// variants only differed in these values, so they are configuration, not code.
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureSettings {
    pub video_duration_seconds: u64,
    pub geolocation_timeout_seconds: u64,
    pub video_width: u32,
    pub video_height: u32,
    pub video_bits_per_second: u32,
    pub video_mime_type: String,
    pub audio: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            video_duration_seconds: 3,
            geolocation_timeout_seconds: 10,
            video_width: 640,
            video_height: 480,
            video_bits_per_second: 250_000,
            video_mime_type: "video/webm".to_string(),
            audio: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub media: MediaRelayConfig,
    #[serde(default)]
    pub notification: NotificationRelayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaRelayConfig {
    pub enabled: bool,
    pub cloud_name: String,
    pub upload_preset: String,
    pub folder: String,
    pub timeout_seconds: u64,
}

impl Default for MediaRelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cloud_name: String::new(),
            upload_preset: "formulario_egresados".to_string(),
            folder: "egresados_videos".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationRelayConfig {
    pub enabled: bool,
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
    pub timeout_seconds: u64,
}

impl Default for NotificationRelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_id: String::new(),
            template_id: String::new(),
            public_key: String::new(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub max_video_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_video_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub per_page: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { per_page: 10 }
    }
}

impl EgresadosConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
