pub mod capture;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod relay;
pub mod store;
pub mod submit;
pub mod wizard;

pub use capture::{
    begin_capture, CameraBackend, CameraStream, CaptureConfig, CaptureError, CaptureHandle,
    CaptureKind, CaptureSlots, GeolocationBackend, VideoConstraints,
};
pub use config::EgresadosConfig;
pub use error::EgresadosError;
pub use store::RespuestaStore;
pub use submit::{SubmissionPipeline, SubmissionReceipt};
pub use wizard::{GateFailure, Step, WizardSession, WizardState};
