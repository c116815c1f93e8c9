pub mod device;
pub mod labels;
pub mod respuesta;
pub mod session;

pub use device::{DeviceInfo, ScreenSize};
pub use labels::{Acompanante, Actividad, Horario, Lugar, Programa, TipoEvento, UnknownLabel};
pub use respuesta::{
    ActividadCount, DashboardStats, HorarioCount, ProgramaCount, RespuestaSummary,
    StoredRespuesta, UltimaRespuesta,
};
pub use session::{FormFields, LocationData, SessionRecord, StepTiming, VideoAsset};
