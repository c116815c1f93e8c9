//! Step navigator — the finite-state controller for the survey wizard.
//!
//! The wizard owns one [`SessionRecord`] and a [`FormState`] and walks an
//! ordered set of five steps plus a Success terminal state. Forward
//! transitions are gated by per-step validation predicates; every gate
//! invocation counts an attempt *before* the predicate runs, so failed
//! attempts are visible in the telemetry. Backward transitions are always
//! permitted. Entry/exit timestamps are stamped on every transition.

use chrono::Utc;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::capture::CaptureSlots;
use crate::error::EgresadosError;
use crate::models::{
    Acompanante, Actividad, DeviceInfo, FormFields, Horario, Lugar, Programa, SessionRecord,
    TipoEvento,
};

pub const TOTAL_STEPS: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    /// Camera/geolocation consent.
    Permisos,
    /// Instructions screen, no gate.
    Instrucciones,
    /// Identity fields.
    DatosPersonales,
    /// Event preferences.
    Preferencias,
    /// Final details and submit.
    Detalles,
}

impl Step {
    pub const ALL: [Step; TOTAL_STEPS as usize] = [
        Step::Permisos,
        Step::Instrucciones,
        Step::DatosPersonales,
        Step::Preferencias,
        Step::Detalles,
    ];

    pub fn number(self) -> u8 {
        match self {
            Step::Permisos => 1,
            Step::Instrucciones => 2,
            Step::DatosPersonales => 3,
            Step::Preferencias => 4,
            Step::Detalles => 5,
        }
    }

    /// Key used in the timing/attempt maps and on the wire: `step1`..`step5`.
    pub fn key(self) -> &'static str {
        match self {
            Step::Permisos => "step1",
            Step::Instrucciones => "step2",
            Step::DatosPersonales => "step3",
            Step::Preferencias => "step4",
            Step::Detalles => "step5",
        }
    }

    pub fn next(self) -> Option<Step> {
        Step::ALL.get(self.number() as usize).copied()
    }

    pub fn previous(self) -> Option<Step> {
        match self.number() {
            n if n >= 2 => Some(Step::ALL[(n - 2) as usize]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardState {
    InProgress(Step),
    Success,
}

/// A failed validation gate. Recoverable: the user corrects the input and
/// retries; nothing retries automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("paso {step}: {reason}")]
pub struct GateFailure {
    pub step: u8,
    pub reason: String,
}

impl GateFailure {
    fn new(step: Step, reason: impl Into<String>) -> Self {
        Self {
            step: step.number(),
            reason: reason.into(),
        }
    }
}

impl From<GateFailure> for EgresadosError {
    fn from(failure: GateFailure) -> Self {
        EgresadosError::Validation {
            step: failure.step,
            reason: failure.reason,
        }
    }
}

/// Current user input, mutated by the UI as the user types. Fields stay
/// `None`/empty until answered; they are only frozen into [`FormFields`] at
/// submission time.
#[derive(Debug, Clone, Default)]
pub struct FormState {
    pub nombre: String,
    pub email: String,
    pub telefono: String,
    pub programa: Option<Programa>,
    pub tipo_evento: Option<TipoEvento>,
    pub horario: Option<Horario>,
    pub actividades: Vec<Actividad>,
    pub lugar: Option<Lugar>,
    pub acompanante: Option<Acompanante>,
    pub sugerencias: String,
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"))
}

fn telefono_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{10}$").expect("telefono regex"))
}

impl FormState {
    /// Freeze the current input into the submitted answer set. Missing
    /// answers surface as the gate failure of the step that collects them.
    pub fn finalize(&self) -> Result<FormFields, GateFailure> {
        evaluate_gate(Step::DatosPersonales, self, true)?;
        evaluate_gate(Step::Preferencias, self, true)?;
        evaluate_gate(Step::Detalles, self, true)?;

        match (
            self.programa,
            self.tipo_evento,
            self.horario,
            self.lugar,
            self.acompanante,
        ) {
            (Some(programa), Some(tipo_evento), Some(horario), Some(lugar), Some(acompanante)) => {
                Ok(FormFields {
                    nombre: self.nombre.trim().to_string(),
                    email: self.email.trim().to_string(),
                    telefono: self.telefono.trim().to_string(),
                    programa,
                    tipo_evento,
                    horario,
                    actividades: self.actividades.clone(),
                    lugar,
                    acompanante,
                    sugerencias: self.sugerencias.trim().to_string(),
                })
            }
            _ => Err(GateFailure::new(
                Step::DatosPersonales,
                "Por favor, completa todos los campos obligatorios.",
            )),
        }
    }
}

/// Pure validation predicate for one step, over the current form state and
/// the camera grant. Does not touch counters; callers count the attempt first.
pub fn evaluate_gate(
    step: Step,
    form: &FormState,
    camera_granted: bool,
) -> Result<(), GateFailure> {
    match step {
        Step::Permisos => {
            if !camera_granted {
                return Err(GateFailure::new(
                    step,
                    "La cámara es necesaria para continuar.",
                ));
            }
        }
        Step::Instrucciones => {}
        Step::DatosPersonales => {
            if form.nombre.trim().is_empty()
                || form.email.trim().is_empty()
                || form.telefono.trim().is_empty()
                || form.programa.is_none()
            {
                return Err(GateFailure::new(
                    step,
                    "Por favor, completa todos los campos obligatorios.",
                ));
            }
            if !email_regex().is_match(form.email.trim()) {
                return Err(GateFailure::new(
                    step,
                    "Por favor, introduce un correo electrónico válido.",
                ));
            }
            let digits: String = form
                .telefono
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            if !telefono_regex().is_match(&digits) {
                return Err(GateFailure::new(
                    step,
                    "Por favor, introduce un número de teléfono de 10 dígitos.",
                ));
            }
        }
        Step::Preferencias => {
            if form.tipo_evento.is_none() || form.horario.is_none() {
                return Err(GateFailure::new(
                    step,
                    "Por favor, selecciona una opción para cada pregunta.",
                ));
            }
            if form.actividades.is_empty() {
                return Err(GateFailure::new(
                    step,
                    "Por favor, selecciona al menos una actividad.",
                ));
            }
        }
        Step::Detalles => {
            if form.lugar.is_none() || form.acompanante.is_none() {
                return Err(GateFailure::new(
                    step,
                    "Por favor, completa todas las preguntas.",
                ));
            }
        }
    }
    Ok(())
}

/// The owned session context: record, form state, navigator position and the
/// capture slots shared with the background acquisition tasks.
#[derive(Debug)]
pub struct WizardSession {
    record: SessionRecord,
    pub form: FormState,
    state: WizardState,
    capture: Arc<CaptureSlots>,
}

impl WizardSession {
    /// Start a new session on step 1, stamping the device snapshot and the
    /// first entry timestamp.
    pub fn new(device_info: DeviceInfo) -> Self {
        let mut record = SessionRecord::new(device_info);
        record.enter_step(Step::Permisos.key(), Utc::now());
        tracing::info!(session_id = %record.session_id, "Session started");
        Self {
            record,
            form: FormState::default(),
            state: WizardState::InProgress(Step::Permisos),
            capture: Arc::new(CaptureSlots::default()),
        }
    }

    pub fn state(&self) -> WizardState {
        self.state
    }

    pub fn current_step(&self) -> Option<Step> {
        match self.state {
            WizardState::InProgress(step) => Some(step),
            WizardState::Success => None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.record.session_id
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// Slots handed to [`crate::capture::begin_capture`].
    pub fn capture_slots(&self) -> Arc<CaptureSlots> {
        self.capture.clone()
    }

    pub fn attempts(&self, step: Step) -> u32 {
        self.record.attempts(step.key())
    }

    /// Run the current step's gate, counting the attempt first. The step does
    /// not change.
    pub fn validate_current(&mut self) -> Result<(), GateFailure> {
        let step = match self.state {
            WizardState::InProgress(step) => step,
            WizardState::Success => return Ok(()),
        };
        self.record.bump_attempts(step.key());
        evaluate_gate(step, &self.form, self.capture.camera_granted())
    }

    /// Advance to the next step if the current gate passes. On the final step
    /// a passing gate leaves the position unchanged — leaving step 5 is the
    /// submission pipeline's job.
    pub fn advance(&mut self) -> Result<Step, GateFailure> {
        self.validate_current()?;
        let step = match self.state {
            WizardState::InProgress(step) => step,
            WizardState::Success => return Ok(Step::Detalles),
        };
        match step.next() {
            Some(next) => {
                self.transition(step, next);
                Ok(next)
            }
            None => Ok(step),
        }
    }

    /// Go back one step. Always permitted above step 1, regardless of
    /// validation state.
    pub fn retreat(&mut self) -> Option<Step> {
        let step = self.current_step()?;
        let previous = step.previous()?;
        self.transition(step, previous);
        Some(previous)
    }

    fn transition(&mut self, from: Step, to: Step) {
        let now = Utc::now();
        self.record.complete_step(from.key(), now);
        self.record.enter_step(to.key(), now);
        self.state = WizardState::InProgress(to);
        tracing::debug!(
            session_id = %self.record.session_id,
            from = from.number(),
            to = to.number(),
            "Step transition"
        );
    }

    /// Freeze everything currently known into a submission snapshot: the
    /// finalized form answers, whatever capture results have landed, and the
    /// end timestamp. The live session is not modified.
    pub fn snapshot(&self) -> Result<SessionRecord, GateFailure> {
        let fields = self.form.finalize()?;
        let mut snapshot = self.record.clone();
        snapshot.fields = Some(fields);
        snapshot.location = self.capture.location();
        snapshot.video = self.capture.video();
        snapshot.end_time = Some(Utc::now());
        Ok(snapshot)
    }

    /// Terminal transition, only after the pipeline persisted the record.
    pub(crate) fn mark_completed(&mut self) {
        let now = Utc::now();
        if let WizardState::InProgress(step) = self.state {
            self.record.complete_step(step.key(), now);
        }
        self.record.end_time = Some(now);
        self.state = WizardState::Success;
        tracing::info!(session_id = %self.record.session_id, "Session completed");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::fakes::{test_config, DeniedCamera, FixedGeolocation, ScriptedCamera};
    use crate::capture::{begin_capture, CaptureHandle};
    use crate::models::DeviceInfo;

    fn session() -> WizardSession {
        WizardSession::new(DeviceInfo::from_host())
    }

    /// Run a real (tiny) capture on the session's slots so the step-1 gate
    /// sees the grant; waits for both acquisitions to land.
    async fn grant_camera(session: &WizardSession) -> CaptureHandle {
        let config = test_config();
        let handle = begin_capture(
            session.capture_slots(),
            Arc::new(ScriptedCamera::new(vec![b"chunk"])),
            Arc::new(FixedGeolocation::instant()),
            &config,
        )
        .await
        .expect("camera granted");
        handle
    }

    fn fill_valid_form(form: &mut FormState) {
        form.nombre = "Carlos Pérez".to_string();
        form.email = "carlos@example.com".to_string();
        form.telefono = "55 1234 5678".to_string();
        form.programa = Some(Programa::DoctoradoCiencias);
        form.tipo_evento = Some(TipoEvento::Casual);
        form.horario = Some(Horario::Tarde);
        form.actividades = vec![Actividad::Networking];
        form.lugar = Some(Lugar::Campus);
        form.acompanante = Some(Acompanante::No);
    }

    #[test]
    fn test_starts_on_step_one_with_entry_stamp() {
        let session = session();
        assert_eq!(session.current_step(), Some(Step::Permisos));
        assert!(session.record().step_times.contains_key("step1"));
        assert_eq!(session.attempts(Step::Permisos), 0);
    }

    #[test]
    fn test_advance_without_camera_stays_and_counts_attempt() {
        let mut session = session();

        for expected_attempts in 1u32..=3 {
            let err = session.advance().unwrap_err();
            assert_eq!(err.step, 1);
            assert_eq!(session.current_step(), Some(Step::Permisos));
            assert_eq!(session.attempts(Step::Permisos), expected_attempts);
        }
    }

    #[tokio::test]
    async fn test_camera_denial_keeps_wizard_on_step_one() {
        let mut session = session();
        let config = test_config();
        let result = begin_capture(
            session.capture_slots(),
            Arc::new(DeniedCamera),
            Arc::new(FixedGeolocation::instant()),
            &config,
        )
        .await;
        assert!(result.is_err());

        let err = session.advance().unwrap_err();
        assert!(err.reason.contains("cámara"));
        assert_eq!(session.current_step(), Some(Step::Permisos));
    }

    #[tokio::test]
    async fn test_advance_through_all_steps() {
        let mut session = session();
        let handle = grant_camera(&session).await;

        assert_eq!(session.advance().unwrap(), Step::Instrucciones);
        assert_eq!(session.advance().unwrap(), Step::DatosPersonales);

        fill_valid_form(&mut session.form);
        assert_eq!(session.advance().unwrap(), Step::Preferencias);
        assert_eq!(session.advance().unwrap(), Step::Detalles);

        // Every visited step has an entry stamp; every exited step has a
        // completion stamp and a non-negative derived duration.
        let record = session.record();
        for step in &[Step::Permisos, Step::Instrucciones, Step::DatosPersonales, Step::Preferencias] {
            let timing = &record.step_times[step.key()];
            let completed = timing.completed.expect("exited step is completed");
            assert!(completed >= timing.entered);
            let duration = timing.duration.expect("duration derived");
            assert!(duration >= 0.0);
            assert_eq!(
                duration,
                ((completed - timing.entered).num_milliseconds() as f64 / 1000.0).max(0.0)
            );
        }
        assert!(record.step_times["step5"].completed.is_none());

        handle.settle(test_config().settle_bound()).await;
    }

    #[tokio::test]
    async fn test_failing_gate_never_changes_step_and_counts_one_attempt() {
        let mut session = session();
        let handle = grant_camera(&session).await;
        session.advance().unwrap();
        session.advance().unwrap();
        assert_eq!(session.current_step(), Some(Step::DatosPersonales));

        session.form.nombre = "Luisa".to_string();
        session.form.email = "not-an-email".to_string();
        session.form.telefono = "5512345678".to_string();
        session.form.programa = Some(Programa::Otro);

        let before = session.attempts(Step::DatosPersonales);
        let err = session.advance().unwrap_err();
        assert!(err.reason.contains("correo"));
        assert_eq!(session.current_step(), Some(Step::DatosPersonales));
        assert_eq!(session.attempts(Step::DatosPersonales), before + 1);

        handle.settle(test_config().settle_bound()).await;
    }

    #[test]
    fn test_telefono_gate_requires_ten_digits() {
        let mut form = FormState::default();
        form.nombre = "Luisa".to_string();
        form.email = "luisa@example.com".to_string();
        form.programa = Some(Programa::Otro);

        form.telefono = "12345".to_string();
        assert!(evaluate_gate(Step::DatosPersonales, &form, true).is_err());

        // Whitespace is stripped before the ten-digit check.
        form.telefono = "55 1234 5678".to_string();
        assert!(evaluate_gate(Step::DatosPersonales, &form, true).is_ok());

        form.telefono = "551234567a".to_string();
        assert!(evaluate_gate(Step::DatosPersonales, &form, true).is_err());
    }

    #[test]
    fn test_preferencias_gate_requires_an_activity() {
        let mut form = FormState::default();
        form.tipo_evento = Some(TipoEvento::Formal);
        form.horario = Some(Horario::Manana);
        let err = evaluate_gate(Step::Preferencias, &form, true).unwrap_err();
        assert!(err.reason.contains("actividad"));

        form.actividades.push(Actividad::Cena);
        assert!(evaluate_gate(Step::Preferencias, &form, true).is_ok());
    }

    #[tokio::test]
    async fn test_retreat_is_unconstrained_and_restamps_entry() {
        let mut session = session();
        let handle = grant_camera(&session).await;
        session.advance().unwrap();
        assert_eq!(session.current_step(), Some(Step::Instrucciones));

        assert_eq!(session.retreat(), Some(Step::Permisos));
        let record = session.record();
        // Instructions step was completed on the way out; step 1 was re-entered
        // with a fresh (open) timing entry.
        assert!(record.step_times["step2"].completed.is_some());
        assert!(record.step_times["step1"].completed.is_none());

        // Cannot retreat below step 1.
        assert_eq!(session.retreat(), None);

        handle.settle(test_config().settle_bound()).await;
    }

    #[tokio::test]
    async fn test_snapshot_freezes_form_capture_and_end_time() {
        let mut session = session();
        let handle = grant_camera(&session).await;
        handle.settle(test_config().settle_bound()).await;

        fill_valid_form(&mut session.form);
        let snapshot = session.snapshot().expect("snapshot");

        assert_eq!(snapshot.session_id, session.session_id());
        assert!(snapshot.end_time.is_some());
        assert!(snapshot.video.is_some());
        assert!(snapshot.location.is_some());
        assert_eq!(snapshot.fields.as_ref().unwrap().nombre, "Carlos Pérez");

        // The live record is untouched by snapshotting.
        assert!(session.record().end_time.is_none());
        assert!(session.record().fields.is_none());
    }

    #[test]
    fn test_snapshot_rejects_incomplete_form() {
        let session = session();
        let err = session.snapshot().unwrap_err();
        assert_eq!(err.step, 3);
    }

    #[tokio::test]
    async fn test_mark_completed_reaches_success() {
        let mut session = session();
        let handle = grant_camera(&session).await;
        fill_valid_form(&mut session.form);
        for _ in 0..4 {
            session.advance().unwrap();
        }
        session.mark_completed();
        assert_eq!(session.state(), WizardState::Success);
        assert!(session.current_step().is_none());
        assert!(session.record().end_time.is_some());
        assert!(session.record().step_times["step5"].completed.is_some());

        handle.settle(test_config().settle_bound()).await;
    }
}
