//! Rotas HTTP do serviço

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use common_api::cpf::Cpf;
use common_api::models::{Appointment, AppointmentStatus};
use common_api::repository::{
    AppointmentRepository, ConsultationRepository, CredentialCheck, ReferenceDataLookup,
};
use serde::Deserialize;
use tokio::sync::Mutex;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::board::{ConsultationBoard, ConsultationView};
use crate::clock::Clock;
use crate::config::BridgeConfig;
use crate::draft::{AppointmentDraft, FieldErrors};
use crate::error::{BridgeError, LifecycleError};
use crate::lifecycle::{AppointmentLifecycle, Confirmation, DoctorOptions, EditOutcome};
use crate::scheduler::{spawn_sweeper, ConsultationSweeper, SweepReport};
use crate::session::{Session, SessionRegistry};

/// Cabeçalho com o id da sessão do administrador
pub const SESSION_HEADER: &str = "x-session-id";

/// Estado compartilhado entre as rotas
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<AppointmentLifecycle>,
    pub sweeper: Arc<ConsultationSweeper>,
    pub credentials: Arc<dyn CredentialCheck>,
    pub sessions: Arc<SessionRegistry>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<BridgeConfig>,
}

impl AppState {
    /// Monta o estado a partir de uma implementação única da API
    pub fn new<A>(api: Arc<A>, config: BridgeConfig, clock: Arc<dyn Clock>) -> Self
    where
        A: AppointmentRepository
            + ConsultationRepository
            + ReferenceDataLookup
            + CredentialCheck
            + 'static,
    {
        let lifecycle = AppointmentLifecycle::new(api.clone(), api.clone(), api.clone())
            .with_meeting_link(config.meeting_link.clone());
        let sweeper = ConsultationSweeper::new(api.clone(), api.clone(), config.access);

        Self {
            lifecycle: Arc::new(lifecycle),
            sweeper: Arc::new(sweeper),
            credentials: api,
            sessions: Arc::new(SessionRegistry::new()),
            clock,
            config: Arc::new(config),
        }
    }
}

/// Sessão de administrador identificada pelo cabeçalho `x-session-id`
pub struct AdminSession(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = BridgeError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| BridgeError::Unauthorized("Sessão de administrador não informada.".into()))?;
        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| BridgeError::Unauthorized("Identificador de sessão inválido.".into()))?;
        let session = state
            .sessions
            .get(&id)
            .ok_or_else(|| BridgeError::SessionNotFound(id.to_string()))?;
        if !session.is_admin() {
            return Err(BridgeError::Forbidden("administradores"));
        }
        Ok(AdminSession(session))
    }
}

pub fn router(state: AppState) -> Router {
    let max_concurrency = state.config.max_concurrency;

    Router::new()
        .route("/health", get(health))
        .route("/sessoes/admin", post(open_admin_session))
        .route("/sessoes/paciente", post(open_patient_session))
        .route("/sessoes/:id", delete(close_session))
        .route("/sessoes/:id/consultas", get(patient_consultations))
        .route("/sessoes/:id/consultas/varredura", post(sweep_now))
        .route("/agendamentos", get(list_appointments).post(create_appointment))
        .route("/agendamentos/:id", put(edit_appointment).delete(remove_appointment))
        .route("/agendamentos/:id/confirmar", post(confirm_appointment))
        .route("/agendamentos/:id/cancelar", post(cancel_appointment))
        .route("/especialidades/:id/medicos", get(doctor_options))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .layer(ConcurrencyLimitLayer::new(max_concurrency)),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct AdminLogin {
    login: String,
    senha: String,
}

async fn open_admin_session(
    State(state): State<AppState>,
    Json(body): Json<AdminLogin>,
) -> Result<(StatusCode, Json<Session>), BridgeError> {
    if body.login.trim().is_empty() || body.senha.is_empty() {
        return Err(BridgeError::BadRequest("Informe login e senha.".into()));
    }
    state
        .credentials
        .authenticate(body.login.trim(), &body.senha)
        .await
        .map_err(|e| match e.status() {
            Some(401) | Some(403) => BridgeError::Unauthorized(e.to_string()),
            _ => BridgeError::Upstream(e),
        })?;

    let session = state.sessions.open_admin(body.login.trim(), state.clock.now());
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
struct PatientLogin {
    cpf: String,
}

async fn open_patient_session(
    State(state): State<AppState>,
    Json(body): Json<PatientLogin>,
) -> Result<(StatusCode, Json<Session>), BridgeError> {
    let cpf = Cpf::parse(&body.cpf).map_err(|e| {
        let mut fields = FieldErrors::new();
        fields.add("cpf", e.to_string());
        LifecycleError::Validation(fields)
    })?;

    let board = Arc::new(Mutex::new(ConsultationBoard::for_patient(cpf.clone())));
    let handle = spawn_sweeper(
        state.sweeper.clone(),
        board.clone(),
        state.clock.clone(),
        state.config.sweep_interval(),
    );
    let session = state.sessions.open_patient(cpf, board, handle, state.clock.now());
    Ok((StatusCode::CREATED, Json(session)))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, BridgeError> {
    if state.sessions.close(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(BridgeError::SessionNotFound(id.to_string()))
    }
}

fn patient_board(state: &AppState, id: &Uuid) -> Result<Arc<Mutex<ConsultationBoard>>, BridgeError> {
    let session = state
        .sessions
        .get(id)
        .ok_or_else(|| BridgeError::SessionNotFound(id.to_string()))?;
    if session.is_admin() {
        return Err(BridgeError::Forbidden("pacientes"));
    }
    state
        .sessions
        .board(id)
        .ok_or_else(|| BridgeError::SessionNotFound(id.to_string()))
}

#[derive(Debug, Deserialize)]
struct ConsultationQuery {
    especialidade: Option<String>,
}

async fn patient_consultations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ConsultationQuery>,
) -> Result<Json<Vec<ConsultationView>>, BridgeError> {
    let board = patient_board(&state, &id)?;
    let now = state.clock.now();
    let guard = board.lock().await;
    Ok(Json(guard.view(
        query.especialidade.as_deref(),
        &now,
        state.sweeper.policy(),
    )))
}

/// Recarrega e varre imediatamente, sem esperar o próximo tick
async fn sweep_now(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SweepReport>, BridgeError> {
    let board = patient_board(&state, &id)?;
    state.sweeper.refresh(&board).await;
    let report = state.sweeper.sweep_board(&board, &state.clock.now()).await;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct AppointmentQuery {
    status: Option<AppointmentStatus>,
}

async fn list_appointments(
    State(state): State<AppState>,
    _admin: AdminSession,
    Query(query): Query<AppointmentQuery>,
) -> Result<Json<Vec<Appointment>>, BridgeError> {
    Ok(Json(state.lifecycle.list(query.status).await?))
}

async fn create_appointment(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Json(draft): Json<AppointmentDraft>,
) -> Result<(StatusCode, Json<Appointment>), BridgeError> {
    let created = state.lifecycle.create(&draft).await?;
    info!(session_id = %admin.id, appointment_id = created.id, "Agendamento criado via API");
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
struct EditRequest {
    #[serde(flatten)]
    draft: AppointmentDraft,
    #[serde(rename = "reagendamentoConfirmado", default)]
    reschedule_acknowledged: bool,
}

async fn edit_appointment(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<i64>,
    Json(body): Json<EditRequest>,
) -> Result<Json<EditOutcome>, BridgeError> {
    let outcome = state
        .lifecycle
        .edit(id, &body.draft, body.reschedule_acknowledged)
        .await?;
    Ok(Json(outcome))
}

async fn confirm_appointment(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<i64>,
) -> Result<Json<Confirmation>, BridgeError> {
    Ok(Json(state.lifecycle.confirm(id).await?))
}

async fn cancel_appointment(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<i64>,
) -> Result<Json<Appointment>, BridgeError> {
    Ok(Json(state.lifecycle.cancel(id).await?))
}

async fn remove_appointment(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<i64>,
) -> Result<StatusCode, BridgeError> {
    state.lifecycle.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct DoctorQuery {
    #[serde(rename = "idMedicoAtual")]
    current_doctor: Option<i64>,
    #[serde(rename = "edicao", default)]
    editing: bool,
}

async fn doctor_options(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(specialty_id): Path<i64>,
    Query(query): Query<DoctorQuery>,
) -> Result<Json<DoctorOptions>, BridgeError> {
    let options = state
        .lifecycle
        .doctor_options(specialty_id, query.current_doctor, query.editing)
        .await?;
    Ok(Json(options))
}
