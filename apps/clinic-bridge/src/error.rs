//! Erros do serviço e sua tradução para respostas HTTP

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_api::models::{Appointment, AppointmentStatus, StatusAction};
use common_api::ApiError;
use serde_json::json;
use thiserror::Error;

use crate::draft::FieldErrors;

/// Falhas das operações de agendamento
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Dados inválidos: {0}")]
    Validation(FieldErrors),

    #[error("Paciente não encontrado. Verifique o CPF.")]
    PatientNotFound,

    #[error("Agendamento {0} não encontrado.")]
    AppointmentNotFound(i64),

    #[error("A data/hora de um agendamento confirmado foi alterada; confirme o reagendamento.")]
    ReschedulePending,

    #[error("Não é possível {action} um agendamento {from}.")]
    TransitionNotAllowed {
        from: AppointmentStatus,
        action: StatusAction,
    },

    /// A escrita principal (agendamento) falhou; nada foi alterado
    #[error(transparent)]
    Remote(#[from] ApiError),

    /// O agendamento foi gravado, mas a consulta derivada não
    #[error("Agendamento salvo, mas a consulta não foi atualizada: {source}")]
    ConsultationSyncFailed {
        appointment: Box<Appointment>,
        #[source]
        source: ApiError,
    },
}

impl LifecycleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LifecycleError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LifecycleError::PatientNotFound | LifecycleError::AppointmentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            LifecycleError::ReschedulePending | LifecycleError::TransitionNotAllowed { .. } => {
                StatusCode::CONFLICT
            }
            LifecycleError::Remote(_) => StatusCode::BAD_GATEWAY,
            LifecycleError::ConsultationSyncFailed { .. } => StatusCode::MULTI_STATUS,
        }
    }
}

/// Erros das rotas HTTP
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Sessão {0} não encontrada ou encerrada.")]
    SessionNotFound(String),

    #[error("Operação disponível apenas para {0}.")]
    Forbidden(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("Falha na API remota: {0}")]
    Upstream(ApiError),
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            BridgeError::Lifecycle(LifecycleError::Validation(fields)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "erro": "Dados inválidos.", "campos": fields }),
            ),
            BridgeError::Lifecycle(LifecycleError::ConsultationSyncFailed { appointment, source }) => (
                StatusCode::MULTI_STATUS,
                json!({
                    "erro": self.to_string(),
                    "aviso": "primary succeeded, secondary failed",
                    "detalhe": source.to_string(),
                    "agendamento": appointment,
                }),
            ),
            BridgeError::Lifecycle(inner) => (inner.status_code(), json!({ "erro": inner.to_string() })),
            BridgeError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "erro": msg })),
            BridgeError::SessionNotFound(_) => (StatusCode::NOT_FOUND, json!({ "erro": self.to_string() })),
            BridgeError::Forbidden(_) => (StatusCode::FORBIDDEN, json!({ "erro": self.to_string() })),
            BridgeError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "erro": msg })),
            BridgeError::Upstream(err) => (StatusCode::BAD_GATEWAY, json!({ "erro": err.to_string() })),
        };

        if status.is_server_error() || status == StatusCode::MULTI_STATUS {
            tracing::warn!(status = %status, error = %self, "Requisição concluída com erro");
        }

        (status, Json(body)).into_response()
    }
}
