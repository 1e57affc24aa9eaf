//! Definições de erro para a biblioteca common-api
//!
//! Toda falha de uma chamada remota (rede ou resposta não-2xx) vira um
//! [`ApiError`] com uma mensagem pronta para ser exibida ao usuário.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Erros específicos das operações contra a API REST
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Não foi possível conectar à API: {0}")]
    Network(String),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Resposta inválida da API: {0}")]
    Decode(String),

    #[error("Dados inválidos: {0}")]
    InvalidData(String),
}

impl ApiError {
    /// Código HTTP da resposta, quando a falha veio do servidor
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Constrói o erro a partir de uma resposta não-2xx e do corpo já lido
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        ApiError::Status {
            status: status.as_u16(),
            message: extract_message(status, body),
        }
    }
}

/// Conversão dos erros do reqwest para nossos tipos de erro
impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ApiError::Decode(error.to_string())
        } else if error.is_timeout() {
            ApiError::Network("tempo de resposta esgotado".to_string())
        } else if error.is_connect() {
            ApiError::Network("rede indisponível ou servidor inativo".to_string())
        } else if let Some(status) = error.status() {
            ApiError::Status {
                status: status.as_u16(),
                message: fallback_message(status),
            }
        } else {
            ApiError::Network(error.to_string())
        }
    }
}

/// Extrai a melhor mensagem legível do corpo de uma resposta de erro.
///
/// Ordem: string JSON, campos `message`/`error`/`detalhe` de um objeto JSON,
/// texto puro. Sem nada aproveitável, cai na mensagem genérica com o status.
pub fn extract_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();

    if !trimmed.is_empty() {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::String(text)) if !text.trim().is_empty() => return text.trim().to_string(),
            Ok(Value::Object(map)) => {
                let found = ["message", "error", "detalhe"]
                    .iter()
                    .filter_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(str::trim)
                    .find(|text| !text.is_empty());
                if let Some(text) = found {
                    return text.to_string();
                }
            }
            Ok(_) => {}
            Err(_) => return trimmed.to_string(),
        }
    }

    fallback_message(status)
}

fn fallback_message(status: StatusCode) -> String {
    if status == StatusCode::UNAUTHORIZED {
        return "Credenciais inválidas".to_string();
    }
    format!("Falha na requisição (status {})", status.as_u16())
}
