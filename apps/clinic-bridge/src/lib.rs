//! Clinic Bridge - serviço de agendamentos e área do paciente
//!
//! Este crate fornece:
//! - Ciclo de vida dos agendamentos (criar, confirmar, cancelar, editar, remover)
//! - Geração e sincronização da consulta derivada do agendamento confirmado
//! - Janela de acesso à teleconsulta e varredura periódica de consultas realizadas
//! - Sessões de administrador e de paciente expostas via HTTP

pub mod access;
pub mod board;
pub mod clock;
pub mod config;
pub mod draft;
pub mod error;
pub mod lifecycle;
pub mod routes;
pub mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

pub use config::BridgeConfig;
pub use error::{BridgeError, LifecycleError};
pub use lifecycle::AppointmentLifecycle;
pub use routes::{router, AppState};

/// Inicializa o subscriber de logs (`RUST_LOG`, padrão `info`)
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    // try_init: em testes o subscriber pode já estar registrado
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Monta o estado do serviço contra a API HTTP configurada
pub fn build_state(config: BridgeConfig) -> Result<AppState> {
    let api = common_api::init_api_client(&config.api).context("Falha ao configurar a API da clínica")?;
    Ok(AppState::new(Arc::new(api), config, Arc::new(clock::SystemClock)))
}
