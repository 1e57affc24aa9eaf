//! Common API - Biblioteca compartilhada para acesso à API REST da clínica
//!
//! Esta biblioteca fornece:
//! - Modelos de dados compartilhados (agendamentos, consultas e cadastros)
//! - Validação e formatação de CPF
//! - Adaptadores do formato JSON da API
//! - Contratos dos repositórios remotos e sua implementação HTTP

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

pub mod client;
pub mod cpf;
pub mod error;
pub mod models;
pub mod repository;
pub mod wire;

pub use client::HttpApi;
pub use cpf::Cpf;
pub use error::ApiError;

/// Configuração do acesso à API REST
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// URL base da API (sem barra final)
    pub base_url: String,
    /// Tempo máximo de cada requisição, em segundos
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://hc-conecta-sprint-4-1.onrender.com".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Inicializa o cliente HTTP da API
pub fn init_api_client(config: &ApiConfig) -> Result<HttpApi> {
    if config.base_url.trim().is_empty() {
        anyhow::bail!("URL base da API não configurada");
    }

    let client = HttpApi::new(&config.base_url, Duration::from_secs(config.timeout_secs))
        .context("Falha ao criar cliente HTTP da API")?;

    info!("Cliente da API inicializado: {}", client.base_url());
    Ok(client)
}
