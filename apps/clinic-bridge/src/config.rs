//! Configuração do serviço
//!
//! Valores padrão em [`BridgeConfig::default`], sobrescritos por variáveis de
//! ambiente `CLINIC_BRIDGE_*`.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use common_api::ApiConfig;
use serde::{Deserialize, Serialize};

use crate::access::AccessPolicy;
use crate::lifecycle::DEFAULT_MEETING_LINK;
use crate::scheduler::DEFAULT_SWEEP_INTERVAL;

/// Prefixo das variáveis de ambiente
pub const ENV_PREFIX: &str = "CLINIC_BRIDGE_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// API REST da clínica
    pub api: ApiConfig,
    /// Endereço HTTP do serviço
    pub bind_addr: SocketAddr,
    /// Intervalo entre varreduras de consultas, em segundos
    pub sweep_interval_secs: u64,
    /// Link das teleconsultas
    pub meeting_link: String,
    /// Janela de acesso às consultas
    pub access: AccessPolicy,
    /// Logs em JSON (produção) ou texto (desenvolvimento)
    pub json_logs: bool,
    /// Requisições simultâneas atendidas
    pub max_concurrency: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            meeting_link: DEFAULT_MEETING_LINK.to_string(),
            access: AccessPolicy::default(),
            json_logs: false,
            max_concurrency: 64,
        }
    }
}

impl BridgeConfig {
    /// Lê a configuração do ambiente do processo
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Lê a configuração a partir de uma função de consulta (útil em testes)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(url) = get("API_URL") {
            config.api.base_url = url;
        }
        if let Some(raw) = get("API_TIMEOUT_SECS") {
            config.api.timeout_secs = raw
                .parse()
                .with_context(|| format!("CLINIC_BRIDGE_API_TIMEOUT_SECS inválido: {}", raw))?;
        }
        if let Some(raw) = get("BIND_ADDR") {
            config.bind_addr = raw
                .parse()
                .with_context(|| format!("CLINIC_BRIDGE_BIND_ADDR inválido: {}", raw))?;
        }
        if let Some(raw) = get("SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = raw
                .parse()
                .with_context(|| format!("CLINIC_BRIDGE_SWEEP_INTERVAL_SECS inválido: {}", raw))?;
        }
        if let Some(link) = get("MEETING_LINK") {
            config.meeting_link = link;
        }
        if let Some(raw) = get("ACCESS_MINUTES_BEFORE") {
            config.access.minutes_before = raw
                .parse()
                .with_context(|| format!("CLINIC_BRIDGE_ACCESS_MINUTES_BEFORE inválido: {}", raw))?;
        }
        if let Some(raw) = get("ACCESS_MINUTES_AFTER") {
            config.access.minutes_after = raw
                .parse()
                .with_context(|| format!("CLINIC_BRIDGE_ACCESS_MINUTES_AFTER inválido: {}", raw))?;
        }
        if let Some(raw) = get("JSON_LOGS") {
            config.json_logs = matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "sim");
        }
        if let Some(raw) = get("MAX_CONCURRENCY") {
            config.max_concurrency = raw
                .parse()
                .with_context(|| format!("CLINIC_BRIDGE_MAX_CONCURRENCY inválido: {}", raw))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            bail!("O intervalo de varredura deve ser maior que zero");
        }
        if self.access.minutes_before < 0 || self.access.minutes_after < 0 {
            bail!("Os limites da janela de acesso não podem ser negativos");
        }
        if self.max_concurrency == 0 {
            bail!("max_concurrency deve ser maior que zero");
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
