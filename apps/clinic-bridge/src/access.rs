//! Janela de acesso à teleconsulta
//!
//! O paciente pode abrir o link de uma consulta online de 15 minutos antes
//! até 5 minutos depois do horário marcado (limites inclusivos). Passada a
//! janela, a consulta está apta a ser marcada como REALIZADA pela varredura.

use chrono::{DateTime, Duration, NaiveDateTime};
use chrono_tz::Tz;
use common_api::models::{AttendanceMode, Consultation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{civil_instant, parse_display, DISPLAY_TIME_FORMAT};

/// Erros da avaliação de acesso
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Consulta {id} com data/horário inválidos: {date} {time}")]
    InvalidSchedule { id: i64, date: String, time: String },
}

/// Limites da janela, em minutos relativos ao horário marcado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub minutes_before: i64,
    pub minutes_after: i64,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            minutes_before: 15,
            minutes_after: 5,
        }
    }
}

/// Intervalo fechado `[opens_at, closes_at]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessWindow {
    pub scheduled_at: DateTime<Tz>,
    pub opens_at: DateTime<Tz>,
    pub closes_at: DateTime<Tz>,
}

impl AccessWindow {
    pub fn around(scheduled: NaiveDateTime, policy: &AccessPolicy) -> Self {
        let scheduled_at = civil_instant(scheduled);
        Self {
            opens_at: scheduled_at - Duration::minutes(policy.minutes_before),
            closes_at: scheduled_at + Duration::minutes(policy.minutes_after),
            scheduled_at,
        }
    }

    pub fn state_at(&self, now: &DateTime<Tz>) -> AccessState {
        if *now < self.opens_at {
            AccessState::TooEarly {
                message: format!(
                    "A consulta estará disponível a partir das {}.",
                    self.opens_at.format(DISPLAY_TIME_FORMAT)
                ),
            }
        } else if *now <= self.closes_at {
            AccessState::Open
        } else {
            AccessState::Expired {
                message: "O horário de acesso a esta consulta foi encerrado.".to_string(),
            }
        }
    }
}

/// Resultado da avaliação para um instante
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "estado", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessState {
    TooEarly { message: String },
    Open,
    Expired { message: String },
}

impl AccessState {
    pub fn is_expired(&self) -> bool {
        matches!(self, AccessState::Expired { .. })
    }
}

/// Janela de uma consulta, a partir das strings de data/horário que ela carrega
pub fn window_for(consultation: &Consultation, policy: &AccessPolicy) -> Result<AccessWindow, AccessError> {
    let scheduled = parse_display(&consultation.date, &consultation.time).ok_or_else(|| {
        AccessError::InvalidSchedule {
            id: consultation.id,
            date: consultation.date.clone(),
            time: consultation.time.clone(),
        }
    })?;
    Ok(AccessWindow::around(scheduled, policy))
}

/// Avalia em que ponto da janela a consulta está no instante `now`.
///
/// A avaliação vale para qualquer tipo de atendimento (a varredura usa o
/// resultado para presenciais também); o link, porém, só é liberado para
/// consultas online, ver [`join_link`].
pub fn evaluate_access(
    consultation: &Consultation,
    now: &DateTime<Tz>,
    policy: &AccessPolicy,
) -> Result<AccessState, AccessError> {
    Ok(window_for(consultation, policy)?.state_at(now))
}

/// Link liberado para o paciente: só online e só com a janela aberta
pub fn join_link<'a>(
    consultation: &'a Consultation,
    now: &DateTime<Tz>,
    policy: &AccessPolicy,
) -> Option<&'a str> {
    if consultation.mode != AttendanceMode::Online {
        return None;
    }
    match evaluate_access(consultation, now, policy) {
        Ok(AccessState::Open) => consultation.link.as_deref(),
        _ => None,
    }
}
