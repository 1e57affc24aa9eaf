//! Relógio no fuso civil de Brasília
//!
//! Toda a aritmética de horários é feita em America/Sao_Paulo, montando o
//! instante a partir dos componentes civis (ano, mês, dia, hora, minuto). O
//! fuso da máquina que executa o serviço nunca entra na conta.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::America::Sao_Paulo;
use chrono_tz::Tz;

/// Fuso civil usado em todos os horários da clínica
pub const CLINIC_TZ: Tz = Sao_Paulo;

/// Formato de data exibido ao paciente
pub const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";

/// Formato de horário exibido ao paciente
pub const DISPLAY_TIME_FORMAT: &str = "%H:%M";

/// Fonte do instante atual
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// Relógio do sistema, convertido para o fuso da clínica
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&CLINIC_TZ)
    }
}

/// Relógio parado, para testes e simulações
#[derive(Debug, Clone)]
pub struct FixedClock(pub DateTime<Tz>);

impl FixedClock {
    pub fn at_civil(value: NaiveDateTime) -> Self {
        Self(civil_instant(value))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.0
    }
}

/// Resolve um horário civil (sem offset) para um instante em Brasília.
///
/// Em horários ambíguos (fim do antigo horário de verão) vale o primeiro;
/// em horários inexistentes (início do horário de verão) avança até o
/// primeiro instante válido.
pub fn civil_instant(value: NaiveDateTime) -> DateTime<Tz> {
    if let Some(instant) = CLINIC_TZ.from_local_datetime(&value).earliest() {
        return instant;
    }
    let mut probe = value;
    for _ in 0..4 {
        probe += Duration::minutes(30);
        if let Some(instant) = CLINIC_TZ.from_local_datetime(&probe).earliest() {
            return instant;
        }
    }
    // lacunas de fuso nunca passam de duas horas; só chega aqui com tzdata corrompido
    CLINIC_TZ.from_utc_datetime(&value)
}

/// Monta o horário civil a partir das strings de exibição da consulta
pub fn parse_display(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date.trim(), DISPLAY_DATE_FORMAT).ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), DISPLAY_TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .ok()?;
    Some(date.and_time(time))
}

/// Separa o horário civil em data e hora de exibição
pub fn format_display(value: &NaiveDateTime) -> (String, String) {
    (
        value.format(DISPLAY_DATE_FORMAT).to_string(),
        value.format(DISPLAY_TIME_FORMAT).to_string(),
    )
}
