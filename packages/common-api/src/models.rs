//! Modelos de dados compartilhados entre aplicações
//!
//! Este módulo define as estruturas de domínio usadas pelo ecossistema da
//! clínica. A tradução de/para o formato JSON da API fica em [`crate::wire`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cpf::Cpf;

/// Texto exibido quando uma referência não pôde ser resolvida
pub const NOT_AVAILABLE: &str = "N/A";

/// Nome de unidade exibido para atendimentos online
pub const ONLINE_FACILITY_NAME: &str = "Online";

/// Status possíveis de um agendamento
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    /// Agendamento inicial, aguardando confirmação do administrador
    #[serde(rename = "PENDENTE", alias = "REAGENDADO")]
    Pendente,
    /// Confirmado; a consulta do paciente já foi gerada
    #[serde(rename = "CONFIRMADO", alias = "CONCLUIDO")]
    Confirmado,
    /// Cancelado (terminal)
    #[serde(rename = "CANCELADO")]
    Cancelado,
}

/// Ações que movem um agendamento na máquina de estados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
    Confirm,
    Cancel,
    Edit,
}

impl AppointmentStatus {
    /// Tabela de transições: estado atual × ação → próximo estado.
    ///
    /// `None` significa transição recusada.
    pub fn apply(self, action: StatusAction) -> Option<AppointmentStatus> {
        use AppointmentStatus::*;
        use StatusAction::*;

        match (self, action) {
            (Pendente, Confirm) => Some(Confirmado),
            (Pendente, Cancel) | (Confirmado, Cancel) => Some(Cancelado),
            (Pendente, Edit) => Some(Pendente),
            (Confirmado, Edit) => Some(Confirmado),
            (Confirmado, Confirm) | (Cancelado, _) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == AppointmentStatus::Cancelado
    }

    /// Nome usado pela API
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pendente => "PENDENTE",
            AppointmentStatus::Confirmado => "CONFIRMADO",
            AppointmentStatus::Cancelado => "CANCELADO",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for StatusAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusAction::Confirm => write!(f, "confirmar"),
            StatusAction::Cancel => write!(f, "cancelar"),
            StatusAction::Edit => write!(f, "editar"),
        }
    }
}

/// Tipo de atendimento
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceMode {
    Presencial,
    Online,
}

impl AttendanceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceMode::Presencial => "PRESENCIAL",
            AttendanceMode::Online => "ONLINE",
        }
    }
}

impl fmt::Display for AttendanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status da consulta vista pelo paciente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsultationStatus {
    #[serde(
        rename = "AGENDADA",
        alias = "Agendada",
        alias = "CONFIRMADA",
        alias = "Confirmada",
        alias = "CONFIRMADO"
    )]
    Agendada,
    #[serde(rename = "REAGENDADA", alias = "Reagendada")]
    Reagendada,
    #[serde(rename = "REALIZADA", alias = "Realizada")]
    Realizada,
}

impl ConsultationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsultationStatus::Agendada => "AGENDADA",
            ConsultationStatus::Reagendada => "REAGENDADA",
            ConsultationStatus::Realizada => "REALIZADA",
        }
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Representa um agendamento (fonte da verdade do horário)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    /// Identificador atribuído pela API
    pub id: i64,
    /// Identificador do paciente
    pub patient_id: i64,
    /// Identificador do médico
    pub doctor_id: i64,
    /// Identificador da especialidade
    pub specialty_id: i64,
    /// Data e hora civis (fuso de Brasília, sem offset)
    pub scheduled_at: NaiveDateTime,
    /// Status atual
    pub status: AppointmentStatus,
    /// Presencial ou online
    pub mode: AttendanceMode,
    /// Unidade de saúde; presente se e somente se o atendimento é presencial
    pub facility_id: Option<i64>,
    /// Indica se o paciente já foi notificado
    pub notified: bool,
    /// Momento da notificação
    pub notified_at: Option<NaiveDateTime>,
}

/// Agendamento ainda não persistido
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub specialty_id: i64,
    pub scheduled_at: NaiveDateTime,
    pub mode: AttendanceMode,
    pub facility_id: Option<i64>,
}

impl NewAppointment {
    /// Agendamento recém-criado: sempre PENDENTE e não notificado
    pub fn into_appointment(self, id: i64) -> Appointment {
        Appointment {
            id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            specialty_id: self.specialty_id,
            scheduled_at: self.scheduled_at,
            status: AppointmentStatus::Pendente,
            mode: self.mode,
            facility_id: self.facility_id,
            notified: false,
            notified_at: None,
        }
    }
}

/// Consulta derivada de um agendamento confirmado
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: i64,
    /// Agendamento de origem (registros antigos podem não ter)
    pub appointment_id: Option<i64>,
    pub patient_cpf: Option<Cpf>,
    pub doctor_name: String,
    pub specialty_name: String,
    pub facility_name: String,
    pub mode: AttendanceMode,
    /// Data no formato `dd/mm/aaaa`
    pub date: String,
    /// Horário no formato `HH:MM`
    pub time: String,
    /// Link da teleconsulta (apenas online)
    pub link: Option<String>,
    pub status: ConsultationStatus,
}

/// Consulta ainda não persistida
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConsultation {
    pub appointment_id: i64,
    pub patient_cpf: Option<Cpf>,
    pub doctor_name: String,
    pub specialty_name: String,
    pub facility_name: String,
    pub mode: AttendanceMode,
    pub date: String,
    pub time: String,
    pub link: Option<String>,
    pub status: ConsultationStatus,
}

impl NewConsultation {
    pub fn into_consultation(self, id: i64) -> Consultation {
        Consultation {
            id,
            appointment_id: Some(self.appointment_id),
            patient_cpf: self.patient_cpf,
            doctor_name: self.doctor_name,
            specialty_name: self.specialty_name,
            facility_name: self.facility_name,
            mode: self.mode,
            date: self.date,
            time: self.time,
            link: self.link,
            status: self.status,
        }
    }
}

/// Médico
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    pub crm: Option<String>,
}

/// Especialidade médica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialty {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Unidade de saúde
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facility {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
}

/// Paciente
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub cpf: Option<Cpf>,
    pub birth_date: Option<String>,
}
