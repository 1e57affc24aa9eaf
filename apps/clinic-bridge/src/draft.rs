//! Rascunho de agendamento vindo do formulário do administrador
//!
//! A validação local nunca para no primeiro erro: todos os campos inválidos
//! voltam juntos, com a mensagem pronta para exibição.

use chrono::NaiveDateTime;
use common_api::cpf::Cpf;
use common_api::models::{AttendanceMode, Doctor};
use common_api::wire::parse_civil_datetime;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use validator::{Validate, ValidationError};

/// Erros de validação por campo do formulário
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra o erro do campo; o primeiro erro de cada campo prevalece
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        f.write_str(&parts.join("; "))
    }
}

fn default_mode() -> AttendanceMode {
    AttendanceMode::Presencial
}

/// Dados do formulário de agendamento
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDraft {
    #[serde(rename = "cpfPaciente", default)]
    #[validate(custom = "validate_cpf_field")]
    pub patient_cpf: String,

    #[serde(rename = "idEspecialidade", default)]
    #[validate(required(message = "Selecione uma especialidade."))]
    pub specialty_id: Option<i64>,

    #[serde(rename = "idMedico", default)]
    #[validate(required(message = "Selecione um médico."))]
    pub doctor_id: Option<i64>,

    #[serde(rename = "dataHora", default)]
    #[validate(custom = "validate_datetime_field")]
    pub scheduled_at: String,

    #[serde(rename = "tipoAtendimento", alias = "tipoConsulta", default = "default_mode")]
    pub mode: AttendanceMode,

    #[serde(rename = "idUnidade", alias = "idUnidadeSaude", default)]
    pub facility_id: Option<i64>,
}

/// Rascunho que passou na validação local
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedDraft {
    pub cpf: Cpf,
    pub specialty_id: i64,
    pub doctor_id: i64,
    pub scheduled_at: NaiveDateTime,
    pub mode: AttendanceMode,
    /// Sempre `None` para atendimento online
    pub facility_id: Option<i64>,
}

fn validate_cpf_field(value: &str) -> Result<(), ValidationError> {
    Cpf::parse(value).map(|_| ()).map_err(|e| {
        let mut err = ValidationError::new("cpf");
        err.message = Some(Cow::from(e.to_string()));
        err
    })
}

fn validate_datetime_field(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some(Cow::from("Selecione data e hora."));
        return Err(err);
    }
    match parse_civil_datetime(value) {
        Some(_) => Ok(()),
        None => {
            let mut err = ValidationError::new("datetime");
            err.message = Some(Cow::from("Data e hora inválidas."));
            Err(err)
        }
    }
}

/// Nome do campo no formulário para cada campo da struct
fn form_field(field: &str) -> &str {
    match field {
        "patient_cpf" => "cpfPaciente",
        "specialty_id" => "especialidade",
        "doctor_id" => "idMedico",
        "scheduled_at" => "dataHora",
        "facility_id" => "idUnidade",
        other => other,
    }
}

impl AppointmentDraft {
    /// O formulário envia `0` para "nenhum selecionado"
    fn normalized(&self) -> Self {
        let positive = |v: Option<i64>| v.filter(|id| *id > 0);
        Self {
            specialty_id: positive(self.specialty_id),
            doctor_id: positive(self.doctor_id),
            facility_id: positive(self.facility_id),
            ..self.clone()
        }
    }

    /// Validação local completa, sem nenhuma chamada de rede
    pub fn check(&self) -> Result<CheckedDraft, FieldErrors> {
        let draft = self.normalized();
        let mut errors = FieldErrors::new();

        if let Err(found) = draft.validate() {
            for (field, list) in found.field_errors() {
                for error in list.iter() {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Campo inválido.".to_string());
                    errors.add(form_field(field), message);
                }
            }
        }

        if draft.mode == AttendanceMode::Presencial && draft.facility_id.is_none() {
            errors.add("idUnidade", "Selecione uma unidade de atendimento.");
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        // os campos abaixo já foram conferidos pelo validate()
        let cpf = Cpf::parse(&draft.patient_cpf).map_err(|e| single("cpfPaciente", e.to_string()))?;
        let scheduled_at = parse_civil_datetime(&draft.scheduled_at)
            .ok_or_else(|| single("dataHora", "Data e hora inválidas."))?;

        Ok(CheckedDraft {
            cpf,
            specialty_id: draft.specialty_id.ok_or_else(|| single("especialidade", "Selecione uma especialidade."))?,
            doctor_id: draft.doctor_id.ok_or_else(|| single("idMedico", "Selecione um médico."))?,
            scheduled_at,
            mode: draft.mode,
            facility_id: match draft.mode {
                AttendanceMode::Presencial => draft.facility_id,
                AttendanceMode::Online => None,
            },
        })
    }
}

fn single(field: &str, message: impl Into<String>) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.add(field, message);
    errors
}

/// Médico escolhido depois de trocar a especialidade.
///
/// Na criação a escolha sempre volta para "nenhum". Na edição, mantém o médico
/// atual se ele também atende a nova especialidade.
pub fn doctor_after_specialty_change(
    current: Option<i64>,
    options: &[Doctor],
    editing: bool,
) -> Option<i64> {
    match current {
        Some(id) if editing && options.iter().any(|d| d.id == id) => Some(id),
        _ => None,
    }
}
