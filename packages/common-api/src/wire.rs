//! Formato JSON da API REST
//!
//! A API não é tipada de forma consistente: nomes de campo variam entre
//! versões, agendamentos online carregam uma unidade fictícia e listas chegam
//! em vários envelopes. Toda essa tolerância fica concentrada aqui; o resto do
//! código só enxerga os modelos de [`crate::models`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cpf::Cpf;
use crate::error::ApiError;
use crate::models::{
    Appointment, AppointmentStatus, AttendanceMode, Consultation, ConsultationStatus, Doctor,
    Facility, NewAppointment, NewConsultation, Patient, Specialty,
};

/// A API exige `idUnidadeSaude` mesmo para atendimentos online
pub const ONLINE_FACILITY_PLACEHOLDER: i64 = 1;

/// Formato gravado em `dataHora`
const WIRE_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Formatos aceitos na leitura de `dataHora`
const ACCEPTED_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Interpreta a data/hora civil como enviada pelo formulário ou pela API
pub fn parse_civil_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ACCEPTED_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

pub fn format_civil_datetime(value: &NaiveDateTime) -> String {
    value.format(WIRE_DATETIME_FORMAT).to_string()
}

/// Envelopes em que a API devolve listas
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    List(Vec<T>),
    Content { content: Vec<T> },
    Data { data: Vec<T> },
    Single(T),
}

impl<T> ListEnvelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListEnvelope::List(items)
            | ListEnvelope::Content { content: items }
            | ListEnvelope::Data { data: items } => items,
            ListEnvelope::Single(item) => vec![item],
        }
    }
}

/// Decodifica uma lista tolerando `null` e todos os envelopes conhecidos
pub fn decode_list<T>(body: &str) -> Result<Vec<T>, ApiError>
where
    T: for<'de> Deserialize<'de>,
{
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let envelope: Option<ListEnvelope<T>> =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(envelope.map(ListEnvelope::into_vec).unwrap_or_default())
}

fn first_text(candidates: &[&Option<String>]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn lenient_cpf(raw: Option<&str>) -> Option<Cpf> {
    let raw = raw?;
    match Cpf::parse(raw) {
        Ok(cpf) => Some(cpf),
        Err(e) => {
            debug!("CPF ignorado na resposta da API: {}", e);
            None
        }
    }
}

/// Corpo de `agendamentos`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_agendamento: Option<i64>,
    #[serde(default)]
    pub id_paciente: Option<i64>,
    #[serde(default)]
    pub id_medico: Option<i64>,
    #[serde(default)]
    pub id_especialidade: Option<i64>,
    #[serde(default)]
    pub data_hora: Option<String>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub tipo_atendimento: Option<AttendanceMode>,
    /// Nome antigo de `tipoAtendimento`
    #[serde(default, skip_serializing)]
    pub tipo_consulta: Option<AttendanceMode>,
    #[serde(default)]
    pub id_unidade_saude: Option<i64>,
    /// Nome antigo de `idUnidadeSaude`
    #[serde(default, skip_serializing)]
    pub id_unidade: Option<i64>,
    #[serde(default)]
    pub notificado: Option<Value>,
    #[serde(default)]
    pub data_hora_notificacao: Option<String>,
}

impl AppointmentDto {
    pub fn from_new(appointment: &NewAppointment) -> Self {
        Self {
            id_paciente: Some(appointment.patient_id),
            id_medico: Some(appointment.doctor_id),
            id_especialidade: Some(appointment.specialty_id),
            data_hora: Some(format_civil_datetime(&appointment.scheduled_at)),
            status: Some(AppointmentStatus::Pendente),
            tipo_atendimento: Some(appointment.mode),
            id_unidade_saude: Some(wire_facility(appointment.mode, appointment.facility_id)),
            notificado: Some(Value::String("N".to_string())),
            ..Self::default()
        }
    }

    pub fn from_appointment(appointment: &Appointment) -> Self {
        Self {
            id_agendamento: Some(appointment.id),
            id_paciente: Some(appointment.patient_id),
            id_medico: Some(appointment.doctor_id),
            id_especialidade: Some(appointment.specialty_id),
            data_hora: Some(format_civil_datetime(&appointment.scheduled_at)),
            status: Some(appointment.status),
            tipo_atendimento: Some(appointment.mode),
            id_unidade_saude: Some(wire_facility(appointment.mode, appointment.facility_id)),
            notificado: Some(Value::String(
                (if appointment.notified { "S" } else { "N" }).to_string(),
            )),
            data_hora_notificacao: appointment.notified_at.as_ref().map(format_civil_datetime),
            ..Self::default()
        }
    }
}

fn wire_facility(mode: AttendanceMode, facility_id: Option<i64>) -> i64 {
    match (mode, facility_id) {
        (AttendanceMode::Presencial, Some(id)) => id,
        _ => ONLINE_FACILITY_PLACEHOLDER,
    }
}

fn notified_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("S"),
        _ => false,
    }
}

impl TryFrom<AppointmentDto> for Appointment {
    type Error = ApiError;

    fn try_from(dto: AppointmentDto) -> Result<Self, Self::Error> {
        let missing = |field: &str| ApiError::InvalidData(format!("agendamento sem {}", field));

        let id = dto.id_agendamento.ok_or_else(|| missing("idAgendamento"))?;
        let raw_date = dto.data_hora.as_deref().ok_or_else(|| missing("dataHora"))?;
        let scheduled_at = parse_civil_datetime(raw_date).ok_or_else(|| {
            ApiError::InvalidData(format!("dataHora inválida no agendamento {}: {}", id, raw_date))
        })?;
        let mode = dto
            .tipo_atendimento
            .or(dto.tipo_consulta)
            .unwrap_or(AttendanceMode::Presencial);
        let facility_id = match mode {
            AttendanceMode::Presencial => dto.id_unidade_saude.or(dto.id_unidade),
            AttendanceMode::Online => None,
        };

        Ok(Appointment {
            id,
            patient_id: dto.id_paciente.ok_or_else(|| missing("idPaciente"))?,
            doctor_id: dto.id_medico.ok_or_else(|| missing("idMedico"))?,
            specialty_id: dto.id_especialidade.ok_or_else(|| missing("idEspecialidade"))?,
            scheduled_at,
            status: dto.status.unwrap_or(AppointmentStatus::Pendente),
            mode,
            facility_id,
            notified: notified_flag(dto.notificado.as_ref()),
            notified_at: dto.data_hora_notificacao.as_deref().and_then(parse_civil_datetime),
        })
    }
}

/// Corpo de `consultas`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_consulta: Option<i64>,
    #[serde(default, skip_serializing)]
    pub id: Option<i64>,
    #[serde(default)]
    pub id_agendamento: Option<i64>,
    #[serde(default)]
    pub cpf_paciente: Option<String>,
    #[serde(default, skip_serializing)]
    pub cpf: Option<String>,
    #[serde(default)]
    pub nome_medico: Option<String>,
    #[serde(default, skip_serializing)]
    pub medico: Option<String>,
    #[serde(default)]
    pub especialidade: Option<String>,
    #[serde(default)]
    pub nome_unidade: Option<String>,
    #[serde(default, skip_serializing)]
    pub unidade: Option<String>,
    #[serde(default)]
    pub tipo_atendimento: Option<AttendanceMode>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub horario: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    /// Mantido como texto: um status desconhecido descarta só este registro
    #[serde(default)]
    pub status: Option<String>,
}

impl ConsultationDto {
    pub fn from_new(consultation: &NewConsultation) -> Self {
        Self {
            id_agendamento: Some(consultation.appointment_id),
            cpf_paciente: consultation.patient_cpf.as_ref().map(|c| c.digits().to_string()),
            nome_medico: Some(consultation.doctor_name.clone()),
            especialidade: Some(consultation.specialty_name.clone()),
            nome_unidade: Some(consultation.facility_name.clone()),
            tipo_atendimento: Some(consultation.mode),
            data: Some(consultation.date.clone()),
            horario: Some(consultation.time.clone()),
            link: consultation.link.clone(),
            status: Some(consultation.status.as_str().to_string()),
            ..Self::default()
        }
    }

    pub fn from_consultation(consultation: &Consultation) -> Self {
        Self {
            id_consulta: Some(consultation.id),
            id_agendamento: consultation.appointment_id,
            cpf_paciente: consultation.patient_cpf.as_ref().map(|c| c.digits().to_string()),
            nome_medico: Some(consultation.doctor_name.clone()),
            especialidade: Some(consultation.specialty_name.clone()),
            nome_unidade: Some(consultation.facility_name.clone()),
            tipo_atendimento: Some(consultation.mode),
            data: Some(consultation.date.clone()),
            horario: Some(consultation.time.clone()),
            link: consultation.link.clone(),
            status: Some(consultation.status.as_str().to_string()),
            ..Self::default()
        }
    }
}

impl TryFrom<ConsultationDto> for Consultation {
    type Error = ApiError;

    fn try_from(dto: ConsultationDto) -> Result<Self, Self::Error> {
        let id = dto
            .id_consulta
            .or(dto.id)
            .ok_or_else(|| ApiError::InvalidData("consulta sem idConsulta".to_string()))?;
        let raw_status = dto.status.as_deref().unwrap_or("AGENDADA");
        let status: ConsultationStatus = serde_json::from_value(Value::String(raw_status.to_string()))
            .map_err(|_| {
                ApiError::InvalidData(format!("status desconhecido na consulta {}: {}", id, raw_status))
            })?;
        let date = first_text(&[&dto.data])
            .ok_or_else(|| ApiError::InvalidData(format!("consulta {} sem data", id)))?;
        let time = first_text(&[&dto.horario])
            .ok_or_else(|| ApiError::InvalidData(format!("consulta {} sem horário", id)))?;
        // a tela do paciente trata registros sem tipo como teleconsulta
        let mode = dto.tipo_atendimento.unwrap_or(AttendanceMode::Online);

        Ok(Consultation {
            id,
            appointment_id: dto.id_agendamento,
            patient_cpf: lenient_cpf(dto.cpf_paciente.as_deref().or(dto.cpf.as_deref())),
            doctor_name: first_text(&[&dto.nome_medico, &dto.medico])
                .unwrap_or_else(|| crate::models::NOT_AVAILABLE.to_string()),
            specialty_name: first_text(&[&dto.especialidade])
                .unwrap_or_else(|| crate::models::NOT_AVAILABLE.to_string()),
            facility_name: first_text(&[&dto.nome_unidade, &dto.unidade]).unwrap_or_else(|| {
                match mode {
                    AttendanceMode::Online => crate::models::ONLINE_FACILITY_NAME,
                    AttendanceMode::Presencial => crate::models::NOT_AVAILABLE,
                }
                .to_string()
            }),
            mode,
            date,
            time,
            link: first_text(&[&dto.link]),
            status,
        })
    }
}

/// Converte uma lista de DTOs descartando (com aviso) os registros malformados
pub fn convert_lenient<D, M>(items: Vec<D>) -> Vec<M>
where
    M: TryFrom<D, Error = ApiError>,
{
    items
        .into_iter()
        .filter_map(|dto| match M::try_from(dto) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!("Registro ignorado: {}", e);
                None
            }
        })
        .collect()
}

/// Corpo de `medicos`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorDto {
    #[serde(default)]
    pub id_medico: Option<i64>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub crm_medico: Option<String>,
    #[serde(default)]
    pub crm: Option<String>,
}

impl TryFrom<DoctorDto> for Doctor {
    type Error = ApiError;

    fn try_from(dto: DoctorDto) -> Result<Self, Self::Error> {
        let id = dto
            .id_medico
            .or(dto.id)
            .ok_or_else(|| ApiError::InvalidData("médico sem idMedico".to_string()))?;
        Ok(Doctor {
            id,
            name: first_text(&[&dto.nome]).unwrap_or_else(|| crate::models::NOT_AVAILABLE.to_string()),
            crm: first_text(&[&dto.crm_medico, &dto.crm]),
        })
    }
}

/// Corpo de `especialidades`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialtyDto {
    #[serde(default)]
    pub id_especialidade: Option<i64>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub nome_especialidade: Option<String>,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub especialidade: Option<String>,
    #[serde(default)]
    pub descricao: Option<String>,
}

impl TryFrom<SpecialtyDto> for Specialty {
    type Error = ApiError;

    fn try_from(dto: SpecialtyDto) -> Result<Self, Self::Error> {
        let id = dto
            .id_especialidade
            .or(dto.id)
            .ok_or_else(|| ApiError::InvalidData("especialidade sem idEspecialidade".to_string()))?;
        let name = first_text(&[&dto.nome_especialidade, &dto.nome, &dto.especialidade, &dto.descricao])
            .unwrap_or_else(|| crate::models::NOT_AVAILABLE.to_string());
        Ok(Specialty {
            id,
            name,
            description: first_text(&[&dto.descricao]),
        })
    }
}

/// Corpo de `unidades-saude`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityDto {
    #[serde(default)]
    pub id_unidade_saude: Option<i64>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub nome_unidade_saude: Option<String>,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub endereco: Option<String>,
}

impl TryFrom<FacilityDto> for Facility {
    type Error = ApiError;

    fn try_from(dto: FacilityDto) -> Result<Self, Self::Error> {
        let id = dto
            .id_unidade_saude
            .or(dto.id)
            .ok_or_else(|| ApiError::InvalidData("unidade sem idUnidadeSaude".to_string()))?;
        Ok(Facility {
            id,
            name: first_text(&[&dto.nome_unidade_saude, &dto.nome])
                .unwrap_or_else(|| crate::models::NOT_AVAILABLE.to_string()),
            address: first_text(&[&dto.endereco]),
        })
    }
}

/// Corpo de `pacientes`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDto {
    #[serde(default)]
    pub id_paciente: Option<i64>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(default)]
    pub data_nascimento: Option<String>,
}

impl TryFrom<PatientDto> for Patient {
    type Error = ApiError;

    fn try_from(dto: PatientDto) -> Result<Self, Self::Error> {
        let id = dto
            .id_paciente
            .or(dto.id)
            .ok_or_else(|| ApiError::InvalidData("paciente sem idPaciente".to_string()))?;
        Ok(Patient {
            id,
            name: first_text(&[&dto.nome]).unwrap_or_else(|| crate::models::NOT_AVAILABLE.to_string()),
            cpf: lenient_cpf(dto.cpf.as_deref()),
            birth_date: first_text(&[&dto.data_nascimento]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_civil_datetime_formats() {
        let expected = NaiveDateTime::parse_from_str("2025-01-15 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        for raw in ["2025-01-15T09:00", "2025-01-15T09:00:00", "2025-01-15 09:00", "2025-01-15T09:00:00.000"] {
            assert_eq!(parse_civil_datetime(raw), Some(expected), "{}", raw);
        }
        assert_eq!(parse_civil_datetime("15/01/2025 09:00"), None);
        assert_eq!(format_civil_datetime(&expected), "2025-01-15T09:00:00");
    }

    #[test]
    fn test_online_appointment_drops_placeholder_facility() {
        let dto: AppointmentDto = serde_json::from_value(json!({
            "idAgendamento": 7,
            "idPaciente": 1,
            "idMedico": 2,
            "idEspecialidade": 3,
            "dataHora": "2025-01-15T09:00",
            "status": "CONFIRMADO",
            "tipoAtendimento": "ONLINE",
            "idUnidadeSaude": 1,
            "notificado": "N"
        }))
        .unwrap();
        let appt = Appointment::try_from(dto).unwrap();
        assert_eq!(appt.mode, AttendanceMode::Online);
        assert_eq!(appt.facility_id, None);

        let back = serde_json::to_value(AppointmentDto::from_appointment(&appt)).unwrap();
        assert_eq!(back["idUnidadeSaude"], json!(1));
        assert_eq!(back["tipoAtendimento"], json!("ONLINE"));
        assert_eq!(back["dataHora"], json!("2025-01-15T09:00:00"));
        assert_eq!(back["notificado"], json!("N"));
    }

    #[test]
    fn test_legacy_appointment_field_names() {
        let dto: AppointmentDto = serde_json::from_value(json!({
            "idAgendamento": 8,
            "idPaciente": 1,
            "idMedico": 2,
            "idEspecialidade": 3,
            "dataHora": "2025-01-15T10:30:00",
            "status": "CONCLUIDO",
            "tipoConsulta": "PRESENCIAL",
            "idUnidade": 4,
            "notificado": true
        }))
        .unwrap();
        let appt = Appointment::try_from(dto).unwrap();
        assert_eq!(appt.status, AppointmentStatus::Confirmado);
        assert_eq!(appt.facility_id, Some(4));
        assert!(appt.notified);
    }

    #[test]
    fn test_decode_list_envelopes() {
        let item = json!({"idConsulta": 1, "data": "15/01/2025", "horario": "09:00"});
        for body in [
            json!([item.clone()]),
            json!({"content": [item.clone()]}),
            json!({"data": [item.clone()]}),
            item.clone(),
        ] {
            let list: Vec<ConsultationDto> = decode_list(&body.to_string()).unwrap();
            assert_eq!(list.len(), 1, "{}", body);
            assert_eq!(list[0].id_consulta, Some(1));
        }
        assert!(decode_list::<ConsultationDto>("null").unwrap().is_empty());
        assert!(decode_list::<ConsultationDto>("").unwrap().is_empty());
    }

    #[test]
    fn test_consultation_aliases_and_defaults() {
        let dto: ConsultationDto = serde_json::from_value(json!({
            "id": 5,
            "cpf": "771.583.130-18",
            "medico": "Dr. Carlos Oliveira",
            "especialidade": "Clínica Geral",
            "data": "15/01/2025",
            "horario": "09:00",
            "status": "Agendada"
        }))
        .unwrap();
        let c = Consultation::try_from(dto).unwrap();
        assert_eq!(c.id, 5);
        assert_eq!(c.doctor_name, "Dr. Carlos Oliveira");
        assert_eq!(c.facility_name, "Online");
        assert_eq!(c.patient_cpf.unwrap().digits(), "77158313018");
        assert_eq!(c.status, ConsultationStatus::Agendada);
        assert_eq!(c.link, None);
    }

    #[test]
    fn test_unknown_consultation_status_is_dropped_leniently() {
        let items: Vec<ConsultationDto> = decode_list(
            &json!([
                {"idConsulta": 1, "data": "15/01/2025", "horario": "09:00", "status": "AGENDADA"},
                {"idConsulta": 2, "data": "15/01/2025", "horario": "09:00", "status": "PERDIDA"}
            ])
            .to_string(),
        )
        .unwrap();
        let consultations: Vec<Consultation> = convert_lenient(items);
        assert_eq!(consultations.len(), 1);
        assert_eq!(consultations[0].id, 1);
    }

    #[test]
    fn test_specialty_name_fallback_chain() {
        let dto: SpecialtyDto = serde_json::from_value(json!({
            "idEspecialidade": 3,
            "descricao": "Cuidados com o coração",
            "nome": "Cardiologia"
        }))
        .unwrap();
        let s = Specialty::try_from(dto).unwrap();
        assert_eq!(s.name, "Cardiologia");
        assert_eq!(s.description.as_deref(), Some("Cuidados com o coração"));

        let dto: SpecialtyDto = serde_json::from_value(json!({"id": 4, "descricao": "Pediatria"})).unwrap();
        assert_eq!(Specialty::try_from(dto).unwrap().name, "Pediatria");
    }

    #[test]
    fn test_consultation_wire_body() {
        let new = NewConsultation {
            appointment_id: 9,
            patient_cpf: Cpf::parse("771.583.130-18").ok(),
            doctor_name: "Dra. Ana Costa".into(),
            specialty_name: "Pediatria".into(),
            facility_name: "Online".into(),
            mode: AttendanceMode::Online,
            date: "18/01/2025".into(),
            time: "14:30".into(),
            link: Some("https://meet.google.com/".into()),
            status: ConsultationStatus::Agendada,
        };
        let body = serde_json::to_value(ConsultationDto::from_new(&new)).unwrap();
        assert_eq!(body["idAgendamento"], json!(9));
        assert_eq!(body["cpfPaciente"], json!("77158313018"));
        assert_eq!(body["status"], json!("AGENDADA"));
        assert!(body.get("idConsulta").is_none());
        assert!(body.get("cpf").is_none());
    }
}
