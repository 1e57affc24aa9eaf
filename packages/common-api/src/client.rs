//! Cliente HTTP da API REST da clínica
//!
//! Implementa os traits de [`crate::repository`] sobre `reqwest`. Todas as
//! requisições enviam `Accept: application/json`; as de escrita enviam também
//! `Content-Type: application/json`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cpf::Cpf;
use crate::error::ApiError;
use crate::models::{
    Appointment, AppointmentStatus, Consultation, Doctor, Facility, NewAppointment,
    NewConsultation, Patient, Specialty,
};
use crate::repository::{
    AppointmentRepository, ConsultationRepository, CredentialCheck, ReferenceDataLookup,
};
use crate::wire::{
    convert_lenient, decode_list, AppointmentDto, ConsultationDto, DoctorDto, FacilityDto,
    PatientDto, SpecialtyDto,
};

/// Trecho da resposta do backend quando há registros ligados ao agendamento
const RELATED_RECORDS_MARKER: &str = "Erro ao remover agendamento";

/// Cliente da API REST (agendamentos, consultas e cadastros)
#[derive(Debug, Clone)]
pub struct HttpApi {
    base_url: String,
    client: Client,
}

impl HttpApi {
    /// Cria o cliente apontando para `base_url` com o timeout informado
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "API respondeu com erro");
        Err(ApiError::from_response(status, &body))
    }

    /// GET de um recurso único; 404 vira `None`
    async fn get_optional<D>(&self, path: &str) -> Result<Option<D>, ApiError>
    where
        D: DeserializeOwned,
    {
        match self.send(self.client.get(self.url(path))).await {
            Ok(response) => {
                let body = response.text().await?;
                if body.trim().is_empty() || body.trim() == "null" {
                    return Ok(None);
                }
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| ApiError::Decode(e.to_string()))
            }
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_list<D>(&self, path: &str) -> Result<Vec<D>, ApiError>
    where
        D: DeserializeOwned,
    {
        let response = self.send(self.client.get(self.url(path))).await?;
        let body = response.text().await?;
        decode_list(&body)
    }

    /// Requisição de escrita; `.json()` define o `Content-Type`
    fn write<B: Serialize + ?Sized>(&self, method: reqwest::Method, path: &str, body: &B) -> RequestBuilder {
        self.client.request(method, self.url(path)).json(body)
    }
}

fn into_model<D, M>(dto: Option<D>) -> Result<Option<M>, ApiError>
where
    M: TryFrom<D, Error = ApiError>,
{
    dto.map(M::try_from).transpose()
}

#[async_trait]
impl AppointmentRepository for HttpApi {
    async fn find_appointment(&self, id: i64) -> Result<Option<Appointment>, ApiError> {
        let dto: Option<AppointmentDto> = self.get_optional(&format!("agendamentos/{}", id)).await?;
        into_model(dto)
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, ApiError> {
        let items: Vec<AppointmentDto> = self.get_list("agendamentos").await?;
        Ok(convert_lenient(items))
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, ApiError> {
        let body = AppointmentDto::from_new(appointment);
        let response = self
            .send(self.write(reqwest::Method::POST, "agendamentos", &body))
            .await?;
        let text = response.text().await?;

        // algumas versões da API respondem só com o id, ou sem corpo
        let created: Option<AppointmentDto> = serde_json::from_str(&text).ok();
        match created.and_then(|dto| Appointment::try_from(dto).ok()) {
            Some(appt) => Ok(appt),
            None => match text.trim().parse::<i64>() {
                Ok(id) => Ok(appointment.clone().into_appointment(id)),
                Err(_) => Err(ApiError::Decode(
                    "resposta de criação de agendamento sem idAgendamento".to_string(),
                )),
            },
        }
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), ApiError> {
        let body = AppointmentDto::from_appointment(appointment);
        self.send(self.write(
            reqwest::Method::PUT,
            &format!("agendamentos/{}", appointment.id),
            &body,
        ))
        .await?;
        Ok(())
    }

    async fn update_appointment_status(
        &self,
        id: i64,
        status: AppointmentStatus,
    ) -> Result<(), ApiError> {
        let request = self
            .client
            .put(self.url(&format!("agendamentos/{}/status", id)))
            .query(&[("status", status.as_str())]);
        self.send(request).await?;
        Ok(())
    }

    async fn delete_appointment(&self, id: i64) -> Result<(), ApiError> {
        match self
            .send(self.client.delete(self.url(&format!("agendamentos/{}", id))))
            .await
        {
            Ok(_) => Ok(()),
            Err(ApiError::Status { status: 404, message }) if message.contains(RELATED_RECORDS_MARKER) => {
                warn!(id, "Exclusão recusada: agendamento possui registros relacionados");
                Err(ApiError::Status {
                    status: 404,
                    message: "Não é possível excluir este agendamento. Existem registros relacionados \
                              (notificações, histórico, etc.) que impedem a exclusão."
                        .to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ConsultationRepository for HttpApi {
    async fn find_by_appointment(&self, appointment_id: i64) -> Result<Option<Consultation>, ApiError> {
        let path = format!("consultas/agendamento/{}", appointment_id);
        let response = match self.send(self.client.get(self.url(&path))).await {
            Ok(response) => response,
            Err(ApiError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let items: Vec<ConsultationDto> = decode_list(&response.text().await?)?;
        let consultations: Vec<Consultation> = convert_lenient(items);
        Ok(consultations
            .into_iter()
            .find(|c| c.appointment_id == Some(appointment_id)))
    }

    async fn list_by_patient_cpf(&self, cpf: &Cpf) -> Result<Vec<Consultation>, ApiError> {
        let path = format!("consultas/paciente/{}", cpf.digits());
        let items: Vec<ConsultationDto> = match self.get_list(&path).await {
            Ok(items) => items,
            Err(ApiError::Status { status: 404, .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        let consultations: Vec<Consultation> = convert_lenient(items);
        // o endpoint antigo devolvia consultas de outros pacientes junto;
        // linha sem CPF legível não é do paciente
        Ok(consultations
            .into_iter()
            .filter(|c| c.patient_cpf.as_ref() == Some(cpf))
            .collect())
    }

    async fn create_consultation(&self, consultation: &NewConsultation) -> Result<Consultation, ApiError> {
        let body = ConsultationDto::from_new(consultation);
        let response = self
            .send(self.write(reqwest::Method::POST, "consultas", &body))
            .await?;
        let text = response.text().await?;

        let created: Option<ConsultationDto> = serde_json::from_str(&text).ok();
        match created.and_then(|dto| Consultation::try_from(dto).ok()) {
            Some(c) => Ok(c),
            None => match text.trim().parse::<i64>() {
                Ok(id) => Ok(consultation.clone().into_consultation(id)),
                Err(_) => Err(ApiError::Decode(
                    "resposta de criação de consulta sem idConsulta".to_string(),
                )),
            },
        }
    }

    async fn update_consultation(&self, consultation: &Consultation) -> Result<(), ApiError> {
        let body = ConsultationDto::from_consultation(consultation);
        self.send(self.write(
            reqwest::Method::PUT,
            &format!("consultas/{}", consultation.id),
            &body,
        ))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReferenceDataLookup for HttpApi {
    async fn find_doctor(&self, id: i64) -> Result<Option<Doctor>, ApiError> {
        let dto: Option<DoctorDto> = self.get_optional(&format!("medicos/{}", id)).await?;
        into_model(dto)
    }

    async fn find_specialty(&self, id: i64) -> Result<Option<Specialty>, ApiError> {
        let dto: Option<SpecialtyDto> = self.get_optional(&format!("especialidades/{}", id)).await?;
        into_model(dto)
    }

    async fn find_facility(&self, id: i64) -> Result<Option<Facility>, ApiError> {
        let dto: Option<FacilityDto> = self.get_optional(&format!("unidades-saude/{}", id)).await?;
        into_model(dto)
    }

    async fn find_patient(&self, id: i64) -> Result<Option<Patient>, ApiError> {
        let dto: Option<PatientDto> = self.get_optional(&format!("pacientes/{}", id)).await?;
        into_model(dto)
    }

    async fn find_patient_by_cpf(&self, cpf: &Cpf) -> Result<Option<Patient>, ApiError> {
        let dto: Option<PatientDto> = self
            .get_optional(&format!("pacientes/cpf/{}", cpf.digits()))
            .await?;
        into_model(dto)
    }

    async fn doctors_by_specialty(&self, specialty_name: &str) -> Result<Vec<Doctor>, ApiError> {
        let mut url = reqwest::Url::parse(&self.url("medicos-especialidades/especialidade"))
            .map_err(|e| ApiError::InvalidData(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidData("URL base inválida".to_string()))?
            .push(specialty_name)
            .push("medicos");

        let response = match self.send(self.client.get(url)).await {
            Ok(response) => response,
            Err(ApiError::Status { status: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let items: Vec<DoctorDto> = decode_list(&response.text().await?)?;
        Ok(convert_lenient(items))
    }
}

#[async_trait]
impl CredentialCheck for HttpApi {
    async fn authenticate(&self, login: &str, password: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url("logins/autenticar"))
            .query(&[("login", login), ("senha", password)]);
        self.send(request).await?;
        Ok(())
    }
}
