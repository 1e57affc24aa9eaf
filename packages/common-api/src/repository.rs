//! Contratos dos serviços remotos
//!
//! A lógica de agendamento depende apenas destes traits; a implementação HTTP
//! fica em [`crate::client::HttpApi`]. Com a feature `test-utils` os mocks
//! gerados pelo mockall (`MockAppointmentRepository`, ...) ficam disponíveis
//! para outros crates.

use async_trait::async_trait;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

use crate::cpf::Cpf;
use crate::error::ApiError;
use crate::models::{
    Appointment, AppointmentStatus, Consultation, Doctor, Facility, NewAppointment,
    NewConsultation, Patient, Specialty,
};

/// CRUD de agendamentos
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn find_appointment(&self, id: i64) -> Result<Option<Appointment>, ApiError>;

    async fn list_appointments(&self) -> Result<Vec<Appointment>, ApiError>;

    async fn list_by_patient(&self, patient_id: i64) -> Result<Vec<Appointment>, ApiError> {
        let all = self.list_appointments().await?;
        Ok(all.into_iter().filter(|a| a.patient_id == patient_id).collect())
    }

    async fn list_by_status(&self, status: AppointmentStatus) -> Result<Vec<Appointment>, ApiError> {
        let all = self.list_appointments().await?;
        Ok(all.into_iter().filter(|a| a.status == status).collect())
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, ApiError>;

    /// Grava o corpo completo (`PUT /agendamentos/{id}`)
    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), ApiError>;

    /// Transição só de status (`PUT /agendamentos/{id}/status`)
    async fn update_appointment_status(
        &self,
        id: i64,
        status: AppointmentStatus,
    ) -> Result<(), ApiError>;

    async fn delete_appointment(&self, id: i64) -> Result<(), ApiError>;
}

/// CRUD de consultas
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait ConsultationRepository: Send + Sync {
    async fn find_by_appointment(&self, appointment_id: i64) -> Result<Option<Consultation>, ApiError>;

    async fn list_by_patient_cpf(&self, cpf: &Cpf) -> Result<Vec<Consultation>, ApiError>;

    async fn create_consultation(&self, consultation: &NewConsultation) -> Result<Consultation, ApiError>;

    async fn update_consultation(&self, consultation: &Consultation) -> Result<(), ApiError>;
}

/// Consultas somente-leitura aos cadastros; `None` quando não encontrado
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait ReferenceDataLookup: Send + Sync {
    async fn find_doctor(&self, id: i64) -> Result<Option<Doctor>, ApiError>;

    async fn find_specialty(&self, id: i64) -> Result<Option<Specialty>, ApiError>;

    async fn find_facility(&self, id: i64) -> Result<Option<Facility>, ApiError>;

    async fn find_patient(&self, id: i64) -> Result<Option<Patient>, ApiError>;

    async fn find_patient_by_cpf(&self, cpf: &Cpf) -> Result<Option<Patient>, ApiError>;

    /// Médicos associados a uma especialidade (pelo nome da especialidade)
    async fn doctors_by_specialty(&self, specialty_name: &str) -> Result<Vec<Doctor>, ApiError>;
}

/// Verificação de credenciais do administrador
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait CredentialCheck: Send + Sync {
    async fn authenticate(&self, login: &str, password: &str) -> Result<(), ApiError>;
}
