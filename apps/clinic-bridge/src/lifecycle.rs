//! Ciclo de vida do agendamento
//!
//! Criação, confirmação, cancelamento, edição e remoção de agendamentos. O
//! agendamento é a fonte da verdade: ele é sempre gravado primeiro, e a
//! consulta vista pelo paciente é derivada dele. Se a gravação da consulta
//! falhar depois, o erro diz exatamente isso
//! ([`LifecycleError::ConsultationSyncFailed`]) e o agendamento não é desfeito.

use std::sync::Arc;

use common_api::models::{
    Appointment, AppointmentStatus, AttendanceMode, Consultation, ConsultationStatus, Doctor,
    Facility, NewAppointment, NewConsultation, Patient, Specialty, StatusAction, NOT_AVAILABLE,
    ONLINE_FACILITY_NAME,
};
use common_api::repository::{AppointmentRepository, ConsultationRepository, ReferenceDataLookup};
use common_api::ApiError;
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::format_display;
use crate::draft::{doctor_after_specialty_change, AppointmentDraft, CheckedDraft, FieldErrors};
use crate::error::LifecycleError;

/// Link padrão das teleconsultas
pub const DEFAULT_MEETING_LINK: &str = "https://meet.google.com/";

/// Opções do seletor de médico de uma especialidade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoctorOptions {
    #[serde(rename = "medicos")]
    pub doctors: Vec<Doctor>,
    #[serde(rename = "idMedicoSelecionado")]
    pub selected: Option<i64>,
}

/// Rascunho validado e com todas as referências resolvidas
#[derive(Debug, Clone)]
struct ResolvedDraft {
    checked: CheckedDraft,
    patient: Patient,
    specialty: Specialty,
    doctor: Doctor,
    facility: Option<Facility>,
}

impl ResolvedDraft {
    fn apply_to(&self, appointment: &Appointment) -> Appointment {
        Appointment {
            patient_id: self.patient.id,
            doctor_id: self.doctor.id,
            specialty_id: self.specialty.id,
            scheduled_at: self.checked.scheduled_at,
            mode: self.checked.mode,
            facility_id: self.checked.facility_id,
            ..appointment.clone()
        }
    }

    fn facility_name(&self) -> String {
        match (self.checked.mode, &self.facility) {
            (AttendanceMode::Online, _) => ONLINE_FACILITY_NAME.to_string(),
            (AttendanceMode::Presencial, Some(f)) => f.name.clone(),
            (AttendanceMode::Presencial, None) => NOT_AVAILABLE.to_string(),
        }
    }
}

/// Campos que mudaram numa edição
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub schedule: bool,
    pub doctor: bool,
    pub specialty: bool,
    pub facility: bool,
    pub mode: bool,
    pub patient: bool,
}

impl ChangeSet {
    pub fn between(before: &Appointment, after: &Appointment) -> Self {
        Self {
            schedule: before.scheduled_at != after.scheduled_at,
            doctor: before.doctor_id != after.doctor_id,
            specialty: before.specialty_id != after.specialty_id,
            facility: before.facility_id != after.facility_id,
            mode: before.mode != after.mode,
            patient: before.patient_id != after.patient_id,
        }
    }

    pub fn any(&self) -> bool {
        self.schedule || self.doctor || self.specialty || self.facility || self.mode || self.patient
    }
}

/// Resultado de uma confirmação
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    #[serde(rename = "agendamento")]
    pub appointment: Appointment,
    #[serde(rename = "consulta")]
    pub consultation: Consultation,
}

/// O que aconteceu com a consulta derivada numa edição
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "situacao", content = "consulta", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsultationSync {
    /// Agendamento não confirmado; não há consulta
    NotApplicable,
    /// Nenhum campo relevante mudou
    Unchanged,
    Updated(Consultation),
    /// Agendamento confirmado sem consulta correspondente
    Missing,
}

/// Resultado de uma edição
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    #[serde(rename = "agendamento")]
    pub appointment: Appointment,
    #[serde(rename = "sincronizacao")]
    pub consultation: ConsultationSync,
    #[serde(rename = "alteracoes")]
    pub changes: ChangeSet,
}

/// Operações de agendamento sobre os repositórios remotos
pub struct AppointmentLifecycle {
    appointments: Arc<dyn AppointmentRepository>,
    consultations: Arc<dyn ConsultationRepository>,
    references: Arc<dyn ReferenceDataLookup>,
    meeting_link: String,
}

impl AppointmentLifecycle {
    pub fn new(
        appointments: Arc<dyn AppointmentRepository>,
        consultations: Arc<dyn ConsultationRepository>,
        references: Arc<dyn ReferenceDataLookup>,
    ) -> Self {
        Self {
            appointments,
            consultations,
            references,
            meeting_link: DEFAULT_MEETING_LINK.to_string(),
        }
    }

    pub fn with_meeting_link(mut self, link: impl Into<String>) -> Self {
        self.meeting_link = link.into();
        self
    }

    /// Cria um agendamento PENDENTE
    pub async fn create(&self, draft: &AppointmentDraft) -> Result<Appointment, LifecycleError> {
        let checked = draft.check().map_err(LifecycleError::Validation)?;
        let resolved = self.resolve(checked).await?;

        let new = NewAppointment {
            patient_id: resolved.patient.id,
            doctor_id: resolved.doctor.id,
            specialty_id: resolved.specialty.id,
            scheduled_at: resolved.checked.scheduled_at,
            mode: resolved.checked.mode,
            facility_id: resolved.checked.facility_id,
        };
        let created = self.appointments.create_appointment(&new).await?;

        info!(
            appointment_id = created.id,
            patient = %resolved.checked.cpf.masked(),
            mode = %created.mode,
            "Agendamento criado"
        );
        Ok(created)
    }

    /// Confirma um agendamento PENDENTE e materializa a consulta do paciente
    pub async fn confirm(&self, id: i64) -> Result<Confirmation, LifecycleError> {
        let current = self.load(id).await?;
        let next = transition(&current, StatusAction::Confirm)?;

        let confirmed = Appointment {
            status: next,
            ..current
        };
        self.appointments.update_appointment(&confirmed).await?;
        info!(appointment_id = id, "Agendamento confirmado");

        match self.materialize_consultation(&confirmed).await {
            Ok(consultation) => Ok(Confirmation {
                appointment: confirmed,
                consultation,
            }),
            Err(source) => {
                warn!(appointment_id = id, error = %source, "Consulta não gerada após confirmação");
                Err(LifecycleError::ConsultationSyncFailed {
                    appointment: Box::new(confirmed),
                    source,
                })
            }
        }
    }

    /// Cancela o agendamento; a consulta derivada, se houver, fica como está
    pub async fn cancel(&self, id: i64) -> Result<Appointment, LifecycleError> {
        let current = self.load(id).await?;
        let next = transition(&current, StatusAction::Cancel)?;

        self.appointments.update_appointment_status(id, next).await?;
        info!(appointment_id = id, from = %current.status, "Agendamento cancelado");

        Ok(Appointment {
            status: next,
            ..current
        })
    }

    /// Edita um agendamento PENDENTE ou CONFIRMADO.
    ///
    /// Se o agendamento está confirmado e a data/hora mudou, a edição só
    /// acontece com `reschedule_acknowledged`; caso contrário nada é gravado.
    pub async fn edit(
        &self,
        id: i64,
        draft: &AppointmentDraft,
        reschedule_acknowledged: bool,
    ) -> Result<EditOutcome, LifecycleError> {
        let current = self.load(id).await?;
        transition(&current, StatusAction::Edit)?;

        let checked = draft.check().map_err(LifecycleError::Validation)?;
        if current.status == AppointmentStatus::Confirmado
            && checked.scheduled_at != current.scheduled_at
            && !reschedule_acknowledged
        {
            return Err(LifecycleError::ReschedulePending);
        }

        let resolved = self.resolve(checked).await?;
        let updated = resolved.apply_to(&current);
        let changes = ChangeSet::between(&current, &updated);

        if !changes.any() {
            let consultation = match current.status {
                AppointmentStatus::Confirmado => ConsultationSync::Unchanged,
                _ => ConsultationSync::NotApplicable,
            };
            return Ok(EditOutcome {
                appointment: current,
                consultation,
                changes,
            });
        }

        self.appointments.update_appointment(&updated).await?;
        info!(appointment_id = id, changes = ?changes, "Agendamento editado");

        if updated.status != AppointmentStatus::Confirmado {
            return Ok(EditOutcome {
                appointment: updated,
                consultation: ConsultationSync::NotApplicable,
                changes,
            });
        }

        match self.propagate_edit(&updated, &resolved, &changes).await {
            Ok(consultation) => Ok(EditOutcome {
                appointment: updated,
                consultation,
                changes,
            }),
            Err(source) => {
                warn!(appointment_id = id, error = %source, "Consulta não sincronizada após edição");
                Err(LifecycleError::ConsultationSyncFailed {
                    appointment: Box::new(updated),
                    source,
                })
            }
        }
    }

    /// Agendamentos cadastrados, opcionalmente filtrados por status
    pub async fn list(&self, status: Option<AppointmentStatus>) -> Result<Vec<Appointment>, LifecycleError> {
        let list = match status {
            Some(status) => self.appointments.list_by_status(status).await?,
            None => self.appointments.list_appointments().await?,
        };
        Ok(list)
    }

    /// Remove o agendamento
    pub async fn remove(&self, id: i64) -> Result<(), LifecycleError> {
        self.appointments.delete_appointment(id).await?;
        info!(appointment_id = id, "Agendamento removido");
        Ok(())
    }

    /// Médicos que atendem a especialidade, para o seletor do formulário,
    /// com o médico que continua selecionado depois da troca
    pub async fn doctor_options(
        &self,
        specialty_id: i64,
        current_doctor: Option<i64>,
        editing: bool,
    ) -> Result<DoctorOptions, LifecycleError> {
        let doctors = match self.references.find_specialty(specialty_id).await? {
            Some(specialty) => self.references.doctors_by_specialty(&specialty.name).await?,
            None => Vec::new(),
        };
        let selected = doctor_after_specialty_change(current_doctor, &doctors, editing);
        Ok(DoctorOptions { doctors, selected })
    }

    async fn load(&self, id: i64) -> Result<Appointment, LifecycleError> {
        self.appointments
            .find_appointment(id)
            .await?
            .ok_or(LifecycleError::AppointmentNotFound(id))
    }

    /// Segunda fase da validação: confere as referências na API
    async fn resolve(&self, checked: CheckedDraft) -> Result<ResolvedDraft, LifecycleError> {
        let patient = self
            .references
            .find_patient_by_cpf(&checked.cpf)
            .await?
            .ok_or(LifecycleError::PatientNotFound)?;

        let mut errors = FieldErrors::new();

        let specialty = self.references.find_specialty(checked.specialty_id).await?;
        let doctor = match &specialty {
            Some(s) => {
                let options = self.references.doctors_by_specialty(&s.name).await?;
                options.into_iter().find(|d| d.id == checked.doctor_id)
            }
            None => {
                errors.add("especialidade", "Especialidade não encontrada.");
                None
            }
        };
        if specialty.is_some() && doctor.is_none() {
            errors.add("idMedico", "O médico selecionado não atende esta especialidade.");
        }

        let facility = match checked.facility_id {
            Some(facility_id) => {
                let found = self.references.find_facility(facility_id).await?;
                if found.is_none() {
                    errors.add("idUnidade", "Unidade de atendimento não encontrada.");
                }
                found
            }
            None => None,
        };

        match (specialty, doctor) {
            (Some(specialty), Some(doctor)) if errors.is_empty() => Ok(ResolvedDraft {
                checked,
                patient,
                specialty,
                doctor,
                facility,
            }),
            _ => Err(LifecycleError::Validation(errors)),
        }
    }

    /// Gera (ou reaproveita) a consulta de um agendamento recém-confirmado
    async fn materialize_consultation(&self, appointment: &Appointment) -> Result<Consultation, ApiError> {
        let patient_cpf = self
            .references
            .find_patient(appointment.patient_id)
            .await?
            .and_then(|p| p.cpf);
        if patient_cpf.is_none() {
            warn!(
                appointment_id = appointment.id,
                patient_id = appointment.patient_id,
                "Paciente sem CPF; a consulta não aparecerá na área do paciente"
            );
        }

        let doctor_name =
            self.display_name(self.references.find_doctor(appointment.doctor_id).await, |d| d.name);
        let specialty_name = self.display_name(
            self.references.find_specialty(appointment.specialty_id).await,
            |s| s.name,
        );
        let facility_name = match (appointment.mode, appointment.facility_id) {
            (AttendanceMode::Online, _) => ONLINE_FACILITY_NAME.to_string(),
            (AttendanceMode::Presencial, Some(fid)) => {
                self.display_name(self.references.find_facility(fid).await, |f| f.name)
            }
            (AttendanceMode::Presencial, None) => NOT_AVAILABLE.to_string(),
        };

        let (date, time) = format_display(&appointment.scheduled_at);
        let fresh = NewConsultation {
            appointment_id: appointment.id,
            patient_cpf,
            doctor_name,
            specialty_name,
            facility_name,
            mode: appointment.mode,
            date,
            time,
            link: self.link_for(appointment.mode, None),
            status: ConsultationStatus::Agendada,
        };

        // reconfirmação de um registro antigo: atualiza em vez de duplicar
        if let Some(existing) = self.consultations.find_by_appointment(appointment.id).await? {
            let refreshed = fresh.into_consultation(existing.id);
            self.consultations.update_consultation(&refreshed).await?;
            info!(
                appointment_id = appointment.id,
                consultation_id = refreshed.id,
                "Consulta existente atualizada na confirmação"
            );
            return Ok(refreshed);
        }

        let created = self.consultations.create_consultation(&fresh).await?;
        info!(
            appointment_id = appointment.id,
            consultation_id = created.id,
            "Consulta criada"
        );
        Ok(created)
    }

    /// Propaga para a consulta os campos alterados numa edição
    async fn propagate_edit(
        &self,
        appointment: &Appointment,
        resolved: &ResolvedDraft,
        changes: &ChangeSet,
    ) -> Result<ConsultationSync, ApiError> {
        let Some(mut consultation) = self.consultations.find_by_appointment(appointment.id).await? else {
            warn!(
                appointment_id = appointment.id,
                "Agendamento confirmado sem consulta correspondente"
            );
            return Ok(ConsultationSync::Missing);
        };

        if changes.doctor {
            consultation.doctor_name = resolved.doctor.name.clone();
        }
        if changes.specialty {
            consultation.specialty_name = resolved.specialty.name.clone();
        }
        if changes.facility || changes.mode {
            consultation.facility_name = resolved.facility_name();
        }
        if changes.mode {
            consultation.mode = appointment.mode;
            consultation.link = self.link_for(appointment.mode, consultation.link.take());
        }
        if changes.patient {
            consultation.patient_cpf = Some(resolved.checked.cpf.clone());
        }
        if changes.schedule {
            let (date, time) = format_display(&appointment.scheduled_at);
            consultation.date = date;
            consultation.time = time;
            consultation.status = ConsultationStatus::Reagendada;
        }

        self.consultations.update_consultation(&consultation).await?;
        info!(
            appointment_id = appointment.id,
            consultation_id = consultation.id,
            status = %consultation.status,
            "Consulta sincronizada com o agendamento"
        );
        Ok(ConsultationSync::Updated(consultation))
    }

    fn link_for(&self, mode: AttendanceMode, current: Option<String>) -> Option<String> {
        match mode {
            AttendanceMode::Online => current.or_else(|| Some(self.meeting_link.clone())),
            AttendanceMode::Presencial => None,
        }
    }

    /// Nome de exibição; referência ausente ou falha na busca vira "N/A"
    fn display_name<T>(
        &self,
        lookup: Result<Option<T>, ApiError>,
        name: impl FnOnce(T) -> String,
    ) -> String {
        match lookup {
            Ok(Some(found)) => name(found),
            Ok(None) => NOT_AVAILABLE.to_string(),
            Err(e) => {
                warn!(error = %e, "Falha ao resolver nome de exibição");
                NOT_AVAILABLE.to_string()
            }
        }
    }
}

fn transition(appointment: &Appointment, action: StatusAction) -> Result<AppointmentStatus, LifecycleError> {
    appointment
        .status
        .apply(action)
        .ok_or(LifecycleError::TransitionNotAllowed {
            from: appointment.status,
            action,
        })
}
