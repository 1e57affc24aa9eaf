//! API em memória para os testes do serviço
//!
//! Implementa todos os repositórios sobre um único estado compartilhado,
//! com pontos de falha configuráveis.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use common_api::cpf::Cpf;
use common_api::models::{
    Appointment, AppointmentStatus, Consultation, Doctor, Facility,
    NewAppointment, NewConsultation, Patient, Specialty,
};
use common_api::repository::{
    AppointmentRepository, ConsultationRepository, CredentialCheck, ReferenceDataLookup,
};
use common_api::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    WriteAppointment,
    CreateConsultation,
    UpdateConsultation,
    ListConsultations,
}

#[derive(Default)]
struct State {
    appointments: BTreeMap<i64, Appointment>,
    consultations: BTreeMap<i64, Consultation>,
    doctors: Vec<(Doctor, i64)>,
    specialties: Vec<Specialty>,
    facilities: Vec<Facility>,
    patients: Vec<Patient>,
    next_id: i64,
    failures: HashSet<FailPoint>,
    remote_calls: usize,
    writes: usize,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, point: FailPoint) -> Result<(), ApiError> {
        if self.failures.contains(&point) {
            Err(ApiError::Status {
                status: 500,
                message: format!("falha simulada em {:?}", point),
            })
        } else {
            Ok(())
        }
    }
}

pub struct InMemoryApi {
    state: Mutex<State>,
}

impl InMemoryApi {
    pub const CLINICA_GERAL: i64 = 1;
    pub const CARDIOLOGIA: i64 = 2;
    pub const DR_CARLOS: i64 = 10;
    pub const DRA_ANA: i64 = 11;
    pub const DR_JOAO: i64 = 12;
    pub const UNIDADE_CENTRO: i64 = 4;
    pub const PATIENT_CPF: &'static str = "77158313018";

    /// Cadastros mínimos: duas especialidades, três médicos, uma unidade e um paciente
    pub fn seeded() -> Self {
        let doctor = |id: i64, name: &str| Doctor {
            id,
            name: name.to_string(),
            crm: None,
        };
        let state = State {
            doctors: vec![
                (doctor(Self::DR_CARLOS, "Dr. Carlos Oliveira"), Self::CLINICA_GERAL),
                (doctor(Self::DRA_ANA, "Dra. Ana Costa"), Self::CLINICA_GERAL),
                (doctor(Self::DR_JOAO, "Dr. João Silva"), Self::CARDIOLOGIA),
            ],
            specialties: vec![
                Specialty {
                    id: Self::CLINICA_GERAL,
                    name: "Clínica Geral".into(),
                    description: None,
                },
                Specialty {
                    id: Self::CARDIOLOGIA,
                    name: "Cardiologia".into(),
                    description: None,
                },
            ],
            facilities: vec![Facility {
                id: Self::UNIDADE_CENTRO,
                name: "Unidade Centro".into(),
                address: None,
            }],
            patients: vec![Patient {
                id: 1,
                name: "Maria Souza".into(),
                cpf: Cpf::parse(Self::PATIENT_CPF).ok(),
                birth_date: None,
            }],
            next_id: 100,
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    fn call<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        self.with(|s| {
            s.remote_calls += 1;
            f(s)
        })
    }

    pub fn fail_at(&self, point: FailPoint) {
        self.with(|s| s.failures.insert(point));
    }

    pub fn remote_calls(&self) -> usize {
        self.with(|s| s.remote_calls)
    }

    pub fn write_count(&self) -> usize {
        self.with(|s| s.writes)
    }

    pub fn appointment_count(&self) -> usize {
        self.with(|s| s.appointments.len())
    }

    pub fn consultation_count(&self) -> usize {
        self.with(|s| s.consultations.len())
    }

    pub fn appointment(&self, id: i64) -> Option<Appointment> {
        self.with(|s| s.appointments.get(&id).cloned())
    }

    pub fn consultation(&self, id: i64) -> Option<Consultation> {
        self.with(|s| s.consultations.get(&id).cloned())
    }

    pub fn consultations_for(&self, appointment_id: i64) -> Vec<Consultation> {
        self.with(|s| {
            s.consultations
                .values()
                .filter(|c| c.appointment_id == Some(appointment_id))
                .cloned()
                .collect()
        })
    }

    pub fn insert_consultation(&self, consultation: Consultation) {
        self.with(|s| s.consultations.insert(consultation.id, consultation));
    }

    pub fn force_status(&self, id: i64, status: AppointmentStatus) {
        self.with(|s| {
            if let Some(a) = s.appointments.get_mut(&id) {
                a.status = status;
            }
        });
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryApi {
    async fn find_appointment(&self, id: i64) -> Result<Option<Appointment>, ApiError> {
        self.call(|s| Ok(s.appointments.get(&id).cloned()))
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, ApiError> {
        self.call(|s| Ok(s.appointments.values().cloned().collect()))
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> Result<Appointment, ApiError> {
        self.call(|s| {
            s.check(FailPoint::WriteAppointment)?;
            s.writes += 1;
            let id = s.next_id();
            let created = appointment.clone().into_appointment(id);
            s.appointments.insert(id, created.clone());
            Ok(created)
        })
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<(), ApiError> {
        self.call(|s| {
            s.check(FailPoint::WriteAppointment)?;
            s.writes += 1;
            s.appointments.insert(appointment.id, appointment.clone());
            Ok(())
        })
    }

    async fn update_appointment_status(
        &self,
        id: i64,
        status: AppointmentStatus,
    ) -> Result<(), ApiError> {
        self.call(|s| {
            s.check(FailPoint::WriteAppointment)?;
            s.writes += 1;
            match s.appointments.get_mut(&id) {
                Some(a) => {
                    a.status = status;
                    Ok(())
                }
                None => Err(ApiError::Status {
                    status: 404,
                    message: "Agendamento não encontrado".into(),
                }),
            }
        })
    }

    async fn delete_appointment(&self, id: i64) -> Result<(), ApiError> {
        self.call(|s| {
            s.check(FailPoint::WriteAppointment)?;
            s.writes += 1;
            s.appointments.remove(&id);
            Ok(())
        })
    }
}

#[async_trait]
impl ConsultationRepository for InMemoryApi {
    async fn find_by_appointment(&self, appointment_id: i64) -> Result<Option<Consultation>, ApiError> {
        self.call(|s| {
            Ok(s.consultations
                .values()
                .find(|c| c.appointment_id == Some(appointment_id))
                .cloned())
        })
    }

    async fn list_by_patient_cpf(&self, cpf: &Cpf) -> Result<Vec<Consultation>, ApiError> {
        self.call(|s| {
            s.check(FailPoint::ListConsultations)?;
            Ok(s.consultations
                .values()
                .filter(|c| c.patient_cpf.as_ref() == Some(cpf))
                .cloned()
                .collect())
        })
    }

    async fn create_consultation(&self, consultation: &NewConsultation) -> Result<Consultation, ApiError> {
        self.call(|s| {
            s.check(FailPoint::CreateConsultation)?;
            s.writes += 1;
            let id = s.next_id();
            let created = consultation.clone().into_consultation(id);
            s.consultations.insert(id, created.clone());
            Ok(created)
        })
    }

    async fn update_consultation(&self, consultation: &Consultation) -> Result<(), ApiError> {
        self.call(|s| {
            s.check(FailPoint::UpdateConsultation)?;
            s.writes += 1;
            s.consultations.insert(consultation.id, consultation.clone());
            Ok(())
        })
    }
}

#[async_trait]
impl ReferenceDataLookup for InMemoryApi {
    async fn find_doctor(&self, id: i64) -> Result<Option<Doctor>, ApiError> {
        self.call(|s| Ok(s.doctors.iter().find(|(d, _)| d.id == id).map(|(d, _)| d.clone())))
    }

    async fn find_specialty(&self, id: i64) -> Result<Option<Specialty>, ApiError> {
        self.call(|s| Ok(s.specialties.iter().find(|sp| sp.id == id).cloned()))
    }

    async fn find_facility(&self, id: i64) -> Result<Option<Facility>, ApiError> {
        self.call(|s| Ok(s.facilities.iter().find(|f| f.id == id).cloned()))
    }

    async fn find_patient(&self, id: i64) -> Result<Option<Patient>, ApiError> {
        self.call(|s| Ok(s.patients.iter().find(|p| p.id == id).cloned()))
    }

    async fn find_patient_by_cpf(&self, cpf: &Cpf) -> Result<Option<Patient>, ApiError> {
        self.call(|s| Ok(s.patients.iter().find(|p| p.cpf.as_ref() == Some(cpf)).cloned()))
    }

    async fn doctors_by_specialty(&self, specialty_name: &str) -> Result<Vec<Doctor>, ApiError> {
        self.call(|s| {
            let specialty = s.specialties.iter().find(|sp| sp.name == specialty_name).map(|sp| sp.id);
            Ok(s.doctors
                .iter()
                .filter(|(_, sid)| Some(*sid) == specialty)
                .map(|(d, _)| d.clone())
                .collect())
        })
    }
}

#[async_trait]
impl CredentialCheck for InMemoryApi {
    async fn authenticate(&self, login: &str, password: &str) -> Result<(), ApiError> {
        self.call(|_| {
            if login == "admin" && password == "admin123" {
                Ok(())
            } else {
                Err(ApiError::Status {
                    status: 401,
                    message: "Credenciais inválidas".into(),
                })
            }
        })
    }
}
