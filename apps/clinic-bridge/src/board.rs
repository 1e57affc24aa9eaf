//! Quadro de consultas da sessão do paciente
//!
//! Guarda a lista de consultas do CPF da sessão e resolve as corridas entre
//! leituras da API e marcações locais:
//!
//! - cada troca de sessão (novo CPF ou saída) incrementa a época; leituras
//!   iniciadas numa época anterior são descartadas ao chegar
//! - REALIZADA observada localmente não é desfeita por uma leitura que foi
//!   disparada antes da observação
//! - marcações otimistas guardam o status anterior para o rollback e ficam
//!   em voo até [`ConsultationBoard::commit`] ou [`ConsultationBoard::rollback`];
//!   nenhuma leitura as desfaz enquanto isso

use std::collections::{HashMap, HashSet};

use chrono::DateTime;
use chrono_tz::Tz;
use common_api::cpf::Cpf;
use common_api::models::{Consultation, ConsultationStatus};
use serde::Serialize;
use tracing::{debug, warn};

use crate::access::{evaluate_access, join_link, AccessPolicy, AccessState};

/// Valor do filtro de especialidade que mostra todas
pub const ALL_SPECIALTIES: &str = "Todas";

/// Leitura em andamento
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    pub cpf: Cpf,
    epoch: u64,
    seq: u64,
}

/// Marcação otimista aguardando a gravação remota
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRealization {
    pub consultation: Consultation,
    previous: ConsultationStatus,
    epoch: u64,
}

/// Linha exibida ao paciente
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsultationView {
    #[serde(rename = "consulta")]
    pub consultation: Consultation,
    #[serde(rename = "acesso")]
    pub access: Option<AccessState>,
    /// Só preenchido para consulta online com a janela aberta
    pub link: Option<String>,
}

#[derive(Debug, Default)]
pub struct ConsultationBoard {
    cpf: Option<Cpf>,
    epoch: u64,
    seq: u64,
    consultations: Vec<Consultation>,
    /// seq em que REALIZADA foi observada, por consulta
    realized_at: HashMap<i64, u64>,
    /// Marcações otimistas com gravação pendente
    in_flight: HashSet<i64>,
}

impl ConsultationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_patient(cpf: Cpf) -> Self {
        let mut board = Self::new();
        board.replace_patient(cpf);
        board
    }

    pub fn cpf(&self) -> Option<&Cpf> {
        self.cpf.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn consultations(&self) -> &[Consultation] {
        &self.consultations
    }

    /// Troca o CPF da sessão; tudo que estava em voo fica obsoleto
    pub fn replace_patient(&mut self, cpf: Cpf) {
        self.epoch += 1;
        self.cpf = Some(cpf);
        self.consultations.clear();
        self.realized_at.clear();
        self.in_flight.clear();
    }

    /// Paciente saiu; a lista é esvaziada imediatamente
    pub fn clear_patient(&mut self) {
        self.epoch += 1;
        self.cpf = None;
        self.consultations.clear();
        self.realized_at.clear();
        self.in_flight.clear();
    }

    /// Marca o início de uma leitura; `None` sem paciente na sessão
    pub fn begin_refresh(&self) -> Option<RefreshTicket> {
        self.cpf.as_ref().map(|cpf| RefreshTicket {
            cpf: cpf.clone(),
            epoch: self.epoch,
            seq: self.seq,
        })
    }

    /// Aplica o resultado de uma leitura.
    ///
    /// Retorna `false` se a leitura é de uma sessão anterior e foi descartada.
    pub fn apply_refresh(&mut self, ticket: &RefreshTicket, fetched: Vec<Consultation>) -> bool {
        if ticket.epoch != self.epoch {
            debug!(ticket_epoch = ticket.epoch, epoch = self.epoch, "Leitura obsoleta descartada");
            return false;
        }

        let mut merged = Vec::with_capacity(fetched.len());
        for mut consultation in fetched {
            let observed_after_read = self.in_flight.contains(&consultation.id)
                || self
                    .realized_at
                    .get(&consultation.id)
                    .map_or(false, |seen| *seen > ticket.seq);

            if observed_after_read && consultation.status != ConsultationStatus::Realizada {
                consultation.status = ConsultationStatus::Realizada;
            } else if consultation.status == ConsultationStatus::Realizada {
                if !self.realized_at.contains_key(&consultation.id) {
                    self.seq += 1;
                    self.realized_at.insert(consultation.id, self.seq);
                }
            } else {
                // leitura posterior à observação: a API manda
                self.realized_at.remove(&consultation.id);
            }
            merged.push(consultation);
        }

        self.consultations = merged;
        true
    }

    /// Consultas a mostrar com o filtro de especialidade (`None` ou "Todas" = sem filtro)
    pub fn filtered(&self, specialty: Option<&str>) -> Vec<&Consultation> {
        let filter = specialty
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(ALL_SPECIALTIES));
        self.consultations
            .iter()
            .filter(|c| match filter {
                Some(name) => c.specialty_name.eq_ignore_ascii_case(name),
                None => true,
            })
            .collect()
    }

    /// Lista de exibição com estado da janela e link liberado
    pub fn view(&self, specialty: Option<&str>, now: &DateTime<Tz>, policy: &AccessPolicy) -> Vec<ConsultationView> {
        self.filtered(specialty)
            .into_iter()
            .map(|c| ConsultationView {
                access: evaluate_access(c, now, policy).ok(),
                link: join_link(c, now, policy).map(str::to_string),
                consultation: c.clone(),
            })
            .collect()
    }

    /// Marca como REALIZADA as consultas cuja janela já fechou.
    ///
    /// A marcação é otimista: cada item retornado precisa ser gravado na API
    /// e, em caso de falha, desfeito com [`ConsultationBoard::rollback`].
    /// Consultas já realizadas não são retornadas de novo.
    pub fn take_expired(&mut self, now: &DateTime<Tz>, policy: &AccessPolicy) -> Vec<PendingRealization> {
        let mut pending = Vec::new();
        for consultation in self.consultations.iter_mut() {
            if consultation.status == ConsultationStatus::Realizada
                || self.in_flight.contains(&consultation.id)
            {
                continue;
            }
            match evaluate_access(consultation, now, policy) {
                Ok(state) if state.is_expired() => {
                    let previous = consultation.status;
                    consultation.status = ConsultationStatus::Realizada;
                    self.seq += 1;
                    self.realized_at.insert(consultation.id, self.seq);
                    self.in_flight.insert(consultation.id);
                    pending.push(PendingRealization {
                        consultation: consultation.clone(),
                        previous,
                        epoch: self.epoch,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Consulta ignorada na varredura"),
            }
        }
        pending
    }

    /// Confirma uma marcação otimista gravada na API.
    ///
    /// Leituras iniciadas antes deste ponto podem ainda trazer o status
    /// antigo, então a observação é renovada.
    pub fn commit(&mut self, pending: &PendingRealization) {
        if pending.epoch != self.epoch {
            return;
        }
        let id = pending.consultation.id;
        if self.in_flight.remove(&id) {
            self.seq += 1;
            self.realized_at.insert(id, self.seq);
        }
    }

    /// Desfaz uma marcação otimista cuja gravação falhou
    pub fn rollback(&mut self, pending: &PendingRealization) {
        if pending.epoch != self.epoch {
            return;
        }
        let id = pending.consultation.id;
        self.in_flight.remove(&id);
        if let Some(consultation) = self.consultations.iter_mut().find(|c| c.id == id) {
            if consultation.status == ConsultationStatus::Realizada {
                consultation.status = pending.previous;
            }
        }
        self.realized_at.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::CLINIC_TZ;
    use chrono::TimeZone;
    use common_api::models::AttendanceMode;

    fn cpf() -> Cpf {
        Cpf::parse("77158313018").unwrap()
    }

    fn consultation(id: i64, specialty: &str, time: &str) -> Consultation {
        Consultation {
            id,
            appointment_id: Some(id + 100),
            patient_cpf: Some(cpf()),
            doctor_name: "Dr. Carlos Oliveira".into(),
            specialty_name: specialty.into(),
            facility_name: "Online".into(),
            mode: AttendanceMode::Online,
            date: "15/01/2025".into(),
            time: time.into(),
            link: Some("https://meet.google.com/".into()),
            status: ConsultationStatus::Agendada,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Tz> {
        CLINIC_TZ.with_ymd_and_hms(2025, 1, 15, h, m, 0).unwrap()
    }

    #[test]
    fn test_stale_session_results_are_discarded() {
        let mut board = ConsultationBoard::for_patient(cpf());
        let ticket = board.begin_refresh().unwrap();

        board.clear_patient();
        assert!(!board.apply_refresh(&ticket, vec![consultation(1, "Cardiologia", "09:00")]));
        assert!(board.consultations().is_empty());

        board.replace_patient(Cpf::parse("52998224725").unwrap());
        assert!(!board.apply_refresh(&ticket, vec![consultation(1, "Cardiologia", "09:00")]));
        assert!(board.consultations().is_empty());
        assert!(board.begin_refresh().is_some());
    }

    #[test]
    fn test_realized_is_sticky_against_older_reads() {
        let mut board = ConsultationBoard::for_patient(cpf());
        let first = board.begin_refresh().unwrap();
        board.apply_refresh(&first, vec![consultation(1, "Cardiologia", "09:00")]);

        // leitura disparada antes da varredura, resposta chega depois
        let slow = board.begin_refresh().unwrap();
        let pending = board.take_expired(&at(9, 10), &AccessPolicy::default());
        assert_eq!(pending.len(), 1);

        board.apply_refresh(&slow, vec![consultation(1, "Cardiologia", "09:00")]);
        assert_eq!(board.consultations()[0].status, ConsultationStatus::Realizada);
        board.commit(&pending[0]);

        // leitura posterior à gravação prevalece
        let fresh = board.begin_refresh().unwrap();
        board.apply_refresh(&fresh, vec![consultation(1, "Cardiologia", "09:00")]);
        assert_eq!(board.consultations()[0].status, ConsultationStatus::Agendada);
    }

    #[test]
    fn test_take_expired_is_idempotent() {
        let mut board = ConsultationBoard::for_patient(cpf());
        let ticket = board.begin_refresh().unwrap();
        board.apply_refresh(
            &ticket,
            vec![consultation(1, "Cardiologia", "09:00"), consultation(2, "Cardiologia", "11:00")],
        );

        let policy = AccessPolicy::default();
        let first = board.take_expired(&at(9, 10), &policy);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].consultation.id, 1);
        assert!(board.take_expired(&at(9, 10), &policy).is_empty());
    }

    #[test]
    fn test_read_during_pending_write_keeps_realized() {
        let mut board = ConsultationBoard::for_patient(cpf());
        let ticket = board.begin_refresh().unwrap();
        board.apply_refresh(&ticket, vec![consultation(1, "Cardiologia", "09:00")]);
        let policy = AccessPolicy::default();

        let pending = board.take_expired(&at(9, 10), &policy);
        assert_eq!(pending.len(), 1);

        // leitura disparada com a gravação ainda em voo
        let during = board.begin_refresh().unwrap();
        board.apply_refresh(&during, vec![consultation(1, "Cardiologia", "09:00")]);
        assert_eq!(board.consultations()[0].status, ConsultationStatus::Realizada);
        assert!(board.take_expired(&at(9, 10), &policy).is_empty());

        // a mesma leitura chegando depois da gravação também não regride
        let late = board.begin_refresh().unwrap();
        board.commit(&pending[0]);
        board.apply_refresh(&late, vec![consultation(1, "Cardiologia", "09:00")]);
        assert_eq!(board.consultations()[0].status, ConsultationStatus::Realizada);
        assert!(board.take_expired(&at(9, 10), &policy).is_empty());
    }

    #[test]
    fn test_rollback_restores_previous_status() {
        let mut board = ConsultationBoard::for_patient(cpf());
        let ticket = board.begin_refresh().unwrap();
        let mut rescheduled = consultation(1, "Cardiologia", "09:00");
        rescheduled.status = ConsultationStatus::Reagendada;
        board.apply_refresh(&ticket, vec![rescheduled]);

        let pending = board.take_expired(&at(9, 10), &AccessPolicy::default());
        board.rollback(&pending[0]);
        assert_eq!(board.consultations()[0].status, ConsultationStatus::Reagendada);

        // depois do rollback a próxima varredura tenta de novo
        assert_eq!(board.take_expired(&at(9, 10), &AccessPolicy::default()).len(), 1);
    }

    #[test]
    fn test_specialty_filter() {
        let mut board = ConsultationBoard::for_patient(cpf());
        let ticket = board.begin_refresh().unwrap();
        board.apply_refresh(
            &ticket,
            vec![consultation(1, "Cardiologia", "09:00"), consultation(2, "Clínica Geral", "11:00")],
        );

        assert_eq!(board.filtered(None).len(), 2);
        assert_eq!(board.filtered(Some("Todas")).len(), 2);
        let only = board.filtered(Some("Cardiologia"));
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].id, 1);
    }

    #[test]
    fn test_view_exposes_link_only_inside_window() {
        let mut board = ConsultationBoard::for_patient(cpf());
        let ticket = board.begin_refresh().unwrap();
        board.apply_refresh(&ticket, vec![consultation(1, "Cardiologia", "09:00")]);
        let policy = AccessPolicy::default();

        let open = board.view(None, &at(8, 50), &policy);
        assert_eq!(open[0].access, Some(AccessState::Open));
        assert_eq!(open[0].link.as_deref(), Some("https://meet.google.com/"));

        let early = board.view(None, &at(8, 0), &policy);
        assert_eq!(early[0].link, None);
    }
}
