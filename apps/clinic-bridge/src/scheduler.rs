//! Varredura periódica das consultas do paciente
//!
//! Enquanto a sessão do paciente está ativa, uma tarefa em segundo plano
//! recarrega as consultas do CPF e marca como REALIZADA as que já passaram
//! da janela de acesso. Consultas de agendamentos cancelados não entram no
//! quadro e por isso nunca são varridas. A tarefa para quando a sessão é encerrada ou o
//! handle é descartado.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use common_api::models::{AppointmentStatus, Consultation, ConsultationStatus};
use common_api::repository::{AppointmentRepository, ConsultationRepository};
use common_api::ApiError;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::access::{evaluate_access, AccessPolicy};
use crate::board::ConsultationBoard;
use crate::clock::Clock;

/// Intervalo padrão entre varreduras
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Resultado de uma varredura
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Consultas gravadas como REALIZADA
    pub realized: Vec<i64>,
    /// Gravações que falharam (status local restaurado)
    pub failed: Vec<i64>,
    /// Consultas com data/horário ilegíveis
    pub skipped: Vec<i64>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.realized.is_empty() && self.failed.is_empty() && self.skipped.is_empty()
    }
}

pub struct ConsultationSweeper {
    repo: Arc<dyn ConsultationRepository>,
    appointments: Arc<dyn AppointmentRepository>,
    policy: AccessPolicy,
}

impl ConsultationSweeper {
    pub fn new(
        repo: Arc<dyn ConsultationRepository>,
        appointments: Arc<dyn AppointmentRepository>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            repo,
            appointments,
            policy,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Marca como REALIZADA cada consulta cuja janela já fechou.
    ///
    /// A mudança é aplicada na lista antes da gravação; se a gravação falhar
    /// o status anterior volta e a falha só é registrada no relatório.
    /// Consultas já realizadas não geram nova gravação.
    pub async fn sweep_for_completion(
        &self,
        consultations: &mut [Consultation],
        now: &DateTime<Tz>,
    ) -> SweepReport {
        let mut report = SweepReport::default();

        for consultation in consultations.iter_mut() {
            if consultation.status == ConsultationStatus::Realizada {
                continue;
            }
            match evaluate_access(consultation, now, &self.policy) {
                Ok(state) if state.is_expired() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "Consulta ignorada na varredura");
                    report.skipped.push(consultation.id);
                    continue;
                }
            }

            let previous = consultation.status;
            consultation.status = ConsultationStatus::Realizada;
            match self.repo.update_consultation(consultation).await {
                Ok(()) => report.realized.push(consultation.id),
                Err(e) => {
                    warn!(consultation_id = consultation.id, error = %e, "Falha ao marcar consulta como realizada");
                    consultation.status = previous;
                    report.failed.push(consultation.id);
                }
            }
        }

        report
    }

    /// Mesma varredura sobre o quadro da sessão.
    ///
    /// O lock não é mantido durante as chamadas à API.
    pub async fn sweep_board(&self, board: &Mutex<ConsultationBoard>, now: &DateTime<Tz>) -> SweepReport {
        let pending = board.lock().await.take_expired(now, &self.policy);
        let mut report = SweepReport::default();

        for item in pending {
            match self.repo.update_consultation(&item.consultation).await {
                Ok(()) => {
                    board.lock().await.commit(&item);
                    report.realized.push(item.consultation.id);
                }
                Err(e) => {
                    warn!(
                        consultation_id = item.consultation.id,
                        error = %e,
                        "Falha ao marcar consulta como realizada"
                    );
                    board.lock().await.rollback(&item);
                    report.failed.push(item.consultation.id);
                }
            }
        }

        report
    }

    /// Recarrega as consultas do CPF da sessão.
    ///
    /// Em caso de falha mantém a lista atual; retorna `false` se nada foi aplicado.
    pub async fn refresh(&self, board: &Mutex<ConsultationBoard>) -> bool {
        let Some(ticket) = board.lock().await.begin_refresh() else {
            return false;
        };
        let fetched = match self.repo.list_by_patient_cpf(&ticket.cpf).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(patient = %ticket.cpf.masked(), error = %e, "Falha ao carregar consultas do paciente");
                return false;
            }
        };
        match self.without_cancelled(fetched).await {
            Ok(visible) => board.lock().await.apply_refresh(&ticket, visible),
            Err(e) => {
                warn!(patient = %ticket.cpf.masked(), error = %e, "Falha ao conferir agendamentos das consultas");
                false
            }
        }
    }

    /// Remove as consultas cujo agendamento foi cancelado
    async fn without_cancelled(&self, fetched: Vec<Consultation>) -> Result<Vec<Consultation>, ApiError> {
        let mut visible = Vec::with_capacity(fetched.len());
        for consultation in fetched {
            if let Some(appointment_id) = consultation.appointment_id {
                let appointment = self.appointments.find_appointment(appointment_id).await?;
                if appointment.map_or(false, |a| a.status == AppointmentStatus::Cancelado) {
                    debug!(consultation_id = consultation.id, appointment_id, "Consulta de agendamento cancelado oculta");
                    continue;
                }
            }
            visible.push(consultation);
        }
        Ok(visible)
    }
}

/// Handle da tarefa periódica; descartar o handle para a tarefa
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Para a tarefa e espera ela terminar
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Inicia a varredura periódica: a cada tick recarrega e depois varre.
///
/// O primeiro tick é imediato, então a lista é carregada logo na abertura
/// da sessão.
pub fn spawn_sweeper(
    sweeper: Arc<ConsultationSweeper>,
    board: Arc<Mutex<ConsultationBoard>>,
    clock: Arc<dyn Clock>,
    period: Duration,
) -> SweeperHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    // sender descartado também encerra
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    sweeper.refresh(&board).await;
                    let report = sweeper.sweep_board(&board, &clock.now()).await;
                    if report.is_empty() {
                        debug!("Varredura sem alterações");
                    } else {
                        info!(
                            realized = report.realized.len(),
                            failed = report.failed.len(),
                            "Varredura de consultas concluída"
                        );
                    }
                }
            }
        }
        debug!("Varredura encerrada");
    });

    SweeperHandle {
        stop: stop_tx,
        task: Some(task),
    }
}
