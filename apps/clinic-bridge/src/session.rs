//! Sessões abertas no serviço
//!
//! Uma sessão é do administrador (após autenticação na API) ou do paciente
//! (identificado só pelo CPF). A sessão do paciente é dona do quadro de
//! consultas e da varredura periódica; encerrar a sessão esvazia o quadro
//! e para a varredura.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::DateTime;
use chrono_tz::Tz;
use common_api::cpf::Cpf;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::board::ConsultationBoard;
use crate::scheduler::SweeperHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "papel", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin { username: String },
    Patient { cpf: Cpf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    #[serde(flatten)]
    pub role: Role,
    pub started_at: DateTime<Tz>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin { .. })
    }
}

struct PatientRuntime {
    board: Arc<Mutex<ConsultationBoard>>,
    sweeper: SweeperHandle,
}

struct Entry {
    session: Session,
    runtime: Option<PatientRuntime>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: StdMutex<HashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Entry>> {
        // um pânico com o lock tomado não deixa o mapa inconsistente
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn open_admin(&self, username: &str, now: DateTime<Tz>) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            role: Role::Admin {
                username: username.to_string(),
            },
            started_at: now,
        };
        self.entries().insert(
            session.id,
            Entry {
                session: session.clone(),
                runtime: None,
            },
        );
        info!(session_id = %session.id, username, "Sessão de administrador aberta");
        session
    }

    pub fn open_patient(
        &self,
        cpf: Cpf,
        board: Arc<Mutex<ConsultationBoard>>,
        sweeper: SweeperHandle,
        now: DateTime<Tz>,
    ) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            role: Role::Patient { cpf: cpf.clone() },
            started_at: now,
        };
        self.entries().insert(
            session.id,
            Entry {
                session: session.clone(),
                runtime: Some(PatientRuntime { board, sweeper }),
            },
        );
        info!(session_id = %session.id, patient = %cpf.masked(), "Sessão de paciente aberta");
        session
    }

    pub fn get(&self, id: &Uuid) -> Option<Session> {
        self.entries().get(id).map(|e| e.session.clone())
    }

    pub fn board(&self, id: &Uuid) -> Option<Arc<Mutex<ConsultationBoard>>> {
        self.entries()
            .get(id)
            .and_then(|e| e.runtime.as_ref())
            .map(|r| r.board.clone())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Encerra a sessão; `false` se ela não existia
    pub async fn close(&self, id: &Uuid) -> bool {
        let Some(entry) = self.entries().remove(id) else {
            return false;
        };
        if let Some(runtime) = entry.runtime {
            runtime.sweeper.stop();
            // leituras ainda em voo chegam numa época nova e são descartadas
            runtime.board.lock().await.clear_patient();
        }
        info!(session_id = %id, "Sessão encerrada");
        true
    }

    /// Encerra todas as sessões (desligamento do serviço)
    pub async fn close_all(&self) {
        let ids: Vec<Uuid> = self.entries().keys().copied().collect();
        for id in ids {
            self.close(&id).await;
        }
    }
}
