//! Testes do cliente HTTP contra um servidor simulado (wiremock)

use std::time::Duration;

use common_api::models::{AppointmentStatus, AttendanceMode, ConsultationStatus, NewAppointment};
use common_api::repository::{
    AppointmentRepository, ConsultationRepository, CredentialCheck, ReferenceDataLookup,
};
use common_api::wire::parse_civil_datetime;
use common_api::{ApiError, Cpf, HttpApi};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api(server: &MockServer) -> HttpApi {
    HttpApi::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

fn cpf() -> Cpf {
    Cpf::parse("771.583.130-18").unwrap()
}

#[tokio::test]
async fn test_find_appointment_sends_accept_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/agendamentos/7"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "idAgendamento": 7,
            "idPaciente": 1,
            "idMedico": 2,
            "idEspecialidade": 3,
            "dataHora": "2025-01-15T09:00:00",
            "status": "PENDENTE",
            "tipoAtendimento": "PRESENCIAL",
            "idUnidadeSaude": 4,
            "notificado": "N",
            "dataHoraNotificacao": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let appt = api(&server).find_appointment(7).await.unwrap().unwrap();
    assert_eq!(appt.id, 7);
    assert_eq!(appt.facility_id, Some(4));
    assert_eq!(appt.status, AppointmentStatus::Pendente);
}

#[tokio::test]
async fn test_missing_reference_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/medicos/99"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/especialidades/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let api = api(&server);
    assert_eq!(api.find_doctor(99).await.unwrap(), None);
    assert_eq!(api.find_specialty(5).await.unwrap(), None);
}

#[tokio::test]
async fn test_create_appointment_writes_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/agendamentos"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "idPaciente": 1,
            "status": "PENDENTE",
            "tipoAtendimento": "ONLINE",
            "idUnidadeSaude": 1,
            "notificado": "N",
            "dataHora": "2025-01-15T09:00:00"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_string("42"))
        .expect(1)
        .mount(&server)
        .await;

    let new = NewAppointment {
        patient_id: 1,
        doctor_id: 2,
        specialty_id: 3,
        scheduled_at: parse_civil_datetime("2025-01-15T09:00").unwrap(),
        mode: AttendanceMode::Online,
        facility_id: None,
    };
    let created = api(&server).create_appointment(&new).await.unwrap();
    assert_eq!(created.id, 42);
    assert_eq!(created.status, AppointmentStatus::Pendente);
}

#[tokio::test]
async fn test_status_endpoint_uses_query_param() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/agendamentos/7/status"))
        .and(query_param("status", "CANCELADO"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    api(&server)
        .update_appointment_status(7, AppointmentStatus::Cancelado)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_body_becomes_display_message() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/agendamentos/7/status"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Agendamento já cancelado"})),
        )
        .mount(&server)
        .await;

    let err = api(&server)
        .update_appointment_status(7, AppointmentStatus::Cancelado)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiError::Status {
            status: 400,
            message: "Agendamento já cancelado".to_string()
        }
    );
    assert_eq!(err.to_string(), "Agendamento já cancelado");
}

#[tokio::test]
async fn test_consultations_by_cpf_tolerate_wrappers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/consultas/paciente/77158313018"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {
                    "idConsulta": 1,
                    "idAgendamento": 7,
                    "cpfPaciente": "77158313018",
                    "nomeMedico": "Dr. João Silva",
                    "especialidade": "Cardiologia",
                    "nomeUnidade": "Online",
                    "tipoAtendimento": "ONLINE",
                    "data": "28/01/2025",
                    "horario": "11:30",
                    "link": "https://meet.google.com/abc",
                    "status": "AGENDADA"
                },
                {
                    "idConsulta": 2,
                    "cpfPaciente": "52998224725",
                    "data": "28/01/2025",
                    "horario": "11:30",
                    "status": "AGENDADA"
                }
            ]
        })))
        .mount(&server)
        .await;

    let list = api(&server).list_by_patient_cpf(&cpf()).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, 1);
    assert_eq!(list[0].status, ConsultationStatus::Agendada);
    assert_eq!(list[0].link.as_deref(), Some("https://meet.google.com/abc"));
}

#[tokio::test]
async fn test_consultation_by_appointment_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/consultas/agendamento/7"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert_eq!(api(&server).find_by_appointment(7).await.unwrap(), None);
}

#[tokio::test]
async fn test_consultations_by_cpf_drop_rows_of_other_or_unknown_patients() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/consultas/paciente/77158313018"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"idConsulta": 1, "cpfPaciente": "77158313018", "data": "28/01/2025", "horario": "11:30", "status": "AGENDADA"},
            {"idConsulta": 2, "cpfPaciente": "111.111.111-11", "data": "28/01/2025", "horario": "11:30", "status": "AGENDADA"},
            {"idConsulta": 3, "data": "28/01/2025", "horario": "11:30", "status": "AGENDADA"}
        ])))
        .mount(&server)
        .await;

    let list = api(&server).list_by_patient_cpf(&cpf()).await.unwrap();
    let ids: Vec<i64> = list.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn test_consultation_by_appointment_requires_matching_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/consultas/agendamento/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"idConsulta": 40, "cpfPaciente": "77158313018", "data": "28/01/2025", "horario": "11:30", "status": "AGENDADA"},
            {"idConsulta": 41, "idAgendamento": 8, "data": "28/01/2025", "horario": "11:30", "status": "AGENDADA"}
        ])))
        .mount(&server)
        .await;

    assert_eq!(api(&server).find_by_appointment(7).await.unwrap(), None);
}

#[tokio::test]
async fn test_doctors_by_specialty_encodes_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/medicos-especialidades/especialidade/Cl%C3%ADnica%20Geral/medicos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"idMedico": 2, "nome": "Dr. Carlos Oliveira", "crmMedico": "CRM-SP 1234"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let doctors = api(&server).doctors_by_specialty("Clínica Geral").await.unwrap();
    assert_eq!(doctors.len(), 1);
    assert_eq!(doctors[0].crm.as_deref(), Some("CRM-SP 1234"));
}

#[tokio::test]
async fn test_delete_with_related_records() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/agendamentos/7"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Erro ao remover agendamento: FK"))
        .mount(&server)
        .await;

    let err = api(&server).delete_appointment(7).await.unwrap_err();
    assert!(err.to_string().contains("registros relacionados"));
}

#[tokio::test]
async fn test_authenticate_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logins/autenticar"))
        .and(query_param("login", "admin"))
        .and(query_param("senha", "errada"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = api(&server).authenticate("admin", "errada").await.unwrap_err();
    assert_eq!(err.to_string(), "Credenciais inválidas");
}

#[tokio::test]
async fn test_network_failure_is_reported() {
    // porta 9 (discard) sem servidor escutando
    let api = HttpApi::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let err = api.find_appointment(1).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
}
