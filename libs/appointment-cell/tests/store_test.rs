use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::*;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn store_for(server: &MockServer) -> SupabaseAppointmentStore {
    SupabaseAppointmentStore::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config())
}

fn row(id: Uuid, status: &str) -> serde_json::Value {
    MockSupabaseResponses::appointment_row(id, Uuid::new_v4(), Uuid::new_v4(), "2025-06-16T09:00:00Z", status)
}

#[tokio::test]
async fn conditional_update_filters_on_version_and_bumps_it() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    let mut updated_row = row(id, "confirmed");
    updated_row["version"] = json!(2);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(query_param("version", "eq.1"))
        .and(body_partial_json(json!({ "status": "confirmed", "version": 2 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([updated_row])))
        .expect(1)
        .mount(&server)
        .await;

    let mut appointment: Appointment = serde_json::from_value(row(id, "pending")).unwrap();
    appointment.status = AppointmentStatus::Confirmed;

    let saved = store_for(&server).update_if_version(&appointment).await.unwrap();
    assert_eq!(saved.version, 2);
    assert_eq!(saved.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn empty_conditional_update_on_existing_row_is_a_conflict() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(id, "cancelled")])))
        .mount(&server)
        .await;

    let appointment: Appointment = serde_json::from_value(row(id, "pending")).unwrap();
    let result = store_for(&server).update_if_version(&appointment).await;

    assert_matches!(result, Err(AppointmentError::Conflict));
}

#[tokio::test]
async fn empty_conditional_update_on_missing_row_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let appointment: Appointment = serde_json::from_value(row(Uuid::new_v4(), "pending")).unwrap();
    let result = store_for(&server).update_if_version(&appointment).await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn reminder_candidates_query_confirmed_unreminded_rows() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.confirmed"))
        .and(query_param("reminder_24h_sent", "eq.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(Uuid::new_v4(), "confirmed")])))
        .expect(1)
        .mount(&server)
        .await;

    let from = Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2025, 6, 16, 21, 0, 0).unwrap();
    let rows = store_for(&server).reminder_candidates(from, to).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn reminder_flag_write_is_conditional() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("reminder_24h_sent", "eq.false"))
        .and(body_partial_json(json!({ "reminder_24h_sent": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    // Nothing matched, so someone already set it
    assert!(!store_for(&server).mark_reminder_sent(id).await.unwrap());
}

#[tokio::test]
async fn database_failures_map_to_database_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(503).set_body_json(MockSupabaseResponses::error_response("unavailable", "503")))
        .mount(&server)
        .await;

    assert_matches!(
        store_for(&server).get(Uuid::new_v4()).await,
        Err(AppointmentError::DatabaseError(_))
    );
}
