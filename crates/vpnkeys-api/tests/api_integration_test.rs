//! Integration tests for the REST surface

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt; // For `oneshot` method

use vpnkeys_api::{models::*, ApiServer, ApiServerConfig};
use vpnkeys_core::{
    CollaboratorError, Collaborators, Config, CredentialBundle, EngineOptions, Key, Maintenance,
    Notifier, Provisioner, ServiceControl, Settings, VpnKeys,
};

/// Records "<verb> <unit>" for every call
#[derive(Default)]
struct RecordingService {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ServiceControl for RecordingService {
    async fn start(&self, unit: &str) -> Result<String, CollaboratorError> {
        self.calls.lock().unwrap().push(format!("start {}", unit));
        Ok(format!("started {}", unit))
    }

    async fn stop(&self, unit: &str) -> Result<String, CollaboratorError> {
        self.calls.lock().unwrap().push(format!("stop {}", unit));
        Ok(format!("stopped {}", unit))
    }

    async fn restart(&self, unit: &str) -> Result<String, CollaboratorError> {
        self.calls.lock().unwrap().push(format!("restart {}", unit));
        Ok(format!("restarted {}", unit))
    }
}

struct StaticProvisioner;

fn bundle_for(key: &Key) -> CredentialBundle {
    CredentialBundle {
        file_name: format!("{}.ovpn", key.name),
        contents: b"client\n".to_vec(),
    }
}

#[async_trait]
impl Provisioner for StaticProvisioner {
    async fn issue(&self, key: &Key, _config: &Config) -> Result<CredentialBundle, CollaboratorError> {
        Ok(bundle_for(key))
    }

    async fn revoke(&self, _key: &Key) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn reissue(
        &self,
        key: &Key,
        _config: &Config,
    ) -> Result<CredentialBundle, CollaboratorError> {
        Ok(bundle_for(key))
    }

    async fn bundle(&self, key: &Key, _config: &Config) -> Result<CredentialBundle, CollaboratorError> {
        Ok(bundle_for(key))
    }
}

/// Bot deliveries always fail; mail deliveries succeed
struct HalfBrokenNotifier;

#[async_trait]
impl Notifier for HalfBrokenNotifier {
    async fn send_via_bot(
        &self,
        _key: &Key,
        _bundle: &CredentialBundle,
        _settings: &Settings,
    ) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::new("Bad Request: chat not found"))
    }

    async fn send_via_mail(
        &self,
        _recipient: &str,
        _bundle: &CredentialBundle,
        _settings: &Settings,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }

    async fn send_notice(
        &self,
        _recipient: &str,
        _subject: &str,
        _body: &str,
        _settings: &Settings,
    ) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

struct ScriptedMaintenance;

#[async_trait]
impl Maintenance for ScriptedMaintenance {
    async fn export_snapshot(&self) -> Result<String, CollaboratorError> {
        Ok("backup.tar.gz".to_string())
    }

    async fn import_snapshot(&self, location: &str) -> Result<String, CollaboratorError> {
        Ok(format!("restored {}", location))
    }

    async fn uninstall(&self) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::new("install.py: permission denied"))
    }
}

struct TestApp {
    router: Router,
    service: Arc<RecordingService>,
}

/// Helper to create a router over an in-memory database with migrations applied
async fn create_test_app() -> TestApp {
    let db = vpnkeys_db::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    vpnkeys_db::migrate(&db)
        .await
        .expect("Failed to run migrations");

    let service = Arc::new(RecordingService::default());
    let engine = VpnKeys::new(
        db,
        Collaborators {
            service: service.clone(),
            provisioner: Arc::new(StaticProvisioner),
            notifier: Arc::new(HalfBrokenNotifier),
            maintenance: Arc::new(ScriptedMaintenance),
        },
        EngineOptions::default(),
    );
    let config = ApiServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: false,
    };

    TestApp {
        router: ApiServer::new(config, engine).build_router(),
        service,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn call_json<T: DeserializeOwned>(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    expected: StatusCode,
) -> T {
    let (status, bytes) = call(app, method, uri, body).await;
    assert_eq!(
        status,
        expected,
        "{} {} returned {}",
        method,
        uri,
        String::from_utf8_lossy(&bytes)
    );
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_config(app: &Router, port: i32) -> ConfigOut {
    call_json(
        app,
        "POST",
        "/configs",
        Some(json!({
            "port": port,
            "protocol": "udp",
            "address": "203.0.113.10",
            "subnet": "10.8.0.0/24"
        })),
        StatusCode::CREATED,
    )
    .await
}

async fn create_keys(app: &Router, name: &str, amount: i32, config_id: i32) -> Vec<KeyOut> {
    call_json(
        app,
        "POST",
        "/keys",
        Some(json!({
            "name": name,
            "days": 30,
            "amount": amount,
            "config_id": config_id,
            "email": "user@example.com"
        })),
        StatusCode::CREATED,
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app().await;

    let health: HealthResponse =
        call_json(&app.router, "GET", "/api/health", None, StatusCode::OK).await;

    assert_eq!(health.status, "healthy");
}

#[tokio::test]
async fn test_create_config_defaults_telnet_port() {
    let app = create_test_app().await;

    let config = create_config(&app.router, 1194).await;

    assert_eq!(config.telnet_port, 9999);
    assert_eq!(config.protocol, "udp");
    assert!(config.status);

    let configs: Vec<ConfigOut> =
        call_json(&app.router, "GET", "/configs", None, StatusCode::OK).await;
    assert_eq!(configs.len(), 1);
}

#[tokio::test]
async fn test_create_keys_returns_every_sibling() {
    let app = create_test_app().await;
    let config = create_config(&app.router, 1194).await;

    let keys = create_keys(&app.router, "office", 3, config.id).await;

    let names: Vec<_> = keys.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(names, ["office_1", "office_2", "office_3"]);
    let indexes: Vec<_> = keys.iter().map(|k| k.index).collect();
    assert_eq!(indexes, [1, 2, 3]);
    assert!(keys.iter().all(|k| k.port == Some(1194) && k.status));
}

#[tokio::test]
async fn test_unknown_key_is_404() {
    let app = create_test_app().await;

    let error: ErrorResponse =
        call_json(&app.router, "GET", "/keys/42", None, StatusCode::NOT_FOUND).await;

    assert_eq!(error.code.as_deref(), Some("NOT_FOUND"));
    assert!(error.error.contains("42"));
}

#[tokio::test]
async fn test_unknown_criterion_is_422() {
    let app = create_test_app().await;

    let error: ErrorResponse = call_json(
        &app.router,
        "GET",
        "/keys?by=colour&value=blue",
        None,
        StatusCode::UNPROCESSABLE_ENTITY,
    )
    .await;

    assert_eq!(error.code.as_deref(), Some("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_list_keys_by_name() {
    let app = create_test_app().await;
    let config = create_config(&app.router, 1194).await;
    create_keys(&app.router, "alice", 1, config.id).await;
    create_keys(&app.router, "bob", 1, config.id).await;

    let keys: Vec<KeyOut> = call_json(
        &app.router,
        "GET",
        "/keys?by=name&value=bob",
        None,
        StatusCode::OK,
    )
    .await;

    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].name, "bob");
    assert_eq!(keys[0].index, 1);
}

#[tokio::test]
async fn test_block_then_bulk_unblock_with_unknown_id() {
    let app = create_test_app().await;
    let config = create_config(&app.router, 1194).await;
    let keys = create_keys(&app.router, "team", 2, config.id).await;

    let blocked: ActionResult = call_json(
        &app.router,
        "POST",
        &format!("/keys/{}/block", keys[0].id),
        None,
        StatusCode::OK,
    )
    .await;
    assert_eq!(blocked.result, "blocked");

    let summary: BulkResponse = call_json(
        &app.router,
        "POST",
        "/keys/bulk/unblock",
        Some(json!({ "ids": [keys[0].id, 999, keys[1].id] })),
        StatusCode::OK,
    )
    .await;

    assert_eq!(summary.result, "unblocked_bulk");
    assert_eq!(summary.requested, 3);
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.skipped, vec![999]);
    assert!(summary.failed.is_empty());

    let key: KeyOut = call_json(
        &app.router,
        "GET",
        &format!("/keys/{}", keys[0].id),
        None,
        StatusCode::OK,
    )
    .await;
    assert!(key.status);
}

#[tokio::test]
async fn test_bulk_send_tg_records_failures() {
    let app = create_test_app().await;
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/settings/bot")
                .method("PUT")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "bot_token": "123:abc", "bot_chat_id": "42" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let config = create_config(&app.router, 1194).await;
    let keys = create_keys(&app.router, "tg", 1, config.id).await;

    let summary: BulkResponse = call_json(
        &app.router,
        "POST",
        "/keys/bulk/send_tg",
        Some(json!({ "ids": [keys[0].id] })),
        StatusCode::OK,
    )
    .await;

    assert_eq!(summary.result, "sent_bulk");
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].code, "NOTIFICATION_ERROR");
}

#[tokio::test]
async fn test_single_send_tg_failure_is_500() {
    let app = create_test_app().await;
    let config = create_config(&app.router, 1194).await;
    let keys = create_keys(&app.router, "tg", 1, config.id).await;

    let (status, _) = call(
        &app.router,
        "POST",
        &format!("/keys/{}/send_tg", keys[0].id),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_unknown_bulk_operation_is_422() {
    let app = create_test_app().await;

    let (status, _) = call(
        &app.router,
        "POST",
        "/keys/bulk/explode",
        Some(json!({ "ids": [1] })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_delete_config_with_keys_is_conflict() {
    let app = create_test_app().await;
    let config = create_config(&app.router, 1194).await;
    let keys = create_keys(&app.router, "held", 1, config.id).await;

    let (status, _) = call(&app.router, "DELETE", &format!("/configs/{}", config.id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let deleted: ActionResult = call_json(
        &app.router,
        "DELETE",
        &format!("/keys/{}", keys[0].id),
        None,
        StatusCode::OK,
    )
    .await;
    assert_eq!(deleted.result, "deleted");

    let (status, _) = call(&app.router, "DELETE", &format!("/configs/{}", config.id), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_renew_takes_bare_day_count() {
    let app = create_test_app().await;
    let config = create_config(&app.router, 1194).await;
    let keys = create_keys(&app.router, "renew", 1, config.id).await;

    let renewed: ActionResult = call_json(
        &app.router,
        "POST",
        &format!("/keys/{}/renew", keys[0].id),
        Some(json!(10)),
        StatusCode::OK,
    )
    .await;
    assert_eq!(renewed.result, "renewed");

    let key: KeyOut = call_json(
        &app.router,
        "GET",
        &format!("/keys/{}", keys[0].id),
        None,
        StatusCode::OK,
    )
    .await;
    assert_eq!(key.days, 30);
    assert_eq!(key.expiry - keys[0].expiry, chrono::Duration::days(10));
}

#[tokio::test]
async fn test_session_flow_feeds_statistics() {
    let app = create_test_app().await;
    let config = create_config(&app.router, 1194).await;
    let keys = create_keys(&app.router, "roamer", 1, config.id).await;
    let key_id = keys[0].id;

    let session: SessionOut = call_json(
        &app.router,
        "POST",
        "/sessions/connect",
        Some(json!({
            "key_id": key_id,
            "ip": "198.51.100.7",
            "at": "2026-01-01T10:00:00Z"
        })),
        StatusCode::CREATED,
    )
    .await;

    let _: SessionOut = call_json(
        &app.router,
        "POST",
        &format!("/sessions/{}/traffic", session.id),
        Some(json!({ "total_bytes": 1024, "at": "2026-01-01T10:30:00Z" })),
        StatusCode::OK,
    )
    .await;

    let closed: SessionOut = call_json(
        &app.router,
        "POST",
        &format!("/sessions/{}/disconnect", session.id),
        Some(json!({ "total_bytes": 1_048_576, "at": "2026-01-01T11:00:00Z" })),
        StatusCode::OK,
    )
    .await;
    assert_eq!(closed.total_connected_time, 3600);

    let sessions: Vec<SessionOut> = call_json(
        &app.router,
        "GET",
        &format!("/sessions/key/{}", key_id),
        None,
        StatusCode::OK,
    )
    .await;
    assert_eq!(sessions.len(), 1);

    let stats: StatisticsResponse =
        call_json(&app.router, "GET", "/statistics", None, StatusCode::OK).await;
    assert_eq!(stats.total_bytes, 1_048_576);
    assert_eq!(stats.total_traffic, "1.0 MB");
    assert_eq!(stats.configs[0].total_bytes, 1_048_576);
    assert_eq!(stats.keys.connected, 0);

    let key_stats: KeyStatisticsResponse = call_json(
        &app.router,
        "GET",
        &format!("/statistics/keys/{}", key_id),
        None,
        StatusCode::OK,
    )
    .await;
    assert_eq!(key_stats.sessions, 1);
    assert_eq!(key_stats.total_connected_time, 3600);
}

#[tokio::test]
async fn test_disconnecting_twice_is_422() {
    let app = create_test_app().await;
    let config = create_config(&app.router, 1194).await;
    let keys = create_keys(&app.router, "twice", 1, config.id).await;

    let session: SessionOut = call_json(
        &app.router,
        "POST",
        "/sessions/connect",
        Some(json!({ "key_id": keys[0].id, "ip": "198.51.100.7" })),
        StatusCode::CREATED,
    )
    .await;
    let uri = format!("/sessions/{}/disconnect", session.id);

    let (first, _) = call(&app.router, "POST", &uri, Some(json!({ "total_bytes": 10 }))).await;
    let (second, _) = call(&app.router, "POST", &uri, Some(json!({ "total_bytes": 10 }))).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_settings_updates_are_partial() {
    let app = create_test_app().await;

    let _: SettingsResponse = call_json(
        &app.router,
        "PUT",
        "/settings/mail",
        Some(json!({ "use_mail": true, "mail_host": "smtp.example.com", "mail_port": 465 })),
        StatusCode::OK,
    )
    .await;
    let settings: SettingsResponse = call_json(
        &app.router,
        "PUT",
        "/settings/mail_notify",
        Some(json!({ "mail_block_key": true })),
        StatusCode::OK,
    )
    .await;

    assert!(settings.use_mail);
    assert_eq!(settings.mail_host.as_deref(), Some("smtp.example.com"));
    assert_eq!(settings.mail_port, Some(465));
    assert!(settings.mail_notify.mail_block_key);
    assert!(!settings.mail_notify.mail_create_key);
}

#[tokio::test]
async fn test_config_and_bot_unit_control() {
    let app = create_test_app().await;
    let config = create_config(&app.router, 1194).await;

    let disabled: ActionResult = call_json(
        &app.router,
        "POST",
        &format!("/configs/{}/disable", config.id),
        None,
        StatusCode::OK,
    )
    .await;
    assert_eq!(disabled.result, "disabled");

    let restarted: ActionResult = call_json(
        &app.router,
        "POST",
        "/settings/bot/restart",
        None,
        StatusCode::OK,
    )
    .await;
    assert_eq!(restarted.output.as_deref(), Some("restarted openvpn-bot"));

    let calls = app.service.calls.lock().unwrap().clone();
    assert!(calls.contains(&"stop openvpn-server@1194".to_string()));
    assert!(calls.contains(&"restart openvpn-bot".to_string()));
}

#[tokio::test]
async fn test_system_operations() {
    let app = create_test_app().await;

    let exported: ActionResult =
        call_json(&app.router, "POST", "/system/export_db", None, StatusCode::OK).await;
    assert_eq!(exported.result, "exported");
    assert_eq!(exported.output.as_deref(), Some("backup.tar.gz"));

    let imported: ActionResult = call_json(
        &app.router,
        "POST",
        "/system/import_db",
        Some(json!({ "link": "https://files.example.com/b.tar.gz" })),
        StatusCode::OK,
    )
    .await;
    assert_eq!(imported.result, "imported");

    let (status, _) = call(
        &app.router,
        "POST",
        "/system/import_db",
        Some(json!({ "link": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let error: ErrorResponse = call_json(
        &app.router,
        "POST",
        "/system/delete_openvpn",
        None,
        StatusCode::INTERNAL_SERVER_ERROR,
    )
    .await;
    assert!(error.error.contains("permission denied"));
}

#[tokio::test]
async fn test_openapi_spec_is_served() {
    let app = create_test_app().await;

    let doc: Value =
        call_json(&app.router, "GET", "/api/openapi.json", None, StatusCode::OK).await;

    assert!(doc["paths"]["/keys"].is_object());
}
