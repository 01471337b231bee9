use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use vpnkeys_core::{
    BotAction, BotUpdate, BulkOperation, Error, IssueRequest, KeyEdit, MailUpdate, NewConfig,
};

use crate::models::*;
use crate::AppState;

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Map an engine error onto its HTTP status and body
pub fn error_response(err: Error) -> ApiError {
    let status = match &err {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::ServiceControl { .. } | Error::Provisioning(_) | Error::Notification(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Error::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", err);
    } else {
        debug!("Request rejected: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: Some(err.code().to_string()),
        }),
    )
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Keys
// ============================================================================

/// List keys filtered or sorted by a criterion
#[utoipa::path(
    get,
    path = "/keys",
    params(ListKeysQuery),
    responses(
        (status = 200, description = "Matching keys", body = Vec<KeyOut>),
        (status = 422, description = "Unknown criterion or malformed value", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListKeysQuery>,
) -> ApiResult<Vec<KeyOut>> {
    let by = query.by.as_deref().unwrap_or("all");
    let views = state
        .engine
        .query
        .list(by, query.value.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(views.into_iter().map(KeyOut::from).collect()))
}

/// Get one key
#[utoipa::path(
    get,
    path = "/keys/{id}",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Key details", body = KeyOut),
        (status = 404, description = "Key not found", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn get_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<KeyOut> {
    let view = state.engine.query.view(id).await.map_err(error_response)?;
    Ok(Json(view.into()))
}

/// Issue one or more keys
#[utoipa::path(
    post,
    path = "/keys",
    request_body = CreateKeyRequest,
    responses(
        (status = 201, description = "Keys issued", body = Vec<KeyOut>),
        (status = 422, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Provisioning failed, nothing was issued", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<Vec<KeyOut>>), ApiError> {
    let issued = state
        .engine
        .keys
        .issue(IssueRequest {
            name: req.name,
            days: req.days,
            amount: req.amount,
            config_id: req.config_id,
            email: req.email,
        })
        .await
        .map_err(error_response)?;

    let mut out = Vec::with_capacity(issued.len());
    for (position, key) in issued.iter().enumerate() {
        let mut view = state.engine.query.view(key.id).await.map_err(error_response)?;
        view.index = position + 1;
        out.push(KeyOut::from(view));
    }
    Ok((StatusCode::CREATED, Json(out)))
}

/// Change validity days or email of a key
#[utoipa::path(
    put,
    path = "/keys/{id}",
    params(("id" = i32, Path, description = "Key ID")),
    request_body = EditKeyRequest,
    responses(
        (status = 200, description = "Updated key", body = KeyOut),
        (status = 404, description = "Key not found", body = ErrorResponse),
        (status = 422, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn edit_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<EditKeyRequest>,
) -> ApiResult<KeyOut> {
    state
        .engine
        .keys
        .edit(
            id,
            KeyEdit {
                days: req.days,
                email: req.email,
            },
        )
        .await
        .map_err(error_response)?;
    let view = state.engine.query.view(id).await.map_err(error_response)?;
    Ok(Json(view.into()))
}

/// Revoke and delete a key with its sessions
#[utoipa::path(
    delete,
    path = "/keys/{id}",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Key deleted", body = ActionResult),
        (status = 404, description = "Key not found", body = ErrorResponse),
        (status = 500, description = "Revocation failed, key kept", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state.engine.keys.delete(id).await.map_err(error_response)?;
    Ok(Json(ActionResult::new("deleted")))
}

/// Block a key
#[utoipa::path(
    post,
    path = "/keys/{id}/block",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Key blocked", body = ActionResult),
        (status = 404, description = "Key not found", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn block_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state.engine.keys.block(id).await.map_err(error_response)?;
    Ok(Json(ActionResult::new("blocked")))
}

/// Unblock a key
#[utoipa::path(
    post,
    path = "/keys/{id}/unblock",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Key unblocked", body = ActionResult),
        (status = 404, description = "Key not found", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn unblock_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state.engine.keys.unblock(id).await.map_err(error_response)?;
    Ok(Json(ActionResult::new("unblocked")))
}

/// Reissue the credentials of a key
#[utoipa::path(
    post,
    path = "/keys/{id}/recreate",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Credentials reissued", body = ActionResult),
        (status = 404, description = "Key not found", body = ErrorResponse),
        (status = 500, description = "Provisioning failed", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn recreate_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state.engine.keys.recreate(id).await.map_err(error_response)?;
    Ok(Json(ActionResult::new("recreated")))
}

/// Extend a key by a number of days; the body is the bare day count
#[utoipa::path(
    post,
    path = "/keys/{id}/renew",
    params(("id" = i32, Path, description = "Key ID")),
    request_body = i32,
    responses(
        (status = 200, description = "Key renewed", body = ActionResult),
        (status = 404, description = "Key not found", body = ErrorResponse),
        (status = 422, description = "Days must be positive", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn renew_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(days): Json<i32>,
) -> ApiResult<ActionResult> {
    state
        .engine
        .keys
        .renew(id, days)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResult::new("renewed")))
}

/// Move a key to another config
#[utoipa::path(
    post,
    path = "/keys/{id}/transfer",
    params(("id" = i32, Path, description = "Key ID")),
    request_body = TransferKeyRequest,
    responses(
        (status = 200, description = "Key transferred", body = ActionResult),
        (status = 404, description = "Key not found", body = ErrorResponse),
        (status = 422, description = "Unknown destination config", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn transfer_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<TransferKeyRequest>,
) -> ApiResult<ActionResult> {
    state
        .engine
        .keys
        .transfer(id, req.config_id)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResult::new("transferred")))
}

/// Sessions of a key, oldest first
#[utoipa::path(
    get,
    path = "/keys/{id}/sessions",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Sessions of the key", body = Vec<SessionOut>),
        (status = 404, description = "Key not found", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn key_sessions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Vec<SessionOut>> {
    list_sessions(&state, id).await
}

/// Send the key's credential bundle to the configured Telegram chat
#[utoipa::path(
    post,
    path = "/keys/{id}/send_tg",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Bundle sent", body = ActionResult),
        (status = 404, description = "Key not found", body = ErrorResponse),
        (status = 500, description = "Delivery failed", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn send_key_tg(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state
        .engine
        .notify
        .send_via_bot(id)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResult::new("sent")))
}

/// Mail the key's credential bundle to the key's address
#[utoipa::path(
    post,
    path = "/keys/{id}/send_mail",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Bundle sent", body = ActionResult),
        (status = 404, description = "Key not found", body = ErrorResponse),
        (status = 422, description = "Key has no email", body = ErrorResponse),
        (status = 500, description = "Delivery failed", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn send_key_mail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state
        .engine
        .notify
        .send_via_mail(id, None)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResult::new("sent")))
}

/// Clear a stale connected flag
#[utoipa::path(
    post,
    path = "/keys/{id}/fix",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Key fixed", body = ActionResult),
        (status = 404, description = "Key not found", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn fix_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state.engine.keys.fix(id).await.map_err(error_response)?;
    Ok(Json(ActionResult::new("fixed")))
}

/// Apply one operation to many keys
///
/// Unknown ids are skipped and reported in the summary. Only an unavailable
/// store fails the request.
#[utoipa::path(
    post,
    path = "/keys/bulk/{operation}",
    params(
        ("operation" = String, Path, description = "block, unblock, delete, send_tg, send_mail, fix or clear_traffic")
    ),
    request_body = BulkRequest,
    responses(
        (status = 200, description = "Batch summary", body = BulkResponse),
        (status = 422, description = "Unknown operation", body = ErrorResponse),
        (status = 503, description = "Store unavailable, batch aborted", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn bulk_keys(
    State(state): State<Arc<AppState>>,
    Path(operation): Path<String>,
    Json(req): Json<BulkRequest>,
) -> ApiResult<BulkResponse> {
    let operation: BulkOperation = operation.parse().map_err(error_response)?;
    let bulk = &state.engine.bulk;
    let summary = match operation {
        BulkOperation::SendMail => bulk.send_mail(&req.ids, req.email.as_deref()).await,
        other => bulk.run(other, &req.ids).await,
    }
    .map_err(error_response)?;
    Ok(Json(summary.into()))
}

// ============================================================================
// Configs
// ============================================================================

/// List all configs
#[utoipa::path(
    get,
    path = "/configs",
    responses(
        (status = 200, description = "All configs", body = Vec<ConfigOut>)
    ),
    tag = "configs"
)]
pub async fn list_configs(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ConfigOut>> {
    let configs = state.engine.configs.list().await.map_err(error_response)?;
    Ok(Json(configs.into_iter().map(ConfigOut::from).collect()))
}

/// Get one config
#[utoipa::path(
    get,
    path = "/configs/{id}",
    params(("id" = i32, Path, description = "Config ID")),
    responses(
        (status = 200, description = "Config details", body = ConfigOut),
        (status = 404, description = "Config not found", body = ErrorResponse)
    ),
    tag = "configs"
)]
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ConfigOut> {
    let config = state.engine.configs.get(id).await.map_err(error_response)?;
    Ok(Json(config.into()))
}

/// Create a config
#[utoipa::path(
    post,
    path = "/configs",
    request_body = CreateConfigRequest,
    responses(
        (status = 201, description = "Config created", body = ConfigOut),
        (status = 409, description = "Port already in use", body = ErrorResponse),
        (status = 422, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "configs"
)]
pub async fn create_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConfigRequest>,
) -> Result<(StatusCode, Json<ConfigOut>), ApiError> {
    let config = state
        .engine
        .configs
        .create(NewConfig {
            port: req.port,
            protocol: req.protocol,
            telnet_port: req.telnet_port,
            address: req.address,
            subnet: req.subnet,
        })
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(config.into())))
}

/// Delete a config without keys
#[utoipa::path(
    delete,
    path = "/configs/{id}",
    params(("id" = i32, Path, description = "Config ID")),
    responses(
        (status = 200, description = "Config deleted", body = ActionResult),
        (status = 404, description = "Config not found", body = ErrorResponse),
        (status = 409, description = "Keys still reference the config", body = ErrorResponse)
    ),
    tag = "configs"
)]
pub async fn delete_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state.engine.configs.delete(id).await.map_err(error_response)?;
    Ok(Json(ActionResult::new("deleted")))
}

/// Start the config's service unit
#[utoipa::path(
    post,
    path = "/configs/{id}/enable",
    params(("id" = i32, Path, description = "Config ID")),
    responses(
        (status = 200, description = "Config enabled", body = ActionResult),
        (status = 404, description = "Config not found", body = ErrorResponse),
        (status = 500, description = "Service control failed", body = ErrorResponse)
    ),
    tag = "configs"
)]
pub async fn enable_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state
        .engine
        .configs
        .set_enabled(id, true)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResult::new("enabled")))
}

/// Stop the config's service unit
#[utoipa::path(
    post,
    path = "/configs/{id}/disable",
    params(("id" = i32, Path, description = "Config ID")),
    responses(
        (status = 200, description = "Config disabled", body = ActionResult),
        (status = 404, description = "Config not found", body = ErrorResponse),
        (status = 500, description = "Service control failed", body = ErrorResponse)
    ),
    tag = "configs"
)]
pub async fn disable_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state
        .engine
        .configs
        .set_enabled(id, false)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResult::new("disabled")))
}

/// Restart the config's service unit
#[utoipa::path(
    post,
    path = "/configs/{id}/restart",
    params(("id" = i32, Path, description = "Config ID")),
    responses(
        (status = 200, description = "Config restarted", body = ActionResult),
        (status = 404, description = "Config not found", body = ErrorResponse),
        (status = 500, description = "Service control failed", body = ErrorResponse)
    ),
    tag = "configs"
)]
pub async fn restart_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<ActionResult> {
    state
        .engine
        .configs
        .restart(id)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResult::new("restarted")))
}

/// Keys assigned to a config
#[utoipa::path(
    get,
    path = "/configs/{id}/keys",
    params(("id" = i32, Path, description = "Config ID")),
    responses(
        (status = 200, description = "Keys of the config", body = Vec<KeyOut>),
        (status = 404, description = "Config not found", body = ErrorResponse)
    ),
    tag = "configs"
)]
pub async fn config_keys(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Vec<KeyOut>> {
    let views = state
        .engine
        .query
        .list_by_config(id)
        .await
        .map_err(error_response)?;
    Ok(Json(views.into_iter().map(KeyOut::from).collect()))
}

// ============================================================================
// Sessions
// ============================================================================

async fn list_sessions(state: &AppState, key_id: i32) -> ApiResult<Vec<SessionOut>> {
    let sessions = state
        .engine
        .sessions
        .list_by_key(key_id)
        .await
        .map_err(error_response)?;
    Ok(Json(sessions.into_iter().map(SessionOut::from).collect()))
}

/// Sessions of a key, oldest first
#[utoipa::path(
    get,
    path = "/sessions/key/{id}",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Sessions of the key", body = Vec<SessionOut>),
        (status = 404, description = "Key not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn sessions_by_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Vec<SessionOut>> {
    list_sessions(&state, id).await
}

/// Open a session for a key
#[utoipa::path(
    post,
    path = "/sessions/connect",
    request_body = ConnectRequest,
    responses(
        (status = 201, description = "Session opened", body = SessionOut),
        (status = 404, description = "Key not found", body = ErrorResponse),
        (status = 422, description = "Key blocked or request invalid", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn connect_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectRequest>,
) -> Result<(StatusCode, Json<SessionOut>), ApiError> {
    let at = req.at.unwrap_or_else(Utc::now);
    let session = state
        .engine
        .sessions
        .record_connect(req.key_id, &req.ip, at)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

/// Update the byte counter of an open session
#[utoipa::path(
    post,
    path = "/sessions/{id}/traffic",
    params(("id" = i32, Path, description = "Session ID")),
    request_body = TrafficRequest,
    responses(
        (status = 200, description = "Session updated", body = SessionOut),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 422, description = "Session closed or counter went backwards", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn session_traffic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<TrafficRequest>,
) -> ApiResult<SessionOut> {
    let at = req.at.unwrap_or_else(Utc::now);
    let session = state
        .engine
        .sessions
        .record_traffic(id, req.total_bytes, at)
        .await
        .map_err(error_response)?;
    Ok(Json(session.into()))
}

/// Close a session
#[utoipa::path(
    post,
    path = "/sessions/{id}/disconnect",
    params(("id" = i32, Path, description = "Session ID")),
    request_body = DisconnectRequest,
    responses(
        (status = 200, description = "Session closed", body = SessionOut),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 422, description = "Session already closed", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn disconnect_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<DisconnectRequest>,
) -> ApiResult<SessionOut> {
    let at = req.at.unwrap_or_else(Utc::now);
    let session = state
        .engine
        .sessions
        .record_disconnect(id, at, req.total_bytes)
        .await
        .map_err(error_response)?;
    Ok(Json(session.into()))
}

// ============================================================================
// Statistics
// ============================================================================

/// Key and traffic totals, overall and per config
#[utoipa::path(
    get,
    path = "/statistics",
    responses(
        (status = 200, description = "Global statistics", body = StatisticsResponse)
    ),
    tag = "statistics"
)]
pub async fn statistics(State(state): State<Arc<AppState>>) -> ApiResult<StatisticsResponse> {
    let stats = state.engine.stats.global().await.map_err(error_response)?;
    Ok(Json(stats.into()))
}

/// Usage of one key
#[utoipa::path(
    get,
    path = "/statistics/keys/{id}",
    params(("id" = i32, Path, description = "Key ID")),
    responses(
        (status = 200, description = "Key statistics", body = KeyStatisticsResponse),
        (status = 404, description = "Key not found", body = ErrorResponse)
    ),
    tag = "statistics"
)]
pub async fn key_statistics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<KeyStatisticsResponse> {
    let stats = state.engine.stats.for_key(id).await.map_err(error_response)?;
    Ok(Json(stats.into()))
}

// ============================================================================
// Settings
// ============================================================================

/// Bot and mail settings
#[utoipa::path(
    get,
    path = "/settings",
    responses(
        (status = 200, description = "Current settings", body = SettingsResponse)
    ),
    tag = "settings"
)]
pub async fn get_settings(State(state): State<Arc<AppState>>) -> ApiResult<SettingsResponse> {
    let settings = state.engine.settings.get().await.map_err(error_response)?;
    Ok(Json(settings.into()))
}

/// Update bot credentials
#[utoipa::path(
    put,
    path = "/settings/bot",
    request_body = BotSettingsRequest,
    responses(
        (status = 200, description = "Updated settings", body = SettingsResponse)
    ),
    tag = "settings"
)]
pub async fn update_bot_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BotSettingsRequest>,
) -> ApiResult<SettingsResponse> {
    let settings = state
        .engine
        .settings
        .update_bot(BotUpdate {
            bot_token: req.bot_token,
            bot_chat_id: req.bot_chat_id,
        })
        .await
        .map_err(error_response)?;
    Ok(Json(settings.into()))
}

/// Update the mail transport
#[utoipa::path(
    put,
    path = "/settings/mail",
    request_body = MailSettingsRequest,
    responses(
        (status = 200, description = "Updated settings", body = SettingsResponse),
        (status = 422, description = "Invalid port", body = ErrorResponse)
    ),
    tag = "settings"
)]
pub async fn update_mail_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MailSettingsRequest>,
) -> ApiResult<SettingsResponse> {
    let settings = state
        .engine
        .settings
        .update_mail(MailUpdate {
            use_mail: req.use_mail,
            mail_host: req.mail_host,
            mail_port: req.mail_port,
            mail_login: req.mail_login,
            mail_password: req.mail_password,
            subject: req.subject,
            text: req.text,
        })
        .await
        .map_err(error_response)?;
    Ok(Json(settings.into()))
}

/// Update lifecycle mail toggles
#[utoipa::path(
    put,
    path = "/settings/mail_notify",
    request_body = MailNotifyRequest,
    responses(
        (status = 200, description = "Updated settings", body = SettingsResponse)
    ),
    tag = "settings"
)]
pub async fn update_mail_notify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MailNotifyRequest>,
) -> ApiResult<SettingsResponse> {
    let settings = state
        .engine
        .settings
        .update_mail_notify(req.into())
        .await
        .map_err(error_response)?;
    Ok(Json(settings.into()))
}

async fn control_bot(state: &AppState, action: BotAction, result: &str) -> ApiResult<ActionResult> {
    let output = state
        .engine
        .system
        .control_bot(action)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResult::new(result).with_output(output)))
}

/// Start the bot unit
#[utoipa::path(
    post,
    path = "/settings/bot/enable",
    responses(
        (status = 200, description = "Bot started", body = ActionResult),
        (status = 500, description = "Service control failed", body = ErrorResponse)
    ),
    tag = "settings"
)]
pub async fn enable_bot(State(state): State<Arc<AppState>>) -> ApiResult<ActionResult> {
    control_bot(&state, BotAction::Enable, "enabled").await
}

/// Stop the bot unit
#[utoipa::path(
    post,
    path = "/settings/bot/disable",
    responses(
        (status = 200, description = "Bot stopped", body = ActionResult),
        (status = 500, description = "Service control failed", body = ErrorResponse)
    ),
    tag = "settings"
)]
pub async fn disable_bot(State(state): State<Arc<AppState>>) -> ApiResult<ActionResult> {
    control_bot(&state, BotAction::Disable, "disabled").await
}

/// Restart the bot unit
#[utoipa::path(
    post,
    path = "/settings/bot/restart",
    responses(
        (status = 200, description = "Bot restarted", body = ActionResult),
        (status = 500, description = "Service control failed", body = ErrorResponse)
    ),
    tag = "settings"
)]
pub async fn restart_bot(State(state): State<Arc<AppState>>) -> ApiResult<ActionResult> {
    control_bot(&state, BotAction::Restart, "restarted").await
}

// ============================================================================
// System
// ============================================================================

/// Create a backup of the installation
#[utoipa::path(
    post,
    path = "/system/export_db",
    responses(
        (status = 200, description = "Backup created", body = ActionResult),
        (status = 500, description = "Backup failed", body = ErrorResponse)
    ),
    tag = "system"
)]
pub async fn export_db(State(state): State<Arc<AppState>>) -> ApiResult<ActionResult> {
    let output = state.engine.system.export_db().await.map_err(error_response)?;
    Ok(Json(ActionResult::new("exported").with_output(output)))
}

/// Restore a backup from a link
#[utoipa::path(
    post,
    path = "/system/import_db",
    request_body = ImportDbRequest,
    responses(
        (status = 200, description = "Backup restored", body = ActionResult),
        (status = 422, description = "Empty link", body = ErrorResponse),
        (status = 500, description = "Restore failed", body = ErrorResponse)
    ),
    tag = "system"
)]
pub async fn import_db(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportDbRequest>,
) -> ApiResult<ActionResult> {
    let output = state
        .engine
        .system
        .import_db(&req.link)
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResult::new("imported").with_output(output)))
}

/// Remove the VPN installation from the host
#[utoipa::path(
    post,
    path = "/system/delete_openvpn",
    responses(
        (status = 200, description = "Installation removed", body = ActionResult),
        (status = 500, description = "Uninstall failed", body = ErrorResponse)
    ),
    tag = "system"
)]
pub async fn delete_openvpn(State(state): State<Arc<AppState>>) -> ApiResult<ActionResult> {
    let output = state
        .engine
        .system
        .delete_installation()
        .await
        .map_err(error_response)?;
    Ok(Json(ActionResult::new("openvpn deleted").with_output(output)))
}

/// Drop every session and reset every key to disconnected
#[utoipa::path(
    post,
    path = "/system/clear_statistics",
    responses(
        (status = 200, description = "Statistics cleared", body = ActionResult)
    ),
    tag = "system"
)]
pub async fn clear_statistics(State(state): State<Arc<AppState>>) -> ApiResult<ActionResult> {
    let removed = state
        .engine
        .system
        .clear_statistics()
        .await
        .map_err(error_response)?;
    Ok(Json(
        ActionResult::new("cleared").with_output(format!("{} session(s) removed", removed)),
    ))
}
