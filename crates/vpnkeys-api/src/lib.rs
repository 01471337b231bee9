//! REST surface over the key/session engine
pub mod handlers;
pub mod models;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use vpnkeys_core::VpnKeys;

/// Application state shared across handlers
pub struct AppState {
    pub engine: VpnKeys,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "VPN Keys API",
        version = "0.1.0",
        description = "REST API for managing VPN configs, access keys, sessions and statistics",
        contact(
            name = "VPN Keys Team",
            email = "team@vpnkeys.dev"
        )
    ),
    paths(
        handlers::health_check,
        handlers::list_keys,
        handlers::get_key,
        handlers::create_key,
        handlers::edit_key,
        handlers::delete_key,
        handlers::block_key,
        handlers::unblock_key,
        handlers::recreate_key,
        handlers::renew_key,
        handlers::transfer_key,
        handlers::key_sessions,
        handlers::send_key_tg,
        handlers::send_key_mail,
        handlers::fix_key,
        handlers::bulk_keys,
        handlers::list_configs,
        handlers::get_config,
        handlers::create_config,
        handlers::delete_config,
        handlers::enable_config,
        handlers::disable_config,
        handlers::restart_config,
        handlers::config_keys,
        handlers::sessions_by_key,
        handlers::connect_session,
        handlers::session_traffic,
        handlers::disconnect_session,
        handlers::statistics,
        handlers::key_statistics,
        handlers::get_settings,
        handlers::update_bot_settings,
        handlers::update_mail_settings,
        handlers::update_mail_notify,
        handlers::enable_bot,
        handlers::disable_bot,
        handlers::restart_bot,
        handlers::export_db,
        handlers::import_db,
        handlers::delete_openvpn,
        handlers::clear_statistics,
    ),
    components(
        schemas(
            models::HealthResponse,
            models::ErrorResponse,
            models::ActionResult,
            models::KeyOut,
            models::CreateKeyRequest,
            models::EditKeyRequest,
            models::TransferKeyRequest,
            models::BulkRequest,
            models::BulkFailureOut,
            models::BulkResponse,
            models::ConfigOut,
            models::CreateConfigRequest,
            models::SessionOut,
            models::ConnectRequest,
            models::TrafficRequest,
            models::DisconnectRequest,
            models::KeyCountsOut,
            models::ConfigStatisticsOut,
            models::StatisticsResponse,
            models::KeyStatisticsResponse,
            models::MailNotifyOut,
            models::SettingsResponse,
            models::BotSettingsRequest,
            models::MailSettingsRequest,
            models::MailNotifyRequest,
            models::ImportDbRequest,
        )
    ),
    tags(
        (name = "keys", description = "Access key lifecycle"),
        (name = "configs", description = "VPN server configs"),
        (name = "sessions", description = "Connection sessions"),
        (name = "statistics", description = "Usage statistics"),
        (name = "settings", description = "Bot and mail settings"),
        (name = "system", description = "Installation maintenance"),
    )
)]
struct ApiDoc;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Allow browser requests from local development origins
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, engine: VpnKeys) -> Self {
        Self {
            config,
            state: Arc::new(AppState { engine }),
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_doc = ApiDoc::openapi();

        let api_router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .route("/keys", get(handlers::list_keys).post(handlers::create_key))
            .route(
                "/keys/{id}",
                get(handlers::get_key)
                    .put(handlers::edit_key)
                    .delete(handlers::delete_key),
            )
            .route("/keys/{id}/block", post(handlers::block_key))
            .route("/keys/{id}/unblock", post(handlers::unblock_key))
            .route("/keys/{id}/recreate", post(handlers::recreate_key))
            .route("/keys/{id}/renew", post(handlers::renew_key))
            .route("/keys/{id}/transfer", post(handlers::transfer_key))
            .route("/keys/{id}/sessions", get(handlers::key_sessions))
            .route("/keys/{id}/send_tg", post(handlers::send_key_tg))
            .route("/keys/{id}/send_mail", post(handlers::send_key_mail))
            .route("/keys/{id}/fix", post(handlers::fix_key))
            .route("/keys/bulk/{operation}", post(handlers::bulk_keys))
            .route(
                "/configs",
                get(handlers::list_configs).post(handlers::create_config),
            )
            .route(
                "/configs/{id}",
                get(handlers::get_config).delete(handlers::delete_config),
            )
            .route("/configs/{id}/enable", post(handlers::enable_config))
            .route("/configs/{id}/disable", post(handlers::disable_config))
            .route("/configs/{id}/restart", post(handlers::restart_config))
            .route("/configs/{id}/keys", get(handlers::config_keys))
            .route("/sessions/key/{id}", get(handlers::sessions_by_key))
            .route("/sessions/connect", post(handlers::connect_session))
            .route("/sessions/{id}/traffic", post(handlers::session_traffic))
            .route(
                "/sessions/{id}/disconnect",
                post(handlers::disconnect_session),
            )
            .route("/statistics", get(handlers::statistics))
            .route("/statistics/keys/{id}", get(handlers::key_statistics))
            .route("/settings", get(handlers::get_settings))
            .route("/settings/bot", put(handlers::update_bot_settings))
            .route("/settings/mail", put(handlers::update_mail_settings))
            .route("/settings/mail_notify", put(handlers::update_mail_notify))
            .route("/settings/bot/enable", post(handlers::enable_bot))
            .route("/settings/bot/disable", post(handlers::disable_bot))
            .route("/settings/bot/restart", post(handlers::restart_bot))
            .route("/system/export_db", post(handlers::export_db))
            .route("/system/import_db", post(handlers::import_db))
            .route("/system/delete_openvpn", post(handlers::delete_openvpn))
            .route("/system/clear_statistics", post(handlers::clear_statistics))
            .with_state(self.state.clone());

        // SwaggerUi also serves the OpenAPI document at /api/openapi.json
        let router = Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", api_doc))
            .merge(api_router);

        let mut router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            use tower_http::cors::AllowOrigin;

            let cors = CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
                    let origin = origin.to_str().unwrap_or("");
                    origin.starts_with("http://localhost:")
                        || origin.starts_with("http://127.0.0.1:")
                }));
            router = router.layer(cors);
        }

        router
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );
        info!("Swagger UI: http://{}/swagger-ui", self.config.bind_addr);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}
