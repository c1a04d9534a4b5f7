use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use gateway_tools::GatewayApi;
use log::*;
use settlement_engine::{events::EventHandlers, SettlementApi, SqliteDatabase};

use crate::{
    auth::JwtAuthority,
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    hooks::settlement_hooks,
    notifier::Notifier,
    reconcile_worker::start_reconcile_worker,
    routes::configure_routes,
};

const EVENT_BUFFER_SIZE: usize = 128;

pub type StorefrontApi = SettlementApi<SqliteDatabase, GatewayApi>;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Could not run migrations. {e}")))?;
    info!("🗃️ Database at {} is ready", config.database_url);
    let gateway =
        GatewayApi::new(config.gateway.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let notifier = Notifier::from_config(&config.notifier).map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, settlement_hooks(notifier, db.clone()));
    let producers = handlers.producers();
    handlers.start_handlers().await;
    info!("📬️ Event handlers started");

    let api = web::Data::new(SettlementApi::new(db, gateway, config.settlement_options(), producers));
    let _worker =
        start_reconcile_worker(api.clone().into_inner(), config.stale_verification_window, config.reconcile_interval);
    let srv = create_server_instance(config, api)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, api: web::Data<StorefrontApi>) -> Result<Server, ServerError> {
    let authority = web::Data::new(JwtAuthority::new(config.auth.jwt_secret.clone()));
    let options = web::Data::new(ServerOptions::from_config(&config));
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("storefront::access_log"))
            .app_data(api.clone())
            .app_data(authority.clone())
            .app_data(options.clone())
            .configure(configure_routes::<SqliteDatabase, GatewayApi>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("💻️ Listening on {}:{}", config.host, config.port);
    Ok(srv)
}
