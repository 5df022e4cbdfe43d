use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tandem::config::{LoggingSettings, Settings, StorageBackend};
use tandem::core::{Clock, SystemClock};
use tandem::models::Entitlement;
use tandem::routes::auth::TokenVerifier;
use tandem::routes::error::{handle_json_payload_error, handle_path_error, handle_query_payload_error};
use tandem::routes::{self, AppState};
use tandem::services::{BillingClient, MemoryStore, PostgresStore, StaticEntitlements, Store, SubscriptionService};

fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, e);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

fn billing_from(settings: &Settings) -> io::Result<Arc<dyn SubscriptionService>> {
    let billing = &settings.billing;
    match &billing.endpoint {
        Some(endpoint) => {
            let client = BillingClient::new(
                endpoint.clone(),
                billing.api_key.clone(),
                Duration::from_secs(billing.timeout_secs.unwrap_or(5)),
                Duration::from_secs(billing.cache_ttl_secs.unwrap_or(60)),
                billing.cache_size.unwrap_or(10_000),
            )
            .map_err(|e| startup_error("Failed to build billing client", e))?;
            info!("Billing client initialized for {}", endpoint);
            Ok(Arc::new(client))
        }
        None => {
            warn!(
                "No billing endpoint configured, every user gets {} super like(s)",
                billing.free_super_likes
            );
            Ok(Arc::new(StaticEntitlements::new(Entitlement {
                premium: false,
                super_likes_remaining: billing.free_super_likes,
            })))
        }
    }
}

async fn serve<S: Store>(
    store: Arc<S>,
    billing: Arc<dyn SubscriptionService>,
    clock: Arc<dyn Clock>,
    settings: Settings,
) -> io::Result<()> {
    let gate_policy = settings
        .messaging
        .policy()
        .map_err(|e| startup_error("Invalid messaging configuration", e))?;

    let state = web::Data::new(AppState::new(
        store,
        billing,
        clock,
        settings.discovery.policy(),
        gate_policy,
        settings.safety.policy(),
    ));
    let verifier = web::Data::new(TokenVerifier::new(
        &settings.auth.jwt_secret,
        settings.auth.issuer.as_deref(),
    ));

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(state.clone())
            .app_data(verifier.clone())
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes::<S>)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load();
    let logging = settings.as_ref().map(|s| s.logging.clone()).unwrap_or_default();
    init_tracing(&logging);

    info!("Starting Tandem matching service...");

    let settings = settings.map_err(|e| startup_error("Failed to load configuration", e))?;

    info!("Configuration loaded successfully");

    let billing = billing_from(&settings)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match settings.database.backend {
        StorageBackend::Memory => {
            warn!("Using the in-memory store, state is lost on restart");
            serve(Arc::new(MemoryStore::new()), billing, clock, settings).await
        }
        StorageBackend::Postgres => {
            let store = PostgresStore::from_settings(&settings.database)
                .await
                .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?;
            info!(
                "PostgreSQL store initialized (max: {} connections)",
                settings.database.max_connections.unwrap_or(10)
            );
            serve(Arc::new(store), billing, clock, settings).await
        }
    }
}
