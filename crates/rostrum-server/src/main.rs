mod config;

use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use rostrum_api::{AppState, AppStateInner, router};
use rostrum_crypto::{PasswordHasher, TokenIssuer};
use rostrum_db::Database;
use rostrum_identity::IdentityResolver;
use rostrum_identity::providers::{AppleVerifier, GoogleVerifier, http_client};

use crate::config::Config;

const DEFAULT_LOG_FILTER: &str = "rostrum=debug,rostrum_api=debug,rostrum_identity=debug,\
     rostrum_db=debug,rostrum_crypto=debug,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}.");
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);

    let http = http_client(config.provider_timeout)?;
    if config.google_client_id.is_none() {
        warn!("ROSTRUM_GOOGLE_CLIENT_ID is unset; Google token audiences are not checked");
    }
    if config.apple_client_ids.is_empty() {
        warn!("ROSTRUM_APPLE_CLIENT_IDS is unset; Apple sign-in is disabled");
    }
    let google = GoogleVerifier::new(http.clone(), config.google_client_id.clone());
    let apple = AppleVerifier::new(http, config.apple_client_ids.clone());

    let identity = IdentityResolver::new(
        db.clone(),
        PasswordHasher::new()?,
        TokenIssuer::new(&config.jwt_secret)?,
        Arc::new(google),
        Arc::new(apple),
    )
    .with_provider_deadline(config.provider_timeout * 2);

    let state: AppState = Arc::new(AppStateInner { db, identity });

    let app = router(state)
        .layer(cors_layer(&config)?)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Rostrum server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let Some(origin) = &config.cors_origin else {
        return Ok(CorsLayer::permissive());
    };
    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
