mod config;
mod sweeper;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use sowama_api::state::AppStateInner;
use sowama_db::{Database, Store};
use sowama_engine::providers::http::{HttpChainProvider, HttpSocialProvider};
use sowama_engine::providers::{BlockchainProvider, SocialVerificationProvider, Unconfigured};
use sowama_engine::{Engine, SystemClock};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sowama=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let store: Arc<dyn Store> = Arc::new(Database::open(&PathBuf::from(&config.db_path))?);

    // Collaborators
    let social: Arc<dyn SocialVerificationProvider> = match &config.social_api_url {
        Some(url) => {
            info!("Social bridge at {}", url);
            Arc::new(HttpSocialProvider::new(url))
        }
        None => {
            warn!("SOWAMA_SOCIAL_API_URL not set, post verification will report unavailable");
            Arc::new(Unconfigured("social bridge"))
        }
    };
    let chain: Arc<dyn BlockchainProvider> = match &config.chain_api_url {
        Some(url) => {
            info!("Blockchain bridge at {}", url);
            Arc::new(HttpChainProvider::new(url))
        }
        None => {
            warn!("SOWAMA_CHAIN_API_URL not set, minting will report unavailable");
            Arc::new(Unconfigured("blockchain bridge"))
        }
    };

    let engine = Engine::new(store, social, chain, Arc::new(SystemClock), config.engine.clone())?;

    // Background mint confirmation and stale check expiry
    tokio::spawn(sweeper::run_claim_sweeper(
        engine.claims.clone(),
        config.mint_poll_secs,
    ));

    let state = AppStateInner::new(engine, config.jwt_secret.clone());

    let app = sowama_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Sowama server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
