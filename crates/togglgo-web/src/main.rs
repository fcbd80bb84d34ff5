//! togglgo-web: Axum web server entry point.
//! Config load + credential backend selection + serves the webhook.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use togglgo_core::config::{Config, StoreConfig};
use togglgo_core::credentials::Credentials;
use togglgo_core::flow::{Conversation, FlowOptions};
use togglgo_core::identity::IdentityVerifier;
use togglgo_core::messages::Messages;
use togglgo_core::timer_api::{self, TogglClient};

use togglgo_web::server::{self, AppState};

fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let http = timer_api::build_client(config)?;

    let messages = match config.messages_path {
        Some(ref path) => Messages::load_with_overrides(path)?,
        None => Messages::builtin(),
    };
    info!("Loaded messages for: {}", messages.languages().join(", "));

    let store_kind = match config.store {
        StoreConfig::Memory => "memory",
        StoreConfig::File { .. } => "file",
        StoreConfig::Firestore { .. } => "firestore",
    };
    info!("Credential store: {}", store_kind);

    let conversation = Conversation::new(
        Arc::new(TogglClient::from_config(config, http.clone())),
        Credentials::from_config(&config.store, http),
        Arc::new(messages),
        FlowOptions::from_config(config),
    );

    if config.client_id.is_empty() {
        info!("No client_id configured; identity token audience is not checked");
    }

    Ok(AppState {
        conversation,
        verifier: IdentityVerifier::new(config.client_id.clone()),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config = Config::load_from_dir(&project_root)?;

    let state = Arc::new(build_state(&config)?);
    let app = server::router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Fulfillment webhook listening on http://{}/fulfillment", addr);

    // Graceful shutdown on Ctrl+C
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("Server stopped.");
    Ok(())
}
