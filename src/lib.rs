//! # Pagevoile
//!
//! Covert page retrieval disguised as an encyclopedia mirror.
//!
//! A secret trigger typed into the search field starts a reveal session:
//! each navigation fetches a decoy page whose markup is rewritten so only
//! words and links carrying one chosen letter at one chosen position stay
//! clickable. Once every letter of the hidden word has been walked through
//! page navigations, every link leads to the hidden final page.
//!
//! Reveal state lives in durable client storage, never in process memory,
//! because the session is torn down and recreated between single-page
//! navigations. See [`trigger`] for keystroke recognition, [`session`] for
//! the state machine, and [`polish`] for the markup transform.
use std::time::Duration;

use axum::http::{Method, header::CONTENT_TYPE};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod error;
pub mod fetch;
pub mod pages;
pub mod polish;
pub mod profiles;
pub mod routes;
pub mod session;
pub mod state;
pub mod trigger;

use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new();

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = routes::app(state.clone()).layer(cors);

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
