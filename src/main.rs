//! # Push-to-Talk ASR Backend
//!
//! Actix-web server exposing a WebSocket endpoint for real-time push-to-talk
//! speech recognition, plus HTTP endpoints for health and connection stats.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **error**: error taxonomy for decode, inference, protocol, and admission
//! - **audio**: base64 PCM16 decoding into normalized f32 samples
//! - **session**: per-connection push-to-talk state machine and the
//!   process-wide connection registry
//! - **inference**: bounded dispatch queue in front of a single recognizer
//! - **websocket**: per-connection protocol router actor
//! - **health**: HTTP monitoring endpoints

mod audio;
mod config;
mod error;
mod health;
mod inference;
mod session;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use inference::{InferenceDispatcher, NullRecognizer};
use session::ConnectionRegistry;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown flag, set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting ptt-asr-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{} | max connections: {} | max audio size: {} bytes",
        config.server.host,
        config.server.port,
        config.websocket.max_connections,
        config.websocket.max_audio_size
    );

    let registry = Arc::new(ConnectionRegistry::new(config.websocket.max_connections));
    let dispatcher = InferenceDispatcher::start(
        Box::new(NullRecognizer),
        config.websocket.inference_queue_depth,
    );

    let app_state = AppState::new(config.clone(), registry.clone(), dispatcher);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .route("/", web::get().to(health::index))
            .route("/health", web::get().to(health::health_check))
            .route("/stats", web::get().to(health::connection_stats))
            .route("/ws/asr", web::get().to(websocket::asr_websocket))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            // Tell connected clients first so they see a clean close frame
            // instead of a dropped socket.
            let closed = registry.broadcast_close("server shutting down");
            if closed > 0 {
                info!("Notified {} active sessions of shutdown", closed);
            }
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging via tracing. `RUST_LOG` takes precedence; `LOG_LEVEL`
/// (a bare deployment key, e.g. `LOG_LEVEL=info`) is honored next.
fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("LOG_LEVEL")
                .map_err(anyhow::Error::from)
                .and_then(|level| {
                    tracing_subscriber::EnvFilter::try_new(format!("ptt_asr_backend={}", level))
                        .map_err(anyhow::Error::from)
                })
        })
        .unwrap_or_else(|_| "ptt_asr_backend=debug,actix_web=info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
