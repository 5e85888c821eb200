//! Lectern gateway - HTTP/WebSocket front for the avatar lecture pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod notify;
mod proxy;
mod state;

use lectern_core::adapters::{
    KeycloakDirectory, LanguageModelClient, SpeechToTextClient, TextToSpeechClient, VideoClient,
};
use lectern_core::{AccessGuard, GatewayConfig, Pipeline, PipelineOptions, StorageLayout};
use notify::{NotificationHub, PlaylistWatcher};
use state::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "lectern-server",
    about = "HTTP gateway for the Lectern avatar lecture pipeline",
    version = env!("CARGO_PKG_VERSION")
)]
struct ServerArgs {
    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BindConfig {
    host: String,
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lectern_server=info,lectern_core=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Lectern gateway");

    let config = Arc::new(GatewayConfig::from_env());
    let layout = StorageLayout::new(
        config.output_root.clone(),
        config.profiles_root.clone(),
        config.references_root.clone(),
    );
    layout.ensure_roots()?;
    info!("Shared storage at {:?}", config.output_root);

    let state = build_state(config.clone(), layout.clone())?;

    // Watcher lifetime is explicit: spawned here, signalled on shutdown.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher = PlaylistWatcher::new(state.hub.clone(), layout, config.watch_interval)
        .spawn(shutdown_rx);

    let app = api::create_router(state);

    let bind = resolve_bind_config(args);
    let addr = format!("{}:{}", bind.host, bind.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on http://{}", addr);

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    info!("Gateway ready. Press Ctrl+C to stop.");
    server.await?;

    let _ = shutdown_tx.send(true);
    watcher.await?;

    Ok(())
}

fn build_state(config: Arc<GatewayConfig>, layout: StorageLayout) -> anyhow::Result<AppState> {
    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;
    // No overall timeout on the streaming client: a live render legitimately
    // outlives any fixed bound, and disconnects abort the fetch instead.
    let streaming_http = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;

    let directory = Arc::new(KeycloakDirectory::new(
        http.clone(),
        config.directory_url.clone(),
        config.directory_token.clone(),
    ));
    let video = Arc::new(VideoClient::new(streaming_http, config.video_url.clone()));

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(SpeechToTextClient::new(http.clone(), config.stt_url.clone())),
        Arc::new(LanguageModelClient::new(http.clone(), config.llm_url.clone())),
        Arc::new(TextToSpeechClient::new(http.clone(), config.tts_url.clone())),
        video.clone(),
        AccessGuard::new(directory),
        layout.clone(),
        PipelineOptions {
            language: config.language.clone(),
            chunk_poll_interval: config.chunk_poll_interval,
            chunk_timeout: config.chunk_timeout,
        },
    ));

    let hub = Arc::new(NotificationHub::new());
    Ok(AppState::new(pipeline, video, hub, layout, config))
}

fn resolve_bind_config(args: ServerArgs) -> BindConfig {
    BindConfig {
        host: args.host.unwrap_or_else(host_from_env_or_default),
        port: args.port.unwrap_or_else(port_from_env_or_default),
    }
}

fn host_from_env_or_default() -> String {
    match std::env::var("LECTERN_HOST") {
        Ok(raw) => {
            let host = raw.trim();
            if host.is_empty() {
                warn!("Empty LECTERN_HOST, falling back to 0.0.0.0");
                "0.0.0.0".to_string()
            } else {
                host.to_string()
            }
        }
        Err(_) => "0.0.0.0".to_string(),
    }
}

fn port_from_env_or_default() -> u16 {
    match std::env::var("LECTERN_PORT") {
        Ok(raw) => match raw.trim().parse::<u16>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid LECTERN_PORT='{}', falling back to 8080", raw);
                8080
            }
        },
        Err(_) => 8080,
    }
}

/// Wait for a shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("environment lock poisoned")
    }

    fn clear_bind_env() {
        std::env::remove_var("LECTERN_HOST");
        std::env::remove_var("LECTERN_PORT");
    }

    fn parse(args: &[&str]) -> ServerArgs {
        ServerArgs::try_parse_from(args).expect("arguments should parse")
    }

    #[test]
    fn cli_values_override_environment() {
        let _guard = env_lock();
        clear_bind_env();
        std::env::set_var("LECTERN_HOST", "0.0.0.0");
        std::env::set_var("LECTERN_PORT", "8080");

        let bind = resolve_bind_config(parse(&[
            "lectern-server",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
        ]));

        assert_eq!(bind.host, "127.0.0.1");
        assert_eq!(bind.port, 9000);
        clear_bind_env();
    }

    #[test]
    fn uses_environment_when_cli_values_missing() {
        let _guard = env_lock();
        clear_bind_env();
        std::env::set_var("LECTERN_HOST", "127.0.0.1");
        std::env::set_var("LECTERN_PORT", "8088");

        let bind = resolve_bind_config(parse(&["lectern-server"]));

        assert_eq!(bind.host, "127.0.0.1");
        assert_eq!(bind.port, 8088);
        clear_bind_env();
    }

    #[test]
    fn falls_back_to_defaults_without_cli_or_environment() {
        let _guard = env_lock();
        clear_bind_env();

        let bind = resolve_bind_config(parse(&["lectern-server"]));

        assert_eq!(bind.host, "0.0.0.0");
        assert_eq!(bind.port, 8080);
    }

    #[test]
    fn falls_back_to_default_when_env_port_is_invalid() {
        let _guard = env_lock();
        clear_bind_env();
        std::env::set_var("LECTERN_PORT", "not-a-port");

        let bind = resolve_bind_config(parse(&["lectern-server"]));

        assert_eq!(bind.port, 8080);
        clear_bind_env();
    }
}
