use std::net::SocketAddr;
use std::process;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fngate::cli::{format_config_summary, Args};
use fngate::config::GatewayConfig;
use fngate::runtime::build_http_client;
use fngate::server::{create_router, AppState};
use fngate::store::build_store;

#[tokio::main]
async fn main() {
    let mut args = Args::parse();

    // Load .env file if specified, then re-read so its values feed env-backed flags
    if let Some(ref env_file) = args.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            eprintln!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
        args = Args::parse();
    }

    // Initialize logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = match GatewayConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    // Dry-run mode: print the resolved configuration and exit
    if args.dry_run {
        println!("{}", format_config_summary(&config));
        return;
    }

    let client = match build_http_client() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            process::exit(1);
        }
    };

    let store = build_store(&config.store, client.clone());
    let addr = format!("{}:{}", config.bind_addr, config.port);

    if config.auth_enabled() {
        info!("Authentication enabled (bearer token)");
    } else {
        warn!("No auth token configured, running in open mode");
    }
    info!("Pipeline store: {}", store.describe());
    info!(
        "Backends resolved as <name>:{} on network '{}'",
        config.backend_port, config.network
    );

    let state = AppState::new(config, store, client);
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            process::exit(1);
        }
    };

    info!("Server listening on {}", addr);
    info!("Endpoints:");
    info!("  GET  /health                        - Health check");
    info!("  GET  /                              - Service descriptor");
    info!("  ANY  /orchestrate/<pipeline>[/path] - Run a pipeline");
    info!("  ANY  /<backend>[/path]              - Proxy to a backend");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        error!("Server error: {}", e);
        process::exit(1);
    }

    info!("Server stopped");
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
