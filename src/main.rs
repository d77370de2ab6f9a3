//! Main entry point for the service gateway

use service_gateway::{api, config::Settings, gateway::router::SharedRouteTable, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    info!("Starting service gateway");
    info!(
        "Loaded configuration: server={}:{} routes={} clusters={} monitored={}",
        settings.server.host,
        settings.server.port,
        settings.routes.len(),
        settings.clusters.len(),
        settings.health.services.len()
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = Arc::new(AppState::from_settings(settings).await?);

    state.health_monitor.start();

    #[cfg(unix)]
    spawn_route_reload(state.route_table.clone());

    let app = api::routes::create_router(state.clone());

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.health_monitor.stop();
    info!("Service gateway stopped");

    Ok(())
}

/// Rebuild the route table from the configuration file on SIGHUP
#[cfg(unix)]
fn spawn_route_reload(route_table: Arc<SharedRouteTable>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGHUP, route reload disabled");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading routes");
            match Settings::load().and_then(|settings| route_table.reload(&settings)) {
                Ok(()) => {}
                Err(e) => error!(error = %e, "Route reload failed, keeping current table"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
