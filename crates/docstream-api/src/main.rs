//! docstream API server
//!
//! HTTP surface plus the in-process worker pipeline.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use docstream_api::routes;
use docstream_config::ApplicationConfig;
use tracing::info;

const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docstream_common::initialize_environment();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ApplicationConfig::from_env()?;
    info!(
        "starting docstream - api {}:{}, database {}",
        config.api.host,
        config.api.port,
        config.database.safe_connection_string()
    );

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;
    let application = docstream_api::bootstrap::build(config).await?;

    let shutdown = application.worker_runtime.shutdown_handle();
    let runtime = application.worker_runtime;
    let workers = tokio::spawn(async move { runtime.run().await });

    let app = routes::create_router(application.state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain in-flight jobs up to the deadline. Anything still processing
    // after that is returned to pending by the stale-job sweep - at the
    // next startup and periodically in every running replica.
    info!("shutting down, draining workers");
    shutdown.store(true, Ordering::Relaxed);
    let _ = tokio::time::timeout(DRAIN_DEADLINE, workers).await;

    application.pools.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
