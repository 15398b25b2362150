//! fanout-server: HTTP adapter for the Fanout processor.
//!
//! - [`routes`]: `/process`, `/healthz`, `/info`
//! - [`stub`]: slow-I/O stub downstream for local runs and tests
//! - [`serve`]: run a router until Ctrl-C / SIGTERM

pub mod routes;
pub mod stub;

pub use routes::{router, ApiError, AppState};
pub use stub::{stub_router, StubState};

use axum::Router;
use tokio::net::TcpListener;

/// Serve `app` on `listener` until a shutdown signal arrives.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
    tracing::info!("shutdown signal received");
}
