mod middleware;
mod public;

pub use public::{HttpState, build_router};

use std::{net::SocketAddr, time::Duration};

use axum::Router;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::error::InfraError;

/// Serve `router` on `addr` until ctrl-c, then drain in-flight requests for at
/// most `graceful_shutdown`.
pub async fn serve(
    router: Router,
    addr: SocketAddr,
    graceful_shutdown: Duration,
) -> Result<(), InfraError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind { addr, source })?;
    info!(target = "pagecache::http", %addr, "listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => return flatten(joined),
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(
                    target = "pagecache::http",
                    error = %err,
                    "failed to listen for shutdown signal"
                );
            }
            info!(target = "pagecache::http", "shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(graceful_shutdown, &mut server).await {
        Ok(joined) => flatten(joined),
        Err(_) => {
            warn!(
                target = "pagecache::http",
                timeout_secs = graceful_shutdown.as_secs(),
                "graceful shutdown timed out, aborting"
            );
            server.abort();
            Ok(())
        }
    }
}

fn flatten(joined: Result<std::io::Result<()>, tokio::task::JoinError>) -> Result<(), InfraError> {
    match joined {
        Ok(result) => result.map_err(InfraError::from),
        Err(err) => Err(InfraError::from(std::io::Error::other(err))),
    }
}
