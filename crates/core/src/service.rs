//! Long-running process contract: a named unit that owns its shutdown via a
//! `CancellationToken` rather than being killed out from under itself.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Service: Send {
    fn name(&self) -> &'static str;

    /// Runs until `shutdown` is cancelled or the service finishes on its own.
    /// Implementations let any in-flight unit of work complete before
    /// returning.
    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()>;
}

/// Runs a `Service`, installing SIGINT/SIGTERM as the cancellation trigger.
pub async fn run_with_signal_shutdown(service: Box<dyn Service>) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("shutdown signal received, draining in-flight work");
        signal_token.cancel();
    });

    let name = service.name();
    tracing::info!(service = name, "starting service");
    let result = service.run(shutdown).await;
    match &result {
        Ok(()) => tracing::info!(service = name, "service stopped cleanly"),
        Err(err) => tracing::error!(service = name, error = ?err, "service stopped with error"),
    }
    result
}
