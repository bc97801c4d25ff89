use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal;

/// Which signal ended [`wait_for_shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    CtrlC,
    Terminate,
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn wait_for_shutdown() -> Result<ShutdownSignal> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        sig.recv().await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    let received = tokio::select! {
        res = ctrl_c => res.map(|_| ShutdownSignal::CtrlC),
        res = terminate => res.map(|_| ShutdownSignal::Terminate),
    }?;

    tracing::info!(signal = ?received, "shutdown signal received, draining connections");
    Ok(received)
}

/// Like [`wait_for_shutdown`], then arms a deadline: once `grace` elapses after
/// the signal, `on_deadline` fires. A zero `grace` never fires it.
pub async fn shutdown_with_deadline<F>(grace: Duration, on_deadline: F) -> Result<ShutdownSignal>
where
    F: FnOnce() + Send + 'static,
{
    let received = wait_for_shutdown().await?;
    if !grace.is_zero() {
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            tracing::warn!(grace_secs = grace.as_secs(), "graceful shutdown deadline exceeded");
            on_deadline();
        });
    }
    Ok(received)
}
