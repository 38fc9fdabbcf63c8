use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

/// Spawns a task that flips `closed` to `true` on the first SIGINT or
/// SIGTERM, so every long-running loop selecting on `closed.changed()`
/// unwinds at its next checkpoint (spec.md §4.6 "graceful shutdown").
pub fn watch_for_signals(closed: watch::Sender<bool>) {
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
        let _ = closed.send(true);
    });
}
