// src/core/shutdown.rs

//! Waits for a shutdown signal based on the operating system. On Unix,
//! SIGINT and SIGTERM; on Windows, Ctrl+C.

#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

pub async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    #[cfg(windows)]
    let mut ctrl_c = signal::ctrl_c().expect("failed to install Ctrl+C handler");

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; tracing::info!("SIGINT received, initiating graceful shutdown"); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; tracing::info!("SIGTERM received, initiating graceful shutdown"); } } => {},
        _ = async { #[cfg(windows)] { let _ = ctrl_c.await; tracing::info!("Ctrl-C received, initiating graceful shutdown"); } } => {},
    }
}
