//! Stopping a running server.
//!
//! Every run of an [`HttpServer`](crate::HttpServer) owns one [`StopSignal`].
//! The accept loop, each connection and each socket session hold a
//! [`StopListener`] and learn from it both that they must stop and how.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

/// How [`HttpServer::stop`](crate::HttpServer::stop) treats in-flight work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopMode {
    /// Stop accepting, let in-flight requests finish and flush queued
    /// socket messages before closing.
    #[default]
    Graceful,
    /// Stop accepting and abandon in-flight requests and sessions.
    Force,
}

/// Owner side of a stop request. The first [`StopSignal::stop`] wins.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<Option<StopMode>>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Requests a stop. Returns false if one was already requested.
    pub fn stop(&self, mode: StopMode) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(mode);
            true
        })
    }

    /// The requested mode, if any.
    pub fn mode(&self) -> Option<StopMode> {
        *self.tx.borrow()
    }

    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Task side of a [`StopSignal`].
#[derive(Debug)]
pub struct StopListener {
    rx: watch::Receiver<Option<StopMode>>,
}

impl StopListener {
    /// Resolves with the requested mode.
    ///
    /// Never resolves if the signal is dropped without a request: an
    /// in-process router outlives no server run.
    pub async fn stopped(mut self) -> StopMode {
        let requested = match self.rx.wait_for(Option::is_some).await {
            Ok(mode) => *mode,
            Err(_) => None,
        };
        match requested {
            Some(mode) => mode,
            None => std::future::pending().await,
        }
    }
}

/// Resolves on SIGTERM or SIGINT (Ctrl+C elsewhere).
#[cfg(unix)]
pub async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut sigterm), Ok(mut sigint)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        debug!("Signal handlers unavailable, falling back to Ctrl+C");
        let _ = tokio::signal::ctrl_c().await;
        return;
    };

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!(signal = name, "Stopping on signal");
}

/// Resolves on SIGTERM or SIGINT (Ctrl+C elsewhere).
#[cfg(not(unix))]
pub async fn terminate_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(signal = "ctrl-c", "Stopping on signal");
    }
}
