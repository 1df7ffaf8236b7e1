//! Signal-driven graceful shutdown
//!
//! The process moves through three states, published on a `watch` channel:
//!
//! ```text
//!   Running ──(SIGINT / SIGTERM / shutdown())──► Draining ──► Stopped
//! ```
//!
//! On entering `Draining` the listener stops accepting connections and is
//! given until the deadline to finish in-flight requests; background work is
//! then drained against the same deadline. Errors from either phase are held
//! until both are done and returned from [`ShutdownSupervisor::run`].

use crate::background::BackgroundTaskRunner;
use crate::error::{BoxError, ShutdownError};
use serde::Serialize;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Default bound on the whole draining phase
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(20);

/// Lifecycle of the serving process
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ShutdownConfig {
    /// Wall-clock bound on listener close plus background drain
    pub deadline: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_SHUTDOWN_DEADLINE,
        }
    }
}

/// Owns the shutdown state machine for one server
#[derive(Clone)]
pub struct ShutdownSupervisor {
    state: Arc<watch::Sender<ShutdownState>>,
    runner: BackgroundTaskRunner,
    config: ShutdownConfig,
}

impl ShutdownSupervisor {
    pub fn new(runner: BackgroundTaskRunner, config: ShutdownConfig) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state: Arc::new(state),
            runner,
            config,
        }
    }

    /// Current state
    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Resolves once the process has left `Running`.
    ///
    /// Suitable as the graceful shutdown trigger of an HTTP server.
    pub fn draining(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut state = self.state.subscribe();
        async move {
            let _ = state.wait_for(|s| *s != ShutdownState::Running).await;
        }
    }

    /// Request shutdown without a signal. Returns false if already requested.
    pub fn shutdown(&self) -> bool {
        self.transition(ShutdownState::Draining)
    }

    fn transition(&self, next: ShutdownState) -> bool {
        self.state.send_if_modified(|state| {
            if *state < next {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Serve until `signal` fires (or [`shutdown`](Self::shutdown) is
    /// called), then close the listener and drain background work.
    ///
    /// `server` must itself stop accepting connections once
    /// [`draining`](Self::draining) resolves. A listener error is reported in
    /// preference to a drain timeout; either way it is returned only after
    /// the drain has finished or the deadline has passed.
    pub async fn run<S, E, F>(&self, addr: impl fmt::Display, server: S, signal: F) -> Result<(), ShutdownError>
    where
        S: IntoFuture<Output = Result<(), E>>,
        S::IntoFuture: Send + 'static,
        E: Into<BoxError> + Send + 'static,
        F: Future<Output = ()>,
    {
        let addr = addr.to_string();
        let deadline = self.config.deadline;
        let mut server = tokio::spawn(server.into_future());
        let requested = self.draining();
        tokio::pin!(signal);
        tokio::pin!(requested);

        let mut listener_error = None;
        let mut listener_open = true;

        tokio::select! {
            _ = &mut signal => info!(addr = %addr, "shutting down server"),
            _ = &mut requested => info!(addr = %addr, "shutdown requested"),
            outcome = &mut server => {
                listener_open = false;
                let source: Option<BoxError> = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some(err.into()),
                    Err(join) => Some(join.to_string().into()),
                };
                match source {
                    Some(source) => {
                        error!(addr = %addr, error = %source, "server stopped unexpectedly");
                        listener_error = Some(ShutdownError::Serve { addr: addr.clone(), source });
                    }
                    None => warn!(addr = %addr, "server exited before shutdown was requested"),
                }
            }
        }

        self.transition(ShutdownState::Draining);
        let until = Instant::now() + deadline;

        if listener_open {
            match tokio::time::timeout_at(until, &mut server).await {
                Ok(Ok(Ok(()))) => info!(addr = %addr, "listener closed"),
                Ok(Ok(Err(err))) => {
                    let source: BoxError = err.into();
                    error!(addr = %addr, error = %source, "listener failed while closing");
                    listener_error = Some(ShutdownError::Listener { addr: addr.clone(), source });
                }
                Ok(Err(join)) => {
                    error!(addr = %addr, error = %join, "listener task failed while closing");
                    listener_error = Some(ShutdownError::Listener {
                        addr: addr.clone(),
                        source: join.to_string().into(),
                    });
                }
                Err(_) => {
                    server.abort();
                    error!(addr = %addr, ?deadline, "listener did not close before the deadline");
                    listener_error = Some(ShutdownError::ListenerTimeout { addr: addr.clone(), deadline });
                }
            }
        }

        info!(addr = %addr, pending = self.runner.outstanding(), "completing background tasks");
        let drain_error = match tokio::time::timeout_at(until, self.runner.drain()).await {
            Ok(()) => None,
            Err(_) => {
                let pending = self.runner.outstanding();
                error!(addr = %addr, pending, ?deadline, "background tasks did not finish before the deadline");
                Some(ShutdownError::DrainTimeout { pending, deadline })
            }
        };

        self.transition(ShutdownState::Stopped);

        match (listener_error, drain_error) {
            (None, None) => {
                info!(addr = %addr, "stopped server");
                Ok(())
            }
            (Some(err), dropped) => {
                if let Some(dropped) = dropped {
                    warn!(addr = %addr, error = %dropped, "additional shutdown failure");
                }
                Err(err)
            }
            (None, Some(err)) => Err(err),
        }
    }
}

/// Resolves on SIGINT (Ctrl+C) or, on unix, SIGTERM.
pub async fn termination_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "unable to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = interrupt => "interrupt",
        _ = terminate => "terminate",
    };
    info!(signal, "shutdown signal received");
}
