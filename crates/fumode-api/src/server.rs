//! Server startup and lifecycle

use crate::{routes, ApiConfig, AppState};
use axum::{extract::ConnectInfo, Router};
use fumode_core::{termination_signal, BackgroundTaskRunner, ShutdownError, ShutdownSupervisor};
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tracing::{debug, info, warn};

/// A bound, not yet serving, API server
pub struct Server {
    state: Arc<AppState>,
    supervisor: ShutdownSupervisor,
    listener: TcpListener,
    addr: SocketAddr,
}

impl Server {
    /// Build the application state and bind the listener
    pub async fn bind(config: ApiConfig) -> anyhow::Result<Self> {
        Self::bind_with(config, |state| state).await
    }

    /// Like [`bind`](Self::bind), letting the caller adjust the state first
    pub async fn bind_with(
        config: ApiConfig,
        customize: impl FnOnce(AppState) -> AppState,
    ) -> anyhow::Result<Self> {
        let runner = BackgroundTaskRunner::new();
        let supervisor = ShutdownSupervisor::new(runner.clone(), config.shutdown_config());
        let state = AppState::new(config, runner, supervisor.subscribe())?;
        let state = Arc::new(customize(state));

        let listener = TcpListener::bind(state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;

        Ok(Self {
            state,
            supervisor,
            listener,
            addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn supervisor(&self) -> &ShutdownSupervisor {
        &self.supervisor
    }

    /// Serve until `signal` fires, then shut down gracefully
    pub async fn run(self, signal: impl Future<Output = ()>) -> Result<(), ShutdownError> {
        let Self {
            state,
            supervisor,
            listener,
            addr,
        } = self;

        let sweeper = Arc::clone(state.admission.registry()).spawn_sweeper(supervisor.subscribe());

        info!(addr = %addr, env = %state.config.env, "starting server");
        let app = routes::create_router(Arc::clone(&state));
        let server = serve(listener, app, state.config.idle_timeout(), supervisor.draining());

        let result = supervisor.run(addr, server, signal).await;

        if let Err(err) = sweeper.await {
            warn!(error = %err, "client sweeper task failed");
        }
        result
    }
}

/// Accept HTTP/1 connections until `shutdown` resolves, then wait for open
/// connections to finish their in-flight requests.
///
/// A connection that does not deliver a complete request head within
/// `idle_timeout` is closed, whether it is new or idle between keep-alive
/// requests.
async fn serve(
    listener: TcpListener,
    app: Router,
    idle_timeout: Duration,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let mut http = http1::Builder::new();
    http.timer(TokioTimer::new())
        .header_read_timeout(idle_timeout)
        .keep_alive(true);

    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection, retrying in 1s");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let router = app.clone();
        let service = service_fn(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(ConnectInfo(peer));
            router.clone().oneshot(request)
        });

        let connection = graceful.watch(http.serve_connection(TokioIo::new(stream), service));
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                debug!(peer = %peer, error = %err, "connection closed with error");
            }
        });
    }

    drop(listener);
    graceful.shutdown().await;
    Ok(())
}

/// Run the API server until SIGINT or SIGTERM
pub async fn run_server(config: ApiConfig) -> anyhow::Result<()> {
    let server = Server::bind(config).await?;
    server.run(termination_signal()).await?;
    Ok(())
}
