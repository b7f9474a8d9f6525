//! HTTP server: `GET /?domain=<name>` in front of the verifier.

use crate::config::CheckConfig;
use crate::error::{Error, Result};
use crate::event::{create_event_channel, CheckEvent, CheckEventsChannel, CheckEventsSender};
use crate::verifier::DomainVerifier;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state passed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    verifier: DomainVerifier,
    events: CheckEventsSender,
}

/// Query string of a check request.
#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    /// Domain to verify.
    pub domain: Option<String>,
}

/// Build the HTTP router.
pub fn router(verifier: DomainVerifier, events: CheckEventsSender) -> Router {
    Router::new()
        .route("/", get(check_domain))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { verifier, events })
}

/// `GET /?domain=<name>`: verify a domain and answer in plain text.
///
/// An unparseable query string is treated like a missing domain.
async fn check_domain(
    State(state): State<AppState>,
    query: std::result::Result<Query<CheckQuery>, QueryRejection>,
) -> impl IntoResponse {
    let domain = query
        .ok()
        .and_then(|Query(q)| q.domain)
        .unwrap_or_default();

    let outcome = state.verifier.verify(&domain).await;
    let _ = state.events.send(CheckEvent::DomainChecked {
        domain,
        outcome,
    });

    let status = StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::FORBIDDEN);
    (status, outcome.message())
}

/// Builder for constructing a tlscheck server.
pub struct ServerBuilder {
    config: CheckConfig,
    verifier: Option<DomainVerifier>,
}

impl ServerBuilder {
    /// Create a new server builder with the given configuration.
    #[must_use]
    pub fn new(config: CheckConfig) -> Self {
        Self {
            config,
            verifier: None,
        }
    }

    /// Use a prepared verifier instead of building one from the config.
    #[must_use]
    pub fn verifier(mut self, verifier: DomainVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Build the server and bind its listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the verifier cannot be built or the address
    /// cannot be bound.
    pub async fn build(self) -> Result<RunningServer> {
        info!("Building tlscheck server with config: {:?}", self.config);

        let verifier = match self.verifier {
            Some(verifier) => verifier,
            None => DomainVerifier::from_config(&self.config)?,
        };

        let bind = self.config.bind_addr();
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|e| Error::Server(format!("bind {bind}: {e}")))?;
        let local_addr = listener.local_addr()?;

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Create event channel
        let (events_tx, events_rx) = create_event_channel();

        Ok(RunningServer {
            listener,
            local_addr,
            verifier,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// Requests a running server to stop.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request the server to shut down. In-flight requests are drained.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// A bound tlscheck server.
pub struct RunningServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    verifier: DomainVerifier,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: CheckEventsSender,
    events_rx: Option<CheckEventsChannel>,
}

impl RunningServer {
    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a receiver for server events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<CheckEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to server events.
    #[must_use]
    pub fn subscribe_events(&self) -> CheckEventsChannel {
        self.events_tx.subscribe()
    }

    /// Handle that stops the server from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Serve until shutdown is requested or Ctrl-C is received.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails while serving.
    pub async fn run(self) -> Result<()> {
        let Self {
            listener,
            local_addr,
            verifier,
            shutdown_tx,
            mut shutdown_rx,
            events_tx,
            events_rx: _,
        } = self;

        info!("tlscheck listening on http://{}", local_addr);
        let _ = events_tx.send(CheckEvent::Started { addr: local_addr });

        // Fetch the range list before the first request needs it.
        if let Some(cdn) = verifier.cdn().cloned() {
            tokio::spawn(async move { cdn.warm().await });
        }

        let shutdown = async move {
            tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    info!("Shutdown signal received");
                }
                () = ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                }
            }
        };

        let app = router(verifier, events_tx.clone());
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        let _ = events_tx.send(CheckEvent::ShuttingDown);
        drop(shutdown_tx);

        if let Err(e) = result {
            warn!("Server error: {}", e);
            let _ = events_tx.send(CheckEvent::Error {
                message: e.to_string(),
            });
            return Err(Error::Server(e.to_string()));
        }

        info!("Server shutdown complete");
        Ok(())
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
