//! HTTP surface of the webhook.
//!
//! The API server only speaks HTTPS to webhooks. Either pass a certificate and
//! key to [`serve_tls`], or terminate TLS in front of [`serve`].
use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use kube::core::{
    admission::{AdmissionResponse, AdmissionReview},
    DynamicObject,
};
use podenv_core::MutationRules;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::admission;

/// Path the Pod mutation webhook is served on
pub const MUTATE_PATH: &str = "/mutate-v1-pod";
/// Path of the liveness/readiness probe
pub const HEALTH_PATH: &str = "/healthz";

/// How long in-flight https requests may run once shutdown starts
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Errors from running the webhook server
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to bind the listen address
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound
        addr: SocketAddr,
        /// The underlying io error
        #[source]
        source: std::io::Error,
    },

    /// Failed to load the TLS certificate or key
    #[error("failed to load tls config from {cert:?} and {key:?}: {source}")]
    TlsConfig {
        /// Certificate path
        cert: PathBuf,
        /// Private key path
        key: PathBuf,
        /// The underlying io error
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Build the webhook router around a shared rule set
pub fn router(rules: Arc<MutationRules>) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(mutate_handler))
        .route(HEALTH_PATH, get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(rules)
}

async fn health_handler() -> &'static str {
    "ok"
}

// The body is parsed by hand so that a malformed review still gets an
// AdmissionReview back rather than a plain-text extractor rejection.
async fn mutate_handler(State(rules): State<Arc<MutationRules>>, body: Bytes) -> impl IntoResponse {
    let review: AdmissionReview<DynamicObject> = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(err) => {
            warn!("invalid admission review: {err}");
            return (
                StatusCode::BAD_REQUEST,
                Json(AdmissionResponse::invalid(format!("invalid AdmissionReview: {err}")).into_review()),
            );
        }
    };
    let res = admission::review(&rules, review);
    (StatusCode::OK, Json(res.into_review()))
}

/// Serve `app` over plain HTTP until ctrl-c or SIGTERM
pub async fn serve(app: Router, addr: SocketAddr) -> Result<(), Error> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })?;
    info!(%addr, "serving webhook over http");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Error::Serve)
}

/// Serve `app` over HTTPS with a PEM certificate and key until ctrl-c or SIGTERM
///
/// The certificate files are read once at startup.
pub async fn serve_tls(app: Router, addr: SocketAddr, cert: PathBuf, key: PathBuf) -> Result<(), Error> {
    serve_tls_with_shutdown(app, addr, cert, key, shutdown_signal()).await
}

/// Serve `app` over HTTPS until `signal` completes
///
/// New connections stop being accepted once `signal` completes; requests in
/// flight get [`SHUTDOWN_GRACE`] to finish before their connections are closed.
pub async fn serve_tls_with_shutdown<F>(
    app: Router,
    addr: SocketAddr,
    cert: PathBuf,
    key: PathBuf,
    signal: F,
) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    // another component may already have installed a provider
    let _ = rustls::crypto::ring::default_provider().install_default();
    let config = RustlsConfig::from_pem_file(cert.clone(), key.clone())
        .await
        .map_err(|source| Error::TlsConfig { cert, key, source })?;

    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        signal.await;
        shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    info!(%addr, "serving webhook over https");
    axum_server::bind_rustls(addr, config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(Error::Serve)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutting down");
}
