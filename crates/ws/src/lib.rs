#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! The interactive-connection endpoint: an axum server accepting
//! WebSocket connections, registering them with the client registry, and
//! serving inbound control messages.

pub mod app_state;
pub mod control;
pub mod handle;
pub mod routes;

pub use app_state::AppState;
pub use handle::WsHandle;

use tokio::net::TcpListener;
use tracing::info;

/// All the errors of this crate.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configured bind address could not be parsed.
    #[error("invalid bind address {addr:?}: {source}")]
    InvalidBindAddress {
        /// The offending address string.
        addr: String,
        /// Underlying parse error.
        source: std::net::AddrParseError,
    },
    /// Failed to bind the TCP listener.
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        /// Address that failed to bind.
        addr: std::net::SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The server exited with an error.
    #[error("server error: {0}")]
    ServerError(#[source] std::io::Error),
}

/// Runs the interactive-connection endpoint until `shutdown` resolves.
pub async fn run(bind_addr: &str, state: AppState, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<(), Error> {
    let addr: std::net::SocketAddr = bind_addr.parse().map_err(|source| Error::InvalidBindAddress {
        addr: bind_addr.to_string(),
        source,
    })?;

    let router = routes::routes().with_state(state);

    let listener = TcpListener::bind(&addr).await.map_err(|source| Error::BindFailed { addr, source })?;

    info!(%addr, "interactive-connection endpoint listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(Error::ServerError)
}
