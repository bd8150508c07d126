//! TCP listener with connection-count backpressure.
//!
//! A permit is taken from a semaphore before each accept, so at most
//! `max_connections` connections are open at once. Further clients wait in
//! the kernel backlog until a slot frees up.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid bind address `{address}`: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),

    #[error("connection limiter closed")]
    Closed,
}

impl ListenerError {
    /// Accept errors that only affect the one pending connection, or signal
    /// temporary descriptor exhaustion, are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ListenerError::Accept(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
            ) || is_fd_exhaustion(err),
            _ => false,
        }
    }
}

fn is_fd_exhaustion(err: &io::Error) -> bool {
    // EMFILE / ENFILE
    matches!(err.raw_os_error(), Some(23) | Some(24))
}

/// A bounded TCP listener.
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr =
            config
                .bind_address
                .parse()
                .map_err(|source| ListenerError::Address {
                    address: config.bind_address.clone(),
                    source,
                })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        Self::from_tcp(listener, config.max_connections)
    }

    /// Wrap an already bound listener.
    pub fn from_tcp(listener: TcpListener, max_connections: usize) -> Result<Self, ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %local_addr, max_connections, "listener bound");

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Wait for a free connection slot, then accept.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(peer_addr = %peer, error = %err, "failed to set TCP_NODELAY");
        }

        tracing::trace!(
            peer_addr = %peer,
            available_permits = self.connection_limit.available_permits(),
            "connection accepted"
        );
        Ok((stream, peer, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A connection slot, released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(bind_address: &str, max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: bind_address.to_string(),
            max_connections,
        }
    }

    #[tokio::test]
    async fn permits_bound_open_connections() {
        let listener = Listener::bind(&config("127.0.0.1:0", 1)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _first = TcpStream::connect(addr).await.unwrap();
        let (_stream, _, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 0);

        drop(permit);
        assert_eq!(listener.available_permits(), 1);
    }

    #[tokio::test]
    async fn bad_address_is_reported() {
        let err = Listener::bind(&config("localhost", 1)).await.err().unwrap();
        assert!(matches!(err, ListenerError::Address { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn aborted_accept_is_transient() {
        let err = ListenerError::Accept(io::Error::from(io::ErrorKind::ConnectionAborted));
        assert!(err.is_transient());
        let err = ListenerError::Accept(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!err.is_transient());
    }
}
