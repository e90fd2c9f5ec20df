//! TCP listener and session spawning.
//!
//! The listener binds once and then accepts forever. Every accepted
//! connection gets its own task running one [`Session`]; the listener never
//! waits for sessions and never sees their failures beyond counting them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};

use super::endpoint::Endpoint;
use super::hooks::Hooks;
use super::session::{Session, SessionConfig};
use crate::error::RelayError;

/// Pause after a failed accept, to avoid a tight loop on persistent errors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind: Endpoint,
    /// Cap on concurrent sessions; `None` accepts without limit.
    pub max_sessions: Option<usize>,
    /// Settings handed to every session.
    pub session: SessionConfig,
}

impl ListenerConfig {
    /// Create a new listener configuration.
    pub fn new(bind: Endpoint, remote: Endpoint) -> Self {
        Self {
            bind,
            max_sessions: None,
            session: SessionConfig::new(remote),
        }
    }
}

/// Statistics for a listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted and handed to a session.
    pub sessions_accepted: AtomicU64,
    /// Sessions currently running.
    pub sessions_active: AtomicU64,
    /// Sessions finished, successfully or not.
    pub sessions_closed: AtomicU64,
    /// Connections rejected due to the session cap.
    pub sessions_rejected: AtomicU64,
    /// Sessions that could not reach the remote.
    pub dial_failures: AtomicU64,
    /// Bytes forwarded to the remote by finished sessions.
    pub bytes_to_remote: AtomicU64,
    /// Bytes forwarded to clients by finished sessions.
    pub bytes_to_client: AtomicU64,
}

/// The relay's accepting side.
pub struct Listener {
    listener: TcpListener,
    session_config: Arc<SessionConfig>,
    hooks: Hooks,
    /// Present only when sessions are capped.
    session_limit: Option<Arc<Semaphore>>,
    stats: Arc<ListenerStats>,
    next_session_id: AtomicU64,
}

impl Listener {
    /// Bind the listening socket.
    ///
    /// A bind failure is returned before any connection is accepted.
    pub async fn bind(config: ListenerConfig, hooks: Hooks) -> Result<Self, RelayError> {
        let bind_err = |source: std::io::Error| RelayError::Bind {
            addr: config.bind.clone(),
            source,
        };
        let listener = TcpListener::bind(config.bind.as_target())
            .await
            .map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        info!(
            bind_addr = %local_addr,
            remote = %config.session.remote,
            receive_first = config.session.receive_first,
            max_sessions = ?config.max_sessions,
            "Listening"
        );

        Ok(Self {
            listener,
            session_limit: config.max_sessions.map(|n| Arc::new(Semaphore::new(n))),
            session_config: Arc::new(config.session),
            hooks,
            stats: Arc::new(ListenerStats::default()),
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get listener statistics.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Shared handle to the statistics, usable after the listener moved into `run`.
    pub fn stats_handle(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections forever, one session task per connection.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let permit = match &self.session_limit {
                        Some(limit) => match Arc::clone(limit).try_acquire_owned() {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                self.stats.sessions_rejected.fetch_add(1, Ordering::Relaxed);
                                warn!(peer_addr = %peer_addr, "Connection rejected: max sessions reached");
                                continue;
                            }
                        },
                        None => None,
                    };

                    let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                    info!(peer_addr = %peer_addr, session_id = id, "Received incoming connection");

                    self.stats.sessions_accepted.fetch_add(1, Ordering::Relaxed);
                    self.stats.sessions_active.fetch_add(1, Ordering::Relaxed);

                    let session = Session::new(
                        stream,
                        peer_addr,
                        Arc::clone(&self.session_config),
                        self.hooks.clone(),
                    );
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(
                        async move {
                            match session.run().await {
                                Ok(summary) => {
                                    stats
                                        .bytes_to_remote
                                        .fetch_add(summary.bytes_to_remote, Ordering::Relaxed);
                                    stats
                                        .bytes_to_client
                                        .fetch_add(summary.bytes_to_client, Ordering::Relaxed);
                                    info!(
                                        bytes_to_remote = summary.bytes_to_remote,
                                        bytes_to_client = summary.bytes_to_client,
                                        rounds = summary.rounds,
                                        "Session closed"
                                    );
                                }
                                Err(e @ RelayError::Dial { .. }) => {
                                    stats.dial_failures.fetch_add(1, Ordering::Relaxed);
                                    warn!(error = %e, "Session aborted");
                                }
                                Err(e) => {
                                    debug!(error = %e, "Session error");
                                }
                            }

                            stats.sessions_active.fetch_sub(1, Ordering::Relaxed);
                            stats.sessions_closed.fetch_add(1, Ordering::Relaxed);
                            drop(permit);
                        }
                        .instrument(tracing::info_span!("session", id, peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_config_default() {
        let config = ListenerConfig::new(
            Endpoint::new("127.0.0.1", 9000),
            Endpoint::new("127.0.0.1", 9001),
        );
        assert!(config.max_sessions.is_none());
        assert_eq!(config.session.remote.port, 9001);
        assert!(!config.session.receive_first);
    }

    #[tokio::test]
    async fn test_bind_reports_local_addr() {
        let config = ListenerConfig::new(
            Endpoint::new("127.0.0.1", 0),
            Endpoint::new("127.0.0.1", 9),
        );
        let listener = Listener::bind(config, Hooks::default()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(listener.stats().sessions_accepted.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_bind_in_use_fails() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = ListenerConfig::new(
            Endpoint::new("127.0.0.1", port),
            Endpoint::new("127.0.0.1", 9),
        );
        let err = Listener::bind(config, Hooks::default()).await.err().unwrap();
        match err {
            RelayError::Bind { addr, source } => {
                assert_eq!(addr.port, port);
                assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
            }
            other => panic!("expected bind error, got {other}"),
        }
    }
}
