//! Proxy session: one client, one dialed remote.
//!
//! ```text
//! Dialing --> [Priming] --> Relaying --> Closed
//!                 ^            |  ^
//!    receive_first only        +--+ one round: client drain, remote drain,
//!                                    termination check
//! ```
//!
//! The two directions are pumped strictly one after the other. A round
//! drains the client and forwards to the remote, then drains the remote and
//! forwards to the client, and only then decides whether the conversation
//! is over. Both streams are shut down together on every exit path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hexrelay_hexdump::HexDump;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use super::drain::{drain, DEFAULT_IDLE_TIMEOUT};
use super::endpoint::{Endpoint, EndpointRole};
use super::hooks::Hooks;
use crate::error::RelayError;

/// Default timeout for dialing the remote.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// When a round of silence ends a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosePolicy {
    /// Close as soon as either side had nothing to say in a round.
    #[default]
    EitherSilent,
    /// Close only when both sides were silent in the same round.
    BothSilent,
}

impl ClosePolicy {
    /// Decide from whether each side went silent this round.
    pub fn should_close(self, client_silent: bool, remote_silent: bool) -> bool {
        match self {
            Self::EitherSilent => client_silent || remote_silent,
            Self::BothSilent => client_silent && remote_silent,
        }
    }
}

/// Per-session settings, shared by all sessions of a listener.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upstream peer to dial for every session.
    pub remote: Endpoint,
    /// Drain the remote once before the first client read.
    pub receive_first: bool,
    /// How long a drain waits for the next chunk.
    pub idle_timeout: Duration,
    /// How long dialing the remote may take.
    pub connect_timeout: Duration,
    pub close_policy: ClosePolicy,
    /// Hex dump width for received buffers; `None` disables dumps.
    pub hexdump_width: Option<usize>,
}

impl SessionConfig {
    pub fn new(remote: Endpoint) -> Self {
        Self {
            remote,
            receive_first: false,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_policy: ClosePolicy::default(),
            hexdump_width: Some(hexrelay_hexdump::DEFAULT_WIDTH),
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Dialing,
    Priming,
    Relaying,
    Closed,
}

/// Traffic totals of a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Bytes written to the remote, after the request hook.
    pub bytes_to_remote: u64,
    /// Bytes written to the client, after the response hook.
    pub bytes_to_client: u64,
    /// Relaying rounds run, including the final silent one.
    pub rounds: u64,
}

/// A relay between one accepted client and one remote.
pub struct Session {
    client: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<SessionConfig>,
    hooks: Hooks,
}

impl Session {
    pub fn new(
        client: TcpStream,
        peer_addr: SocketAddr,
        config: Arc<SessionConfig>,
        hooks: Hooks,
    ) -> Self {
        Self {
            client,
            peer_addr,
            config,
            hooks,
        }
    }

    /// Run the session to completion.
    ///
    /// Fails only when the remote cannot be dialed or a forward fails; both
    /// streams are closed in every case.
    pub async fn run(self) -> Result<SessionSummary, RelayError> {
        let Session {
            mut client,
            peer_addr,
            config,
            hooks,
        } = self;

        debug!(peer_addr = %peer_addr, remote = %config.remote, "Session started");
        let mut pump = Pump::new(&config, &hooks);

        let mut remote = match pump.dial().await {
            Ok(remote) => remote,
            Err(e) => {
                pump.transition(SessionState::Closed);
                let _ = client.shutdown().await;
                return Err(e);
            }
        };

        let result = pump.relay(&mut client, &mut remote).await;

        pump.transition(SessionState::Closed);
        let (client_shutdown, remote_shutdown) = tokio::join!(client.shutdown(), remote.shutdown());
        if let Err(e) = client_shutdown.and(remote_shutdown) {
            debug!(error = %e, "Shutdown after relay failed");
        }

        result.map(|()| pump.summary)
    }
}

/// Session state that the two streams are pumped through.
struct Pump<'a> {
    config: &'a SessionConfig,
    hooks: &'a Hooks,
    state: SessionState,
    summary: SessionSummary,
}

impl<'a> Pump<'a> {
    fn new(config: &'a SessionConfig, hooks: &'a Hooks) -> Self {
        Self {
            config,
            hooks,
            state: SessionState::Dialing,
            summary: SessionSummary::default(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session state changed");
        self.state = next;
    }

    async fn dial(&self) -> Result<TcpStream, RelayError> {
        let addr = &self.config.remote;
        debug!(remote = %addr, "Connecting to remote");

        let connected = match timeout(
            self.config.connect_timeout,
            TcpStream::connect(addr.as_target()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timeout",
            )),
        };

        let stream = connected.map_err(|source| RelayError::Dial {
            addr: addr.clone(),
            source,
        })?;
        info!(remote = %addr, "Connected to remote");
        Ok(stream)
    }

    async fn relay(
        &mut self,
        client: &mut TcpStream,
        remote: &mut TcpStream,
    ) -> Result<(), RelayError> {
        if self.config.receive_first {
            self.transition(SessionState::Priming);
            // The response hook sees the banner even when it is empty.
            let banner = self.receive(EndpointRole::Remote, remote).await;
            let out = self.hooks.on_response(banner);
            self.forward(EndpointRole::Client, client, out).await?;
        }

        self.transition(SessionState::Relaying);
        loop {
            self.summary.rounds += 1;
            let client_silent = self.step(EndpointRole::Client, client, remote).await?;
            let remote_silent = self.step(EndpointRole::Remote, remote, client).await?;

            if self
                .config
                .close_policy
                .should_close(client_silent, remote_silent)
            {
                info!(
                    rounds = self.summary.rounds,
                    client_silent, remote_silent, "No more data, closing connections"
                );
                return Ok(());
            }
        }
    }

    /// Drain `reader`, run the hook for `from` and forward to `writer`.
    ///
    /// Returns whether the round saw silence from `from`: nothing was
    /// drained, or the hook turned the buffer into nothing.
    async fn step(
        &mut self,
        from: EndpointRole,
        reader: &mut TcpStream,
        writer: &mut TcpStream,
    ) -> Result<bool, RelayError> {
        let data = self.receive(from, reader).await;
        if data.is_empty() {
            return Ok(true);
        }

        let out = self.hooks.apply(from, data);
        let silent = out.is_empty();
        self.forward(from.peer(), writer, out).await?;
        Ok(silent)
    }

    /// Drain `reader` and log what arrived.
    async fn receive(&self, from: EndpointRole, reader: &mut TcpStream) -> Bytes {
        let drained = drain(reader, self.config.idle_timeout).await;
        debug!(from = %from, bytes = drained.len(), end = ?drained.end, "Drain finished");
        if drained.is_empty() {
            return drained.data;
        }

        info!(from = %from, bytes = drained.len(), "Received {} bytes from {}", drained.len(), from);
        if let Some(width) = self.config.hexdump_width {
            info!("\n{}", HexDump::with_width(&drained.data, width));
        }
        drained.data
    }

    async fn forward(
        &mut self,
        to: EndpointRole,
        writer: &mut TcpStream,
        data: Bytes,
    ) -> Result<(), RelayError> {
        if data.is_empty() {
            debug!(to = %to, "Hook produced no bytes, nothing to forward");
            return Ok(());
        }

        writer
            .write_all(&data)
            .await
            .map_err(|source| RelayError::Forward { role: to, source })?;

        let sent = data.len() as u64;
        match to {
            EndpointRole::Remote => self.summary.bytes_to_remote += sent,
            EndpointRole::Client => self.summary.bytes_to_client += sent,
        }
        info!(to = %to, bytes = sent, "Sent {} bytes to {}", sent, to);
        Ok(())
    }
}
