//! Endpoint addressing and roles.

use std::fmt;

/// A host/port pair, used for the bind address and the remote peer.
///
/// The host is kept as given (name or literal) and resolved when the socket
/// is opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Address form accepted by `TcpListener::bind` and `TcpStream::connect`.
    pub fn as_target(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // IPv6 literals need brackets to stay unambiguous.
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Which side of a session a buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// The accepted, client-facing connection.
    Client,
    /// The dialed, upstream-facing connection.
    Remote,
}

impl EndpointRole {
    /// The opposite side.
    pub fn peer(self) -> Self {
        match self {
            Self::Client => Self::Remote,
            Self::Remote => Self::Client,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::new("127.0.0.1", 9000).to_string(), "127.0.0.1:9000");
        assert_eq!(Endpoint::new("localhost", 80).to_string(), "localhost:80");
        assert_eq!(Endpoint::new("::1", 9001).to_string(), "[::1]:9001");
    }

    #[test]
    fn test_role_peer() {
        assert_eq!(EndpointRole::Client.peer(), EndpointRole::Remote);
        assert_eq!(EndpointRole::Remote.peer(), EndpointRole::Client);
    }
}
