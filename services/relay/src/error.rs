//! Relay error types.

use std::io;

use colored::Colorize;
use thiserror::Error;

use crate::relay::{Endpoint, EndpointRole};

/// Failures that end a listener or a session.
///
/// Read timeouts and read errors never show up here: the drain treats them
/// as "no more data right now".
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening socket could not be bound. Fatal to the process.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: Endpoint,
        #[source]
        source: io::Error,
    },

    /// The remote peer could not be reached. Fatal to one session.
    #[error("failed to connect to remote {addr}: {source}")]
    Dial {
        addr: Endpoint,
        #[source]
        source: io::Error,
    },

    /// Writing a buffer to one side failed. Fatal to one session.
    #[error("failed to forward to {role}: {source}")]
    Forward {
        role: EndpointRole,
        #[source]
        source: io::Error,
    },
}

impl RelayError {
    /// Whether this error stops the whole process rather than one session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }
}

/// Print a fatal error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(RelayError::Bind { addr, .. }) = err.downcast_ref::<RelayError>() {
        eprintln!("{} Failed to listen on {}", "[!!]".red(), addr);
        eprintln!(
            "\n{}",
            "Hint: Check for other listening sockets or correct permissions.".yellow()
        );
    }
}
