//! Timeout-bounded receive.
//!
//! A drain reads everything a peer has to say "for now": it keeps reading
//! until the peer closes its write side or goes quiet for the idle timeout.
//! Many protocols pause between packets, so quiet is not an error and
//! neither is a failed read. The drain never fails; it only reports why it
//! stopped.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::trace;

/// Default time to wait for the next chunk before giving up on a drain.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Read granularity.
pub const READ_CHUNK: usize = 4096;

/// Why a drain stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainEnd {
    /// The peer closed its write side (a read returned zero bytes).
    Closed,
    /// No byte arrived within the idle timeout.
    Idle,
    /// A read failed; whatever arrived before the failure is kept.
    Failed(io::ErrorKind),
}

/// Bytes collected by one drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    pub data: Bytes,
    pub end: DrainEnd,
}

impl Drained {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Read from `reader` until it closes or stays quiet for `idle_timeout`.
///
/// The timer restarts after every chunk. An immediate close and a timeout
/// with no data both yield an empty buffer.
///
/// The buffer is not capped: a peer that never pauses for `idle_timeout`
/// keeps it growing, and the drain does not return until it does pause.
pub async fn drain<R>(reader: &mut R, idle_timeout: Duration) -> Drained
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    let end = loop {
        buf.reserve(READ_CHUNK);
        match timeout(idle_timeout, reader.read_buf(&mut buf)).await {
            Ok(Ok(0)) => break DrainEnd::Closed,
            Ok(Ok(n)) => trace!(bytes = n, "Chunk read"),
            Ok(Err(e)) => {
                trace!(error = %e, "Read failed, ending drain");
                break DrainEnd::Failed(e.kind());
            }
            Err(_) => break DrainEnd::Idle,
        }
    };

    Drained {
        data: buf.freeze(),
        end,
    }
}
