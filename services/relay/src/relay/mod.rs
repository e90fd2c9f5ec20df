//! Interactive TCP relay.
//!
//! This module provides:
//! - TCP listener management and per-connection session tasks
//! - Timeout-bounded draining of each side
//! - Request/response inspection hooks
//! - The session state machine that ties them together
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Session --drain--> request hook  --> Remote
//!                          ^                                   |
//!                          +-- response hook <--drain----------+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use hexrelay::relay::{Endpoint, Hooks, Listener, ListenerConfig};
//!
//! let config = ListenerConfig::new(Endpoint::new("127.0.0.1", 9000), Endpoint::new("10.0.0.5", 21));
//! let listener = Listener::bind(config, Hooks::default()).await?;
//! Arc::new(listener).run().await;
//! ```

mod drain;
mod endpoint;
mod hooks;
mod listener;
mod session;

pub use drain::{drain, DrainEnd, Drained, DEFAULT_IDLE_TIMEOUT, READ_CHUNK};
pub use endpoint::{Endpoint, EndpointRole};
pub use hooks::{Alert, Chain, FnHook, Hook, HookError, Hooks, Identity, Pad, Replace};
pub use listener::{Listener, ListenerConfig, ListenerStats};
pub use session::{
    ClosePolicy, Session, SessionConfig, SessionState, SessionSummary, DEFAULT_CONNECT_TIMEOUT,
};
