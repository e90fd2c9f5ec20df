pub mod cli;
pub mod config;
pub mod error;
pub mod relay;

pub use error::RelayError;
pub use relay::{
    ClosePolicy, Endpoint, EndpointRole, Hook, HookError, Hooks, Listener, ListenerConfig,
    ListenerStats, Session, SessionConfig, SessionSummary,
};
