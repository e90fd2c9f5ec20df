//! Relay configuration.
//!
//! The CLI (with its environment fallbacks) is resolved into a [`Config`]
//! once at startup; nothing is read from the environment afterwards.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Result};
use bytes::Bytes;

use crate::cli::{Cli, LogFormat, Substitution};
use crate::relay::{Alert, Chain, Endpoint, Hook, Hooks, Identity, ListenerConfig, Pad, Replace};

/// Byte appended by `--request-pad`.
pub const PAD_BYTE: u8 = b'A';

/// Fully resolved relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listener: ListenerConfig,
    pub hooks: HookConfig,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Validate and resolve parsed command-line arguments.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        ensure!(!cli.local_host.is_empty(), "Local host must not be empty.");
        ensure!(!cli.remote_host.is_empty(), "Remote host must not be empty.");
        ensure!(
            cli.idle_timeout_ms > 0,
            "--idle-timeout-ms must be greater than zero."
        );
        ensure!(
            cli.connect_timeout_ms > 0,
            "--connect-timeout-ms must be greater than zero."
        );
        ensure!(
            cli.max_sessions != Some(0),
            "--max-sessions must be at least 1 (omit it for no limit)."
        );

        let mut listener = ListenerConfig::new(
            Endpoint::new(cli.local_host, cli.local_port),
            Endpoint::new(cli.remote_host, cli.remote_port),
        );
        listener.max_sessions = cli.max_sessions;
        listener.session.receive_first = cli.receive_first;
        listener.session.idle_timeout = Duration::from_millis(cli.idle_timeout_ms);
        listener.session.connect_timeout = Duration::from_millis(cli.connect_timeout_ms);
        listener.session.close_policy = cli.close_when.into();
        listener.session.hexdump_width = (!cli.no_hexdump).then_some(cli.hexdump_width);

        Ok(Self {
            listener,
            hooks: HookConfig {
                request_replace: cli.request_replace,
                response_replace: cli.response_replace,
                request_pad: cli.request_pad,
                request_alerts: cli.request_alert,
                response_alerts: cli.response_alert,
            },
            log_level: cli.log_level,
            log_format: cli.log_format,
        })
    }
}

/// Operator hooks selected on the command line.
#[derive(Debug, Clone, Default)]
pub struct HookConfig {
    pub request_replace: Vec<Substitution>,
    pub response_replace: Vec<Substitution>,
    pub request_pad: Option<usize>,
    pub request_alerts: Vec<String>,
    pub response_alerts: Vec<String>,
}

impl HookConfig {
    /// Build the hook pair. Each direction runs its alerts on the original
    /// bytes, then its replacements in order, then padding.
    pub fn build(&self) -> Hooks {
        let mut request = direction_chain(&self.request_alerts, &self.request_replace);
        if let Some(count) = self.request_pad.filter(|&n| n > 0) {
            request.push(Arc::new(Pad::new(PAD_BYTE, count)));
        }
        let response = direction_chain(&self.response_alerts, &self.response_replace);

        Hooks::new(finish(request), finish(response))
    }
}

fn direction_chain(alerts: &[String], replacements: &[Substitution]) -> Chain {
    let mut chain = Chain::new();
    for text in alerts {
        chain.push(Arc::new(
            Alert::new(Bytes::from(text.clone().into_bytes())).ignore_case(),
        ));
    }
    for sub in replacements {
        chain.push(Arc::new(Replace::new(
            Bytes::from(sub.from.clone().into_bytes()),
            Bytes::from(sub.to.clone().into_bytes()),
        )));
    }
    chain
}

fn finish(chain: Chain) -> Arc<dyn Hook> {
    if chain.is_empty() {
        Arc::new(Identity)
    } else {
        Arc::new(chain)
    }
}
