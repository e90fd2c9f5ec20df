//! Command-line interface.

use clap::{ArgAction, Parser, ValueEnum};

use crate::relay::ClosePolicy;

/// hexrelay - interactive TCP relay with hex dumps and traffic hooks.
#[derive(Debug, Parser)]
#[command(name = "hexrelay")]
#[command(author, version, about, long_about = None)]
#[command(override_usage = "hexrelay [OPTIONS] <LOCAL_HOST> <LOCAL_PORT> <REMOTE_HOST> <REMOTE_PORT> <RECEIVE_FIRST>
       hexrelay 127.0.0.1 9000 10.12.132.1 9000 true")]
pub struct Cli {
    /// Local host to listen on.
    pub local_host: String,

    /// Local port to listen on.
    pub local_port: u16,

    /// Remote host to relay to.
    pub remote_host: String,

    /// Remote port to relay to.
    pub remote_port: u16,

    /// Whether the remote sends data first (true/false).
    #[arg(value_parser = parse_bool, action = ArgAction::Set)]
    pub receive_first: bool,

    /// Milliseconds a drain waits for more bytes before moving on.
    #[arg(long, env = "HEXRELAY_IDLE_TIMEOUT_MS", default_value_t = 5000)]
    pub idle_timeout_ms: u64,

    /// Milliseconds allowed for connecting to the remote.
    #[arg(long, env = "HEXRELAY_CONNECT_TIMEOUT_MS", default_value_t = 10_000)]
    pub connect_timeout_ms: u64,

    /// Maximum concurrent sessions (unbounded if omitted).
    #[arg(long, env = "HEXRELAY_MAX_SESSIONS")]
    pub max_sessions: Option<usize>,

    /// When a quiet round ends a session.
    #[arg(long, value_enum, env = "HEXRELAY_CLOSE_WHEN", default_value_t = CloseWhen::Either)]
    pub close_when: CloseWhen,

    /// Bytes per hex dump line.
    #[arg(long, env = "HEXRELAY_HEXDUMP_WIDTH", default_value_t = 16)]
    pub hexdump_width: usize,

    /// Do not log hex dumps of received data.
    #[arg(long)]
    pub no_hexdump: bool,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, env = "HEXRELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, value_enum, env = "HEXRELAY_LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Rewrite client bytes: replace every FROM with TO. Repeatable.
    #[arg(long, value_name = "FROM=TO", value_parser = parse_substitution)]
    pub request_replace: Vec<Substitution>,

    /// Rewrite remote bytes: replace every FROM with TO. Repeatable.
    #[arg(long, value_name = "FROM=TO", value_parser = parse_substitution)]
    pub response_replace: Vec<Substitution>,

    /// Append COUNT 'A' bytes to every client buffer (fuzzing).
    #[arg(long, value_name = "COUNT")]
    pub request_pad: Option<usize>,

    /// Warn when client bytes contain TEXT (case-insensitive). Repeatable.
    #[arg(long, value_name = "TEXT")]
    pub request_alert: Vec<String>,

    /// Warn when remote bytes contain TEXT (case-insensitive). Repeatable.
    #[arg(long, value_name = "TEXT")]
    pub response_alert: Vec<String>,
}

/// `--close-when` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CloseWhen {
    /// Close when either side was silent for a round.
    Either,
    /// Close only when both sides were silent in the same round.
    Both,
}

impl From<CloseWhen> for ClosePolicy {
    fn from(value: CloseWhen) -> Self {
        match value {
            CloseWhen::Either => ClosePolicy::EitherSilent,
            CloseWhen::Both => ClosePolicy::BothSilent,
        }
    }
}

/// `--log-format` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// A `FROM=TO` rewrite rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

/// Parse a boolean strictly: `true`/`false`, `yes`/`no` or `1`/`0`, any case.
pub fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(format!("expected true or false, got `{value}`")),
    }
}

/// Parse a `FROM=TO` rule. `TO` may be empty; `FROM` may not.
pub fn parse_substitution(value: &str) -> Result<Substitution, String> {
    let (from, to) = value
        .split_once('=')
        .ok_or_else(|| format!("expected FROM=TO, got `{value}`"))?;
    if from.is_empty() {
        return Err("FROM must not be empty".to_string());
    }
    Ok(Substitution {
        from: from.to_string(),
        to: to.to_string(),
    })
}
