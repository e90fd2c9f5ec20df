//! Inspection hooks.
//!
//! Every buffer drained from the client passes through the request hook
//! before it is written to the remote, and every buffer drained from the
//! remote passes through the response hook before it is written to the
//! client. Hooks are synchronous and must not block.
//!
//! Hook invocation is total: a hook that returns an error or panics is
//! logged and the original buffer is forwarded unchanged, so a broken hook
//! never takes a session down.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::warn;

use super::endpoint::EndpointRole;

/// Hook failures. Always absorbed by [`Hooks`].
#[derive(Debug, Error)]
pub enum HookError {
    /// A search pattern was empty.
    #[error("empty search pattern")]
    EmptyPattern,

    /// Any other failure inside a hook.
    #[error("{0}")]
    Failed(String),
}

/// A transform over one direction's traffic.
pub trait Hook: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Transform a drained buffer. The output may be empty, shorter or longer.
    fn apply(&self, data: &Bytes) -> Result<Bytes, HookError>;
}

/// The pair of hooks applied by every session.
#[derive(Clone)]
pub struct Hooks {
    request: Arc<dyn Hook>,
    response: Arc<dyn Hook>,
}

impl Hooks {
    pub fn new(request: Arc<dyn Hook>, response: Arc<dyn Hook>) -> Self {
        Self { request, response }
    }

    /// Identity in both directions.
    pub fn identity() -> Self {
        Self::new(Arc::new(Identity), Arc::new(Identity))
    }

    /// Transform client→remote bytes.
    pub fn on_request(&self, data: Bytes) -> Bytes {
        run_guarded(self.request.as_ref(), EndpointRole::Client, data)
    }

    /// Transform remote→client bytes.
    pub fn on_response(&self, data: Bytes) -> Bytes {
        run_guarded(self.response.as_ref(), EndpointRole::Remote, data)
    }

    /// Apply the hook for bytes that were drained from `from`.
    pub fn apply(&self, from: EndpointRole, data: Bytes) -> Bytes {
        match from {
            EndpointRole::Client => self.on_request(data),
            EndpointRole::Remote => self.on_response(data),
        }
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("request", &self.request.name())
            .field("response", &self.response.name())
            .finish()
    }
}

fn run_guarded(hook: &dyn Hook, from: EndpointRole, data: Bytes) -> Bytes {
    match panic::catch_unwind(AssertUnwindSafe(|| hook.apply(&data))) {
        Ok(Ok(out)) => out,
        Ok(Err(e)) => {
            warn!(hook = hook.name(), from = %from, error = %e, "Hook failed, forwarding original bytes");
            data
        }
        Err(_) => {
            warn!(hook = hook.name(), from = %from, "Hook panicked, forwarding original bytes");
            data
        }
    }
}

/// Pass-through hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Hook for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn apply(&self, data: &Bytes) -> Result<Bytes, HookError> {
        Ok(data.clone())
    }
}

/// Replace every occurrence of `needle` with `replacement`, left to right.
#[derive(Debug, Clone)]
pub struct Replace {
    needle: Bytes,
    replacement: Bytes,
}

impl Replace {
    pub fn new(needle: impl Into<Bytes>, replacement: impl Into<Bytes>) -> Self {
        Self {
            needle: needle.into(),
            replacement: replacement.into(),
        }
    }
}

impl Hook for Replace {
    fn name(&self) -> &str {
        "replace"
    }

    fn apply(&self, data: &Bytes) -> Result<Bytes, HookError> {
        if self.needle.is_empty() {
            return Err(HookError::EmptyPattern);
        }
        if find(data, &self.needle).is_none() {
            return Ok(data.clone());
        }

        let mut out = BytesMut::with_capacity(data.len());
        let mut rest = &data[..];
        while let Some(pos) = find(rest, &self.needle) {
            out.extend_from_slice(&rest[..pos]);
            out.extend_from_slice(&self.replacement);
            rest = &rest[pos + self.needle.len()..];
        }
        out.extend_from_slice(rest);
        Ok(out.freeze())
    }
}

/// Append `count` copies of `byte` to every non-empty buffer.
#[derive(Debug, Clone, Copy)]
pub struct Pad {
    byte: u8,
    count: usize,
}

impl Pad {
    pub fn new(byte: u8, count: usize) -> Self {
        Self { byte, count }
    }
}

impl Hook for Pad {
    fn name(&self) -> &str {
        "pad"
    }

    fn apply(&self, data: &Bytes) -> Result<Bytes, HookError> {
        // An empty round must stay empty, or padding would keep sessions alive.
        if data.is_empty() || self.count == 0 {
            return Ok(data.clone());
        }
        let mut out = BytesMut::with_capacity(data.len() + self.count);
        out.extend_from_slice(data);
        out.resize(data.len() + self.count, self.byte);
        Ok(out.freeze())
    }
}

/// Log a warning when `needle` shows up; never modifies traffic.
#[derive(Debug, Clone)]
pub struct Alert {
    needle: Bytes,
    ignore_case: bool,
}

impl Alert {
    pub fn new(needle: impl Into<Bytes>) -> Self {
        Self {
            needle: needle.into(),
            ignore_case: false,
        }
    }

    /// Match ASCII letters case-insensitively.
    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        if self.ignore_case {
            find(
                &data.to_ascii_lowercase(),
                &self.needle.to_ascii_lowercase(),
            )
            .is_some()
        } else {
            find(data, &self.needle).is_some()
        }
    }
}

impl Hook for Alert {
    fn name(&self) -> &str {
        "alert"
    }

    fn apply(&self, data: &Bytes) -> Result<Bytes, HookError> {
        if self.needle.is_empty() {
            return Err(HookError::EmptyPattern);
        }
        if self.matches(data) {
            warn!(
                pattern = %String::from_utf8_lossy(&self.needle),
                "Alert pattern seen in traffic"
            );
        }
        Ok(data.clone())
    }
}

/// Apply several hooks in order. A failing link fails the whole chain.
#[derive(Clone, Default)]
pub struct Chain {
    hooks: Vec<Arc<dyn Hook>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn with(mut self, hook: impl Hook + 'static) -> Self {
        self.push(Arc::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl Hook for Chain {
    fn name(&self) -> &str {
        "chain"
    }

    fn apply(&self, data: &Bytes) -> Result<Bytes, HookError> {
        let mut current = data.clone();
        for hook in &self.hooks {
            current = hook.apply(&current)?;
        }
        Ok(current)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}

/// Adapt a closure into a [`Hook`].
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&Bytes) -> Result<Bytes, HookError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Hook for FnHook<F>
where
    F: Fn(&Bytes) -> Result<Bytes, HookError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, data: &Bytes) -> Result<Bytes, HookError> {
        (self.f)(data)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
