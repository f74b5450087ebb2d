//! Transport adapter interface.
//!
//! The queue never talks to a provider directly. Collaborators implement
//! this trait for each transport kind (a chat-session send, an SMTP/API
//! call) and the workers drive it. [`HookTransport`] is the stock
//! implementation: it delegates each operation to a per-channel
//! executable configured in the channel's TOML.

use crate::backoff::FailureKind;
use crate::config::{ChannelHooks, ChannelRegistry};
use crate::error::{Error, Result};
use crate::model::{ChannelId, ConnectivityState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error as ThisError;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// A failed transport operation, classified for retry accounting.
#[derive(Debug, ThisError)]
pub enum TransportError {
    /// The channel was unreachable. The send never reached the provider.
    #[error("channel unreachable: {0}")]
    Connectivity(String),

    /// The provider was reached and rejected the send.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Connectivity(_) => FailureKind::Connectivity,
            TransportError::Delivery(_) => FailureKind::Delivery,
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// The actual send path. One implementation serves all channels of its
/// transport kind; the channel id selects the concrete session/account.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `content` to `recipient` over `channel`.
    async fn send(
        &self,
        channel: &ChannelId,
        recipient: &str,
        content: &str,
    ) -> TransportResult<()>;

    /// Report the channel's current connectivity.
    async fn check_health(&self, channel: &ChannelId) -> ConnectivityState;

    /// (Re)establish the channel's connection.
    async fn connect(&self, channel: &ChannelId) -> TransportResult<()>;
}

// ---------------------------------------------------------------------------
// Hook transport
// ---------------------------------------------------------------------------

/// Exit code a send hook uses to signal "channel unreachable, try later"
/// (EX_TEMPFAIL from sysexits.h, the convention sendmail established).
const EX_TEMPFAIL: i32 = 75;

/// Transport backed by per-channel executables.
///
/// Each channel's TOML names a `send` hook and optional `health` and
/// `connect` hooks. The send hook gets the recipient in the environment
/// and the content on stdin; the health hook prints a connectivity state
/// on stdout. Channels without a health hook are assumed connected.
pub struct HookTransport {
    hooks: HashMap<ChannelId, ChannelHooks>,
}

impl HookTransport {
    /// Build from a channel registry.
    ///
    /// A channel without hooks is skipped with a warning rather than
    /// failing the whole transport — its worker will see it as
    /// disconnected and flag it, while other channels run normally.
    pub fn from_registry(registry: &ChannelRegistry) -> Result<Self> {
        let mut hooks = HashMap::new();
        for channel in registry.iter() {
            match channel.hooks {
                Some(ref channel_hooks) => {
                    hooks.insert(channel.id(), channel_hooks.clone());
                }
                None => {
                    warn!(
                        channel = %channel.name,
                        "channel has no transport hooks configured, it will be flagged"
                    );
                }
            }
        }
        if hooks.is_empty() && !registry.is_empty() {
            return Err(Error::Config(
                "no channel has transport hooks configured".to_string(),
            ));
        }
        Ok(Self { hooks })
    }

    fn hooks_for(&self, channel: &ChannelId) -> TransportResult<&ChannelHooks> {
        self.hooks
            .get(channel)
            .ok_or_else(|| TransportError::Connectivity(format!("unknown channel {channel}")))
    }
}

/// Resolve relative hook paths against the process CWD, so configs can
/// name hooks relative to the project root.
fn resolve(command: &Path) -> PathBuf {
    if command.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(command))
            .unwrap_or_else(|_| command.to_path_buf())
    } else {
        command.to_path_buf()
    }
}

#[async_trait]
impl Transport for HookTransport {
    async fn send(
        &self,
        channel: &ChannelId,
        recipient: &str,
        content: &str,
    ) -> TransportResult<()> {
        let hooks = self.hooks_for(channel)?;
        let command = resolve(&hooks.send);

        debug!(channel = %channel, command = %command.display(), "running send hook");

        let mut child = Command::new(&command)
            .env("COURIER_CHANNEL", channel.as_str())
            .env("COURIER_RECIPIENT", recipient)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::Connectivity(format!("spawn send hook: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(content.as_bytes())
                .await
                .map_err(|e| TransportError::Delivery(format!("write to send hook: {e}")))?;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| TransportError::Delivery(format!("wait for send hook: {e}")))?;

        match status.code() {
            Some(0) => Ok(()),
            Some(EX_TEMPFAIL) => Err(TransportError::Connectivity(
                "send hook reported channel unreachable".to_string(),
            )),
            code => Err(TransportError::Delivery(format!(
                "send hook exited with status {}",
                code.unwrap_or(-1)
            ))),
        }
    }

    async fn check_health(&self, channel: &ChannelId) -> ConnectivityState {
        let Ok(hooks) = self.hooks_for(channel) else {
            return ConnectivityState::Disconnected;
        };
        let Some(ref health) = hooks.health else {
            return ConnectivityState::Connected;
        };

        let output = Command::new(resolve(health))
            .env("COURIER_CHANNEL", channel.as_str())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let reported = String::from_utf8_lossy(&output.stdout);
                match reported.trim().parse() {
                    Ok(state) => state,
                    Err(_) => {
                        warn!(channel = %channel, reported = %reported.trim(), "health hook printed unknown state");
                        ConnectivityState::Degraded
                    }
                }
            }
            Ok(_) => ConnectivityState::Disconnected,
            Err(e) => {
                warn!(channel = %channel, error = %e, "health hook failed to run");
                ConnectivityState::Disconnected
            }
        }
    }

    async fn connect(&self, channel: &ChannelId) -> TransportResult<()> {
        let hooks = self.hooks_for(channel)?;
        let Some(ref connect) = hooks.connect else {
            return Ok(());
        };

        let status = Command::new(resolve(connect))
            .env("COURIER_CHANNEL", channel.as_str())
            .status()
            .await
            .map_err(|e| TransportError::Connectivity(format!("spawn connect hook: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(TransportError::Connectivity(format!(
                "connect hook exited with status {}",
                status.code().unwrap_or(-1)
            )))
        }
    }
}

