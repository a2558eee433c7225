//! Typed boundary to the messaging transport capability.
//!
//! The transport is opaque to the rest of the system: callers hold a
//! [`TransportHandle`] for outbound sends and consume lifecycle
//! [`TransportEvent`]s from a channel. [`BridgeTransport`] is the default
//! implementation, supervising a sidecar driver process over line-delimited
//! JSON on its stdio pipes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

mod bridge;
pub mod protocol;

pub use bridge::BridgeTransport;

/// Identity of the account a ready session is linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
	pub wid: Option<String>,
	pub pushname: Option<String>,
	pub platform: Option<String>,
}

/// Lifecycle events emitted by a live transport session, in the order the
/// underlying driver observed them.
#[derive(Debug, Clone)]
pub enum TransportEvent {
	/// One-time pairing credential as raw PNG image bytes.
	PairingCode { png: Vec<u8> },
	Authenticated,
	Ready { account: AccountInfo },
	AuthFailure { message: String },
	Disconnected { reason: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
	/// Another process holds the on-disk session directory.
	#[error("session directory already in use: {0}")]
	SessionConflict(String),

	#[error("recipient is not registered on the messaging service")]
	NotRegistered,

	#[error("invalid recipient address: {0}")]
	InvalidRecipient(String),

	#[error("recipient not found")]
	NotFound,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error("transport failure: {0}")]
	Transient(String),
}

/// Factory for transport sessions. At most one session per process is live
/// at a time; enforcing that is the caller's responsibility.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Allocates a session bound to `session_dir` and streams its lifecycle
	/// events into `events`. The returned handle stays valid until the
	/// session disconnects or is destroyed.
	async fn open(
		&self,
		session_dir: &Path,
		events: mpsc::UnboundedSender<TransportEvent>,
	) -> Result<Arc<dyn TransportHandle>, TransportError>;
}

/// Operations on one live session.
#[async_trait]
pub trait TransportHandle: Send + Sync {
	async fn send_message(&self, chat_id: &str, body: &str) -> Result<(), TransportError>;

	/// Best-effort pre-check that `chat_id` is reachable on the transport.
	async fn is_registered(&self, chat_id: &str) -> Result<bool, TransportError>;

	/// Graceful logout, unlinking the session from the account.
	async fn logout(&self) -> Result<(), TransportError>;

	/// Releases the underlying driver resources, forcibly if needed.
	async fn destroy(&self) -> Result<(), TransportError>;
}
