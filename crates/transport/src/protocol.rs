//! Wire shapes for the sidecar bridge: newline-delimited JSON requests,
//! correlated responses, and unsolicited event lines.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AccountInfo, TransportError};

#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeRequest {
	pub id: u64,
	#[serde(flatten)]
	pub op: BridgeOp,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeOp {
	/// Must be the first request on a fresh driver; binds the session to
	/// the on-disk directory.
	Init { session_dir: PathBuf },
	SendMessage { chat_id: String, body: String },
	IsRegistered { chat_id: String },
	Logout,
	Destroy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeResponse {
	pub id: u64,
	pub ok: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

impl BridgeResponse {
	/// Maps a failed response's `code` onto the transport error taxonomy.
	pub fn into_result(self) -> Result<Value, TransportError> {
		if self.ok {
			return Ok(self.data.unwrap_or(Value::Null));
		}
		let message = self.message.unwrap_or_else(|| "bridge call failed".to_string());
		Err(match self.code.as_deref() {
			Some("session_conflict") => TransportError::SessionConflict(message),
			Some("not_registered") => TransportError::NotRegistered,
			Some("invalid_recipient") => TransportError::InvalidRecipient(message),
			Some("not_found") => TransportError::NotFound,
			_ => TransportError::Transient(message),
		})
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
	/// Pairing credential, PNG bytes encoded as base64.
	Qr { png: String },
	Authenticated,
	Ready { account: AccountInfo },
	AuthFailure { message: String },
	Disconnected { reason: String },
}
