//! Default transport: a supervised sidecar driver speaking newline-delimited
//! JSON over stdio.
//!
//! The driver owns the actual messaging connection (and whatever browser
//! worker it needs); this side only spawns it, correlates request/response
//! pairs, and forwards its event lines upstream.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

use crate::protocol::{BridgeEvent, BridgeOp, BridgeRequest, BridgeResponse};
use crate::{Transport, TransportError, TransportEvent, TransportHandle};

const SPAWN_GRACE: Duration = Duration::from_millis(100);
const DESTROY_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<BridgeResponse>>>>;

/// Spawns the driver program once per [`Transport::open`] call.
pub struct BridgeTransport {
	program: PathBuf,
	args: Vec<String>,
}

impl BridgeTransport {
	pub fn new(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
			args: Vec::new(),
		}
	}

	pub fn with_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args = args.into_iter().map(Into::into).collect();
		self
	}
}

#[async_trait]
impl Transport for BridgeTransport {
	async fn open(
		&self,
		session_dir: &Path,
		events: mpsc::UnboundedSender<TransportEvent>,
	) -> Result<Arc<dyn TransportHandle>, TransportError> {
		let mut child = Command::new(&self.program)
			.args(&self.args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.spawn()
			.map_err(|e| TransportError::Transient(format!("failed to spawn bridge driver: {e}")))?;

		// Catch drivers that die on startup before we start writing to them.
		tokio::time::sleep(SPAWN_GRACE).await;
		match child.try_wait() {
			Ok(Some(status)) => {
				return Err(TransportError::Transient(format!(
					"bridge driver exited immediately with status: {status}"
				)));
			}
			Ok(None) => {}
			Err(e) => return Err(TransportError::Io(e)),
		}

		let stdin = child
			.stdin
			.take()
			.ok_or_else(|| TransportError::Transient("bridge driver stdin unavailable".to_string()))?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| TransportError::Transient("bridge driver stdout unavailable".to_string()))?;

		let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
		tokio::spawn(read_pump(stdout, Arc::clone(&pending), events));

		let handle = Arc::new(BridgeHandle {
			writer: Mutex::new(stdin),
			child: Mutex::new(Some(child)),
			pending,
			next_id: AtomicU64::new(1),
		});

		// The driver acks init once it has claimed the session directory; a
		// conflict surfaces here as a session_conflict error code.
		if let Err(err) = handle.call(BridgeOp::Init { session_dir: session_dir.to_path_buf() }).await {
			handle.kill_child().await;
			return Err(err);
		}

		Ok(handle)
	}
}

struct BridgeHandle {
	writer: Mutex<ChildStdin>,
	child: Mutex<Option<Child>>,
	pending: PendingMap,
	next_id: AtomicU64,
}

impl BridgeHandle {
	async fn call(&self, op: BridgeOp) -> Result<Value, TransportError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().await.insert(id, tx);

		let line = serde_json::to_string(&BridgeRequest { id, op })
			.map_err(|e| TransportError::Transient(format!("failed to encode bridge request: {e}")))?;
		if let Err(err) = self.write_line(&line).await {
			self.pending.lock().await.remove(&id);
			return Err(TransportError::Io(err));
		}

		match rx.await {
			Ok(response) => response.into_result(),
			Err(_) => Err(TransportError::Transient(
				"bridge driver closed before responding".to_string(),
			)),
		}
	}

	async fn write_line(&self, line: &str) -> std::io::Result<()> {
		let mut writer = self.writer.lock().await;
		writer.write_all(format!("{line}\n").as_bytes()).await?;
		writer.flush().await
	}

	async fn kill_child(&self) {
		if let Some(mut child) = self.child.lock().await.take() {
			if let Err(err) = child.kill().await {
				warn!(target = "leadcast.bridge", error = %err, "failed to kill bridge driver");
			}
			let _ = tokio::time::timeout(DESTROY_TIMEOUT, child.wait()).await;
		}
	}
}

#[async_trait]
impl TransportHandle for BridgeHandle {
	async fn send_message(&self, chat_id: &str, body: &str) -> Result<(), TransportError> {
		self.call(BridgeOp::SendMessage {
			chat_id: chat_id.to_string(),
			body: body.to_string(),
		})
		.await
		.map(|_| ())
	}

	async fn is_registered(&self, chat_id: &str) -> Result<bool, TransportError> {
		let data = self.call(BridgeOp::IsRegistered { chat_id: chat_id.to_string() }).await?;
		Ok(data.get("registered").and_then(Value::as_bool).unwrap_or(true))
	}

	async fn logout(&self) -> Result<(), TransportError> {
		self.call(BridgeOp::Logout).await.map(|_| ())
	}

	async fn destroy(&self) -> Result<(), TransportError> {
		let graceful = tokio::time::timeout(DESTROY_TIMEOUT, self.call(BridgeOp::Destroy)).await;
		self.kill_child().await;
		match graceful {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(err)) => Err(err),
			Err(_) => Err(TransportError::Transient("bridge destroy timed out".to_string())),
		}
	}
}

async fn read_pump(stdout: ChildStdout, pending: PendingMap, events: mpsc::UnboundedSender<TransportEvent>) {
	let mut reader = BufReader::new(stdout);
	let mut line = String::new();

	loop {
		line.clear();
		match reader.read_line(&mut line).await {
			Ok(0) => break,
			Ok(_) => {}
			Err(err) => {
				warn!(target = "leadcast.bridge", error = %err, "bridge read failed");
				break;
			}
		}

		let trimmed = line.trim_end();
		if trimmed.is_empty() {
			continue;
		}

		if let Ok(event) = serde_json::from_str::<BridgeEvent>(trimmed) {
			forward_event(event, &events);
			continue;
		}

		match serde_json::from_str::<BridgeResponse>(trimmed) {
			Ok(response) => {
				if let Some(tx) = pending.lock().await.remove(&response.id) {
					let _ = tx.send(response);
				} else {
					debug!(target = "leadcast.bridge", id = response.id, "response without a waiter");
				}
			}
			Err(err) => {
				warn!(target = "leadcast.bridge", error = %err, "unparseable bridge line");
			}
		}
	}

	// Driver is gone: fail outstanding calls, then surface the disconnect.
	pending.lock().await.clear();
	let _ = events.send(TransportEvent::Disconnected {
		reason: "bridge driver closed its pipe".to_string(),
	});
}

fn forward_event(event: BridgeEvent, events: &mpsc::UnboundedSender<TransportEvent>) {
	let mapped = match event {
		BridgeEvent::Qr { png } => match BASE64.decode(png.as_bytes()) {
			Ok(bytes) => TransportEvent::PairingCode { png: bytes },
			Err(err) => {
				warn!(target = "leadcast.bridge", error = %err, "discarding undecodable pairing payload");
				return;
			}
		},
		BridgeEvent::Authenticated => TransportEvent::Authenticated,
		BridgeEvent::Ready { account } => TransportEvent::Ready { account },
		BridgeEvent::AuthFailure { message } => TransportEvent::AuthFailure { message },
		BridgeEvent::Disconnected { reason } => TransportEvent::Disconnected { reason },
	};
	let _ = events.send(mapped);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[cfg(unix)]
	#[tokio::test]
	async fn bridge_round_trips_calls_and_events() {
		// Scripted driver: one event line, then an ack for init (id 1) and a
		// classified failure for the send (id 2).
		let script = concat!(
			r#"echo '{"event":"authenticated"}'; "#,
			r#"read line; echo '{"id":1,"ok":true}'; "#,
			r#"read line; echo '{"id":2,"ok":false,"code":"not_registered","message":"no account"}'"#,
		);
		let transport = BridgeTransport::new("sh").with_args(["-c", script]);
		let (tx, mut rx) = mpsc::unbounded_channel();

		let handle = transport
			.open(Path::new("/tmp/leadcast-bridge-test"), tx)
			.await
			.unwrap();

		assert!(matches!(rx.recv().await, Some(TransportEvent::Authenticated)));

		let err = handle.send_message("94771234567@c.us", "hello").await.unwrap_err();
		assert!(matches!(err, TransportError::NotRegistered));

		// Script exits after the second response; EOF becomes a disconnect.
		loop {
			match rx.recv().await {
				Some(TransportEvent::Disconnected { .. }) => break,
				Some(_) => {}
				None => panic!("event channel closed without a disconnect"),
			}
		}
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn init_conflict_fails_open() {
		let script = r#"read line; echo '{"id":1,"ok":false,"code":"session_conflict","message":"directory locked"}'"#;
		let transport = BridgeTransport::new("sh").with_args(["-c", script]);
		let (tx, _rx) = mpsc::unbounded_channel();

		let err = transport
			.open(Path::new("/tmp/leadcast-bridge-test"), tx)
			.await
			.err()
			.expect("open should fail on conflict");
		assert!(matches!(err, TransportError::SessionConflict(_)));
	}

	#[tokio::test]
	async fn missing_program_is_transient() {
		let transport = BridgeTransport::new("/nonexistent/leadcast-driver");
		let (tx, _rx) = mpsc::unbounded_channel();
		let err = transport
			.open(Path::new("/tmp/leadcast-bridge-test"), tx)
			.await
			.err()
			.expect("open should fail");
		assert!(matches!(err, TransportError::Transient(_)));
	}
}
