//! Lifecycle supervision for the single messaging-transport session.
//!
//! One [`SessionManager`] owns the process-wide session. It serializes
//! (re)initialization behind a re-entrancy flag, consumes transport events
//! sequentially from a channel, recovers session-directory conflicts through
//! the process supervisor, and retries with bounded exponential backoff
//! before declaring the session fatal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use leadcast_transport::{AccountInfo, Transport, TransportError, TransportEvent, TransportHandle};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::supervisor::ProcessSupervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
	#[default]
	Disconnected,
	Connecting,
	Authenticated,
	Ready,
}

/// Snapshot served by `GET /api/session/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
	pub state: SessionState,
	pub pairing_image: Option<String>,
	pub account_info: Option<AccountInfo>,
}

#[derive(Default)]
struct SessionInner {
	state: SessionState,
	pairing_image: Option<String>,
	account: Option<AccountInfo>,
	handle: Option<Arc<dyn TransportHandle>>,
	/// Consecutive failed connection cycles since the last sign of forward
	/// progress (pairing code or ready).
	retry_count: u32,
	/// Bumped on every open and on cleanup so event loops from superseded
	/// sessions cannot clobber the current one.
	epoch: u64,
}

pub struct SessionManager {
	transport: Arc<dyn Transport>,
	supervisor: ProcessSupervisor,
	clock: Arc<dyn Clock>,
	config: Config,
	inner: Mutex<SessionInner>,
	initializing: AtomicBool,
}

/// Clears the re-entrancy flag on every exit path of `initialize`.
struct InitFlag<'a>(&'a AtomicBool);

impl Drop for InitFlag<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::SeqCst);
	}
}

impl SessionManager {
	pub fn new(
		transport: Arc<dyn Transport>,
		supervisor: ProcessSupervisor,
		clock: Arc<dyn Clock>,
		config: Config,
	) -> Self {
		Self {
			transport,
			supervisor,
			clock,
			config,
			inner: Mutex::new(SessionInner::default()),
			initializing: AtomicBool::new(false),
		}
	}

	/// Allocates a transport session bound to the configured session
	/// directory.
	///
	/// Idempotent: a call that observes another initialization in flight, or
	/// a session that is already connecting or ready, returns immediately
	/// without side effects. Conflict errors trigger worker reclamation and
	/// exponential backoff; other init errors retry on a fixed delay. Once
	/// the retry budget is spent the session stays disconnected until
	/// explicitly re-invoked.
	pub async fn initialize(self: &Arc<Self>) -> Result<()> {
		if self.initializing.swap(true, Ordering::SeqCst) {
			debug!(target = "leadcast.session", "initialization already in flight");
			return Ok(());
		}
		let _flag = InitFlag(&self.initializing);

		{
			let inner = self.inner.lock();
			if inner.state != SessionState::Disconnected {
				return Ok(());
			}
		}

		let mut attempt = 0u32;
		loop {
			let epoch = {
				let mut inner = self.inner.lock();
				inner.state = SessionState::Connecting;
				inner.epoch += 1;
				inner.epoch
			};

			let (events_tx, events_rx) = mpsc::unbounded_channel();
			match self.transport.open(&self.config.session_dir, events_tx).await {
				Ok(handle) => {
					self.inner.lock().handle = Some(handle);
					self.spawn_event_loop(events_rx, epoch);
					info!(target = "leadcast.session", attempt, "transport session allocated, awaiting pairing");
					return Ok(());
				}
				Err(TransportError::SessionConflict(message)) => {
					warn!(target = "leadcast.session", attempt, %message, "session directory held by another process");
					if attempt >= self.config.max_init_retries {
						break;
					}
					self.supervisor.reclaim(&self.config.session_dir).await;
					let delay = backoff_delay(self.config.backoff_base, self.config.backoff_cap, attempt);
					debug!(target = "leadcast.session", delay_secs = delay.as_secs(), "retrying after conflict reclaim");
					self.clock.sleep(delay).await;
				}
				Err(err) => {
					warn!(target = "leadcast.session", attempt, error = %err, "transport init failed");
					if attempt >= self.config.max_init_retries {
						break;
					}
					self.clock.sleep(self.config.backoff_base).await;
				}
			}
			attempt += 1;
		}

		self.inner.lock().state = SessionState::Disconnected;
		let attempts = attempt + 1;
		error!(
			target = "leadcast.session",
			attempts, "session initialization failed permanently; operator intervention required"
		);
		Err(CoreError::InitRetriesExhausted { attempts })
	}

	/// Graceful logout, then unconditional cleanup. Safe to call when
	/// already disconnected.
	pub async fn disconnect(&self) {
		let handle = self.inner.lock().handle.clone();
		if let Some(handle) = handle {
			if let Err(err) = handle.logout().await {
				warn!(target = "leadcast.session", error = %err, "logout failed, proceeding with cleanup");
			}
		}
		self.cleanup().await;
	}

	/// Releases session resources: graceful destroy first, forced worker
	/// reclamation if that fails or there is nothing to destroy, and the
	/// in-memory fields are cleared last regardless of which path ran.
	pub async fn cleanup(&self) {
		let handle = {
			let mut inner = self.inner.lock();
			// Orphan any in-flight event loop before tearing down.
			inner.epoch += 1;
			inner.handle.take()
		};

		match handle {
			Some(handle) => {
				if let Err(err) = handle.destroy().await {
					warn!(target = "leadcast.session", error = %err, "graceful destroy failed, reclaiming workers");
					self.supervisor.reclaim(&self.config.session_dir).await;
				}
			}
			None => {
				self.supervisor.reclaim(&self.config.session_dir).await;
			}
		}

		let mut inner = self.inner.lock();
		inner.state = SessionState::Disconnected;
		inner.pairing_image = None;
		inner.account = None;
		inner.retry_count = 0;
	}

	/// The active transport capability, available only while ready.
	pub fn ready_handle(&self) -> Result<Arc<dyn TransportHandle>> {
		let inner = self.inner.lock();
		match (&inner.state, &inner.handle) {
			(SessionState::Ready, Some(handle)) => Ok(Arc::clone(handle)),
			_ => Err(CoreError::SessionNotReady),
		}
	}

	pub fn status(&self) -> SessionStatus {
		let inner = self.inner.lock();
		SessionStatus {
			state: inner.state,
			pairing_image: inner.pairing_image.clone(),
			account_info: inner.account.clone(),
		}
	}

	fn spawn_event_loop(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>, epoch: u64) {
		let manager = Arc::clone(self);
		tokio::spawn(async move {
			while let Some(event) = events.recv().await {
				manager.handle_event(event, epoch);
			}
			debug!(target = "leadcast.session", epoch, "transport event channel closed");
		});
	}

	fn handle_event(self: &Arc<Self>, event: TransportEvent, epoch: u64) {
		let mut inner = self.inner.lock();
		if inner.epoch != epoch {
			debug!(target = "leadcast.session", epoch, "dropping event from superseded session");
			return;
		}

		match event {
			TransportEvent::PairingCode { png } => {
				info!(target = "leadcast.session", "pairing code received");
				inner.pairing_image = Some(format!("data:image/png;base64,{}", BASE64.encode(&png)));
				inner.state = SessionState::Connecting;
				inner.retry_count = 0;
			}
			TransportEvent::Authenticated => {
				info!(target = "leadcast.session", "authenticated");
				inner.state = SessionState::Authenticated;
			}
			TransportEvent::Ready { account } => {
				info!(
					target = "leadcast.session",
					wid = account.wid.as_deref().unwrap_or("-"),
					"session ready"
				);
				inner.state = SessionState::Ready;
				inner.account = Some(account);
				inner.pairing_image = None;
				inner.retry_count = 0;
			}
			TransportEvent::AuthFailure { message } => {
				warn!(target = "leadcast.session", %message, "authentication failed");
				inner.state = SessionState::Disconnected;
				inner.pairing_image = None;
			}
			TransportEvent::Disconnected { reason } => {
				warn!(target = "leadcast.session", %reason, "session disconnected");
				inner.state = SessionState::Disconnected;
				inner.pairing_image = None;
				inner.account = None;
				inner.handle = None;

				if inner.retry_count >= self.config.max_init_retries {
					error!(
						target = "leadcast.session",
						retries = inner.retry_count,
						"reconnect budget exhausted; operator intervention required"
					);
				} else {
					inner.retry_count += 1;
					self.schedule_reconnect();
				}
			}
		}
	}

	fn schedule_reconnect(self: &Arc<Self>) {
		let manager = Arc::clone(self);
		tokio::spawn(async move {
			manager.clock.sleep(manager.config.disconnect_cooldown).await;
			// Something else (an explicit connect, another disconnect cycle)
			// may have moved the session on while we slept.
			if manager.status().state != SessionState::Disconnected {
				return;
			}
			if let Err(err) = manager.initialize().await {
				error!(target = "leadcast.session", error = %err, "scheduled reinitialization failed");
			}
		});
	}

	#[cfg(test)]
	pub(crate) fn force_ready(&self, handle: Arc<dyn TransportHandle>) {
		let mut inner = self.inner.lock();
		inner.state = SessionState::Ready;
		inner.handle = Some(handle);
	}
}

fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
	let factor = 1u32 << attempt.min(16);
	cap.min(base.saturating_mul(factor))
}
