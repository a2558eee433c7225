//! Shared fakes for exercising lifecycle and dispatch logic without a real
//! transport, clock, or process table.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use leadcast_transport::{Transport, TransportError, TransportEvent, TransportHandle};

use crate::clock::Clock;
use crate::supervisor::ProcessBackend;

/// Lets spawned event-loop work run on the current-thread test runtime.
pub(crate) async fn settle() {
	tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Deterministic clock: `sleep` records the request, advances `now`, and
/// returns immediately.
pub(crate) struct ManualClock {
	now: Mutex<DateTime<Utc>>,
	slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
	pub fn new() -> Arc<Self> {
		Self::at(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap())
	}

	pub fn at(now: DateTime<Utc>) -> Arc<Self> {
		Arc::new(Self {
			now: Mutex::new(now),
			slept: Mutex::new(Vec::new()),
		})
	}

	pub fn advance(&self, duration: Duration) {
		let mut now = self.now.lock();
		*now += chrono::Duration::from_std(duration).unwrap();
	}

	pub fn slept(&self) -> Vec<Duration> {
		self.slept.lock().clone()
	}
}

#[async_trait]
impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock()
	}

	async fn sleep(&self, duration: Duration) {
		self.slept.lock().push(duration);
		self.advance(duration);
	}
}

/// Transport handle that records every send and can fail on demand.
pub(crate) struct FakeHandle {
	sent: Mutex<Vec<(String, String)>>,
	fail_chats: Mutex<HashMap<String, TransportError>>,
	destroy_error: Mutex<Option<TransportError>>,
	logouts: AtomicU32,
	destroys: AtomicU32,
	registered: AtomicBool,
}

impl FakeHandle {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			sent: Mutex::new(Vec::new()),
			fail_chats: Mutex::new(HashMap::new()),
			destroy_error: Mutex::new(None),
			logouts: AtomicU32::new(0),
			destroys: AtomicU32::new(0),
			registered: AtomicBool::new(true),
		})
	}

	pub fn set_registered(&self, value: bool) {
		self.registered.store(value, Ordering::Relaxed);
	}

	/// Makes the next send to `chat_id` fail with `err`.
	pub fn fail_chat(&self, chat_id: &str, err: TransportError) {
		self.fail_chats.lock().insert(chat_id.to_string(), err);
	}

	pub fn fail_destroy(&self, err: TransportError) {
		*self.destroy_error.lock() = Some(err);
	}

	pub fn sent(&self) -> Vec<(String, String)> {
		self.sent.lock().clone()
	}

	pub fn bodies_for(&self, chat_id: &str) -> Vec<String> {
		self.sent
			.lock()
			.iter()
			.filter(|(chat, _)| chat == chat_id)
			.map(|(_, body)| body.clone())
			.collect()
	}

	pub fn logouts(&self) -> u32 {
		self.logouts.load(Ordering::Relaxed)
	}

	pub fn destroys(&self) -> u32 {
		self.destroys.load(Ordering::Relaxed)
	}
}

#[async_trait]
impl TransportHandle for FakeHandle {
	async fn send_message(&self, chat_id: &str, body: &str) -> Result<(), TransportError> {
		if let Some(err) = self.fail_chats.lock().remove(chat_id) {
			return Err(err);
		}
		self.sent.lock().push((chat_id.to_string(), body.to_string()));
		Ok(())
	}

	async fn is_registered(&self, _chat_id: &str) -> Result<bool, TransportError> {
		Ok(self.registered.load(Ordering::Relaxed))
	}

	async fn logout(&self) -> Result<(), TransportError> {
		self.logouts.fetch_add(1, Ordering::Relaxed);
		Ok(())
	}

	async fn destroy(&self) -> Result<(), TransportError> {
		self.destroys.fetch_add(1, Ordering::Relaxed);
		match self.destroy_error.lock().take() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

/// Transport whose opens fail from a scripted queue before succeeding, and
/// whose event sender is captured so tests can emit lifecycle events.
pub(crate) struct FakeTransport {
	failures: Mutex<VecDeque<TransportError>>,
	opens: AtomicU32,
	open_delay: Option<Duration>,
	pub handle: Arc<FakeHandle>,
	events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
}

impl FakeTransport {
	pub fn ready() -> Arc<Self> {
		Self::build(VecDeque::new(), None)
	}

	pub fn failing_with(errors: impl IntoIterator<Item = TransportError>) -> Arc<Self> {
		Self::build(errors.into_iter().collect(), None)
	}

	pub fn slow(delay: Duration) -> Arc<Self> {
		Self::build(VecDeque::new(), Some(delay))
	}

	fn build(failures: VecDeque<TransportError>, open_delay: Option<Duration>) -> Arc<Self> {
		Arc::new(Self {
			failures: Mutex::new(failures),
			opens: AtomicU32::new(0),
			open_delay,
			handle: FakeHandle::new(),
			events: Mutex::new(None),
		})
	}

	pub fn opens(&self) -> u32 {
		self.opens.load(Ordering::SeqCst)
	}

	/// Emits an event into the most recently opened session.
	pub fn emit(&self, event: TransportEvent) {
		let sender = self.events.lock().clone().expect("no session opened yet");
		sender.send(event).expect("event loop gone");
	}
}

#[async_trait]
impl Transport for FakeTransport {
	async fn open(
		&self,
		_session_dir: &Path,
		events: mpsc::UnboundedSender<TransportEvent>,
	) -> Result<Arc<dyn TransportHandle>, TransportError> {
		self.opens.fetch_add(1, Ordering::SeqCst);
		if let Some(delay) = self.open_delay {
			tokio::time::sleep(delay).await;
		}
		if let Some(err) = self.failures.lock().pop_front() {
			return Err(err);
		}
		*self.events.lock() = Some(events);
		Ok(Arc::clone(&self.handle) as Arc<dyn TransportHandle>)
	}
}

/// Process-table fake: pids in `stubborn` survive every kill.
pub(crate) struct FakeBackend {
	alive: Mutex<Vec<u32>>,
	stubborn: Vec<u32>,
	scans: AtomicU32,
	pub kills: Mutex<Vec<u32>>,
}

impl FakeBackend {
	pub fn empty() -> Arc<Self> {
		Self::with_pids(&[], &[])
	}

	pub fn with_pids(pids: &[u32], stubborn: &[u32]) -> Arc<Self> {
		Arc::new(Self {
			alive: Mutex::new(pids.to_vec()),
			stubborn: stubborn.to_vec(),
			scans: AtomicU32::new(0),
			kills: Mutex::new(Vec::new()),
		})
	}

	pub fn scans(&self) -> u32 {
		self.scans.load(Ordering::Relaxed)
	}
}

impl ProcessBackend for FakeBackend {
	fn list_candidates(&self, _session_path: &Path) -> Vec<u32> {
		self.scans.fetch_add(1, Ordering::Relaxed);
		self.alive.lock().clone()
	}

	fn kill(&self, pid: u32) -> std::io::Result<()> {
		self.kills.lock().push(pid);
		if !self.stubborn.contains(&pid) {
			self.alive.lock().retain(|&alive| alive != pid);
		}
		Ok(())
	}
}
