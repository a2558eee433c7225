//! Persisted sliding-window admission control for outbound batches.
//!
//! The first reserved send opens a window of fixed duration; once
//! `max_per_window` sends have been reserved the window must fully elapse
//! before any more are admitted. Expiry is lazy: the stored document is only
//! reset when the next call observes that the window has passed. Counters
//! live in the store, so the window survives process restarts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::store::JsonStore;

/// Durable window counters; whole-document replaced on every reservation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateWindowDoc {
	pub leads_sent: u32,
	pub last_batch_time: Option<DateTime<Utc>>,
	pub window_start_time: Option<DateTime<Utc>>,
}

/// Read-only projection for callers and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
	pub max_per_window: u32,
	pub sent_in_window: u32,
	pub available: u32,
	pub can_send: bool,
	pub minutes_remaining: i64,
}

pub struct RateLimiter {
	store: Arc<JsonStore>,
	clock: Arc<dyn Clock>,
	max_per_window: u32,
	window_secs: i64,
	/// Serializes read-modify-write cycles across racing dispatch calls.
	guard: Mutex<()>,
}

impl RateLimiter {
	pub fn new(store: Arc<JsonStore>, clock: Arc<dyn Clock>, max_per_window: u32, window: Duration) -> Self {
		Self {
			store,
			clock,
			max_per_window,
			window_secs: window.as_secs() as i64,
			guard: Mutex::new(()),
		}
	}

	/// Admits `count` sends, opening a window on first use.
	///
	/// Slots are reserved for the whole batch before any send is attempted;
	/// later per-send failures are not refunded. Rejection mutates nothing.
	pub fn check_and_reserve(&self, count: u32) -> Result<RateLimitStatus> {
		let _guard = self.guard.lock();
		let now = self.clock.now();
		let mut doc = self.expire_if_elapsed(self.store.load_rate_window(), now);

		let available = self.max_per_window.saturating_sub(doc.leads_sent);
		if count > available {
			return Err(CoreError::RateLimited {
				max_per_window: self.max_per_window,
				available,
				minutes_remaining: self.minutes_remaining(&doc, now),
			});
		}

		if doc.leads_sent == 0 {
			doc.window_start_time = Some(now);
		}
		doc.leads_sent += count;
		doc.last_batch_time = Some(now);
		self.store.save_rate_window(&doc)?;

		info!(
			target = "leadcast.limiter",
			reserved = count,
			sent_in_window = doc.leads_sent,
			"reserved send slots"
		);
		Ok(self.project(&doc, now))
	}

	/// Lazy-expiry projection; never mutates persisted state.
	pub fn status(&self) -> RateLimitStatus {
		let now = self.clock.now();
		let doc = self.expire_if_elapsed(self.store.load_rate_window(), now);
		self.project(&doc, now)
	}

	fn expire_if_elapsed(&self, mut doc: RateWindowDoc, now: DateTime<Utc>) -> RateWindowDoc {
		if let Some(start) = doc.window_start_time {
			if now.signed_duration_since(start).num_seconds() >= self.window_secs {
				doc.leads_sent = 0;
				doc.window_start_time = None;
			}
		}
		doc
	}

	fn minutes_remaining(&self, doc: &RateWindowDoc, now: DateTime<Utc>) -> i64 {
		let Some(start) = doc.window_start_time else {
			return 0;
		};
		let remaining = self.window_secs - now.signed_duration_since(start).num_seconds();
		if remaining <= 0 { 0 } else { (remaining + 59) / 60 }
	}

	fn project(&self, doc: &RateWindowDoc, now: DateTime<Utc>) -> RateLimitStatus {
		let available = self.max_per_window.saturating_sub(doc.leads_sent);
		RateLimitStatus {
			max_per_window: self.max_per_window,
			sent_in_window: doc.leads_sent,
			available,
			can_send: available > 0,
			minutes_remaining: self.minutes_remaining(doc, now),
		}
	}
}
