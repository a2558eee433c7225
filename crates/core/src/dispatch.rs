//! Rate-limited batch dispatch of templated outreach messages.
//!
//! A batch runs to completion over its lead list: admission is reserved up
//! front for the whole batch, every lead gets an individual outcome, and a
//! single failure never aborts the siblings. Pacing delays between messages
//! and between lead pairs keep the send pattern human-shaped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use leadcast_transport::TransportError;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::phone;
use crate::ratelimit::{RateLimitStatus, RateLimiter};
use crate::session::SessionManager;
use crate::store::JsonStore;
use crate::types::{Lead, MessagePair, MessageTemplate};

/// A randomized pause follows every PACE_EVERY processed leads except the
/// last.
const PACE_EVERY: usize = 2;

/// Business hours are evaluated in the operator's locale (UTC+05:30).
const LOCAL_UTC_OFFSET_SECS: i64 = 5 * 3600 + 1800;

/// Homepage URLs on these domains do not count as a usable website.
const SOCIAL_DOMAINS: &[&str] = &[
	"facebook.com",
	"fb.com",
	"linkedin.com",
	"instagram.com",
	"twitter.com",
	"x.com",
	"youtube.com",
	"tiktok.com",
	"pinterest.com",
	"snapchat.com",
	"whatsapp.com",
	"telegram.org",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
	Success,
	Skipped,
	Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
	Type1,
	Type2,
}

/// Per-lead dispatch result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadOutcome {
	pub lead_id: String,
	pub status: OutcomeStatus,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub phone_number: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message_type: Option<MessageType>,
}

impl LeadOutcome {
	fn error(lead_id: &str, message: &str) -> Self {
		Self {
			lead_id: lead_id.to_string(),
			status: OutcomeStatus::Error,
			message: message.to_string(),
			phone_number: None,
			message_type: None,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
	pub total: usize,
	pub success: usize,
	pub skipped: usize,
	pub failed: usize,
}

/// Full result of one `send_batch` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReport {
	pub results: Vec<LeadOutcome>,
	pub summary: BatchSummary,
	pub rate_limit: RateLimitStatus,
}

pub struct Dispatcher {
	store: Arc<JsonStore>,
	limiter: Arc<RateLimiter>,
	session: Arc<SessionManager>,
	clock: Arc<dyn Clock>,
	config: Config,
}

impl Dispatcher {
	pub fn new(
		store: Arc<JsonStore>,
		limiter: Arc<RateLimiter>,
		session: Arc<SessionManager>,
		clock: Arc<dyn Clock>,
		config: Config,
	) -> Self {
		Self {
			store,
			limiter,
			session,
			clock,
			config,
		}
	}

	/// Sends the templated sequences to each lead, in the given order.
	///
	/// Admission is reserved for the whole batch before the readiness check,
	/// so a not-ready rejection does not refund the reserved slots. Per-lead
	/// failures are recorded in the result list and never abort the
	/// remainder; lead mutations persist once, at the end of the loop.
	pub async fn send_batch(&self, lead_ids: &[String]) -> Result<SendReport> {
		if lead_ids.is_empty() {
			return Err(CoreError::EmptyBatch);
		}
		if lead_ids.len() > self.config.max_per_window as usize {
			return Err(CoreError::BatchTooLarge { max: self.config.max_per_window });
		}

		self.limiter.check_and_reserve(lead_ids.len() as u32)?;
		self.session.ready_handle()?;

		let mut leads = self.store.load_leads();
		let templates = self.store.load_templates();
		let greeting = greeting_at(self.clock.now());

		let total = lead_ids.len();
		let mut results = Vec::with_capacity(total);
		for (index, lead_id) in lead_ids.iter().enumerate() {
			let outcome = self.dispatch_one(lead_id, &mut leads, &templates, greeting).await;
			results.push(outcome);

			let processed = index + 1;
			if processed % PACE_EVERY == 0 && processed < total {
				let pause = self.pace_delay();
				debug!(
					target = "leadcast.dispatch",
					pause_ms = pause.as_millis() as u64,
					"pacing pause between lead pairs"
				);
				self.clock.sleep(pause).await;
			}
		}

		self.store.save_leads(&leads)?;

		let summary = summarize(&results);
		info!(
			target = "leadcast.dispatch",
			total = summary.total,
			success = summary.success,
			skipped = summary.skipped,
			failed = summary.failed,
			"batch completed"
		);
		Ok(SendReport {
			results,
			summary,
			rate_limit: self.limiter.status(),
		})
	}

	/// Re-runs `send_batch` over a backlog in admissible chunks.
	///
	/// When the limiter is exhausted the drain waits out the full window
	/// before the next chunk. A not-ready session (or any other structural
	/// failure) stops the drain with the remainder unprocessed.
	pub async fn drain_backlog(&self, lead_ids: Vec<String>) -> Vec<LeadOutcome> {
		let mut pending: VecDeque<String> = lead_ids.into();
		let mut outcomes = Vec::new();

		while !pending.is_empty() {
			let status = self.limiter.status();
			if status.available == 0 {
				info!(
					target = "leadcast.dispatch",
					minutes = status.minutes_remaining,
					backlog = pending.len(),
					"window exhausted, waiting for reset"
				);
				self.clock.sleep(self.config.window).await;
				continue;
			}

			let take = (status.available as usize)
				.min(self.config.max_per_window as usize)
				.min(pending.len());
			let chunk: Vec<String> = pending.drain(..take).collect();

			match self.send_batch(&chunk).await {
				Ok(report) => outcomes.extend(report.results),
				Err(CoreError::RateLimited { .. }) => {
					// Lost the race for the remaining slots; requeue and wait.
					for id in chunk.into_iter().rev() {
						pending.push_front(id);
					}
					self.clock.sleep(self.config.window).await;
				}
				Err(err) => {
					warn!(
						target = "leadcast.dispatch",
						error = %err,
						backlog = pending.len() + chunk.len(),
						"backlog drain stopped"
					);
					break;
				}
			}
		}

		outcomes
	}

	async fn dispatch_one(
		&self,
		lead_id: &str,
		leads: &mut [Lead],
		templates: &[MessageTemplate],
		greeting: &str,
	) -> LeadOutcome {
		let Some(lead) = leads.iter_mut().find(|lead| lead.lead_id == lead_id) else {
			return LeadOutcome::error(lead_id, "Lead not found");
		};

		// Idempotence guard: never re-message a contact.
		if lead.message_sent || lead.reached {
			return LeadOutcome {
				lead_id: lead.lead_id.clone(),
				status: OutcomeStatus::Skipped,
				message: "Messages already sent to this number".to_string(),
				phone_number: Some(lead.contact_number.clone()),
				message_type: None,
			};
		}

		let Some(template) = templates.iter().find(|template| template.category == lead.category) else {
			return LeadOutcome::error(lead_id, "No messages found for category");
		};

		let Some(chat_id) = phone::chat_id(&lead.contact_number) else {
			return LeadOutcome::error(lead_id, "No contact number");
		};

		let message_type = if has_usable_website(&lead.website) {
			MessageType::Type1
		} else {
			MessageType::Type2
		};
		let pair = match message_type {
			MessageType::Type1 => &template.type1,
			MessageType::Type2 => &template.type2,
		};

		match self.send_sequence(&chat_id, greeting, pair).await {
			Ok(()) => {
				let now = self.clock.now();
				lead.reached = true;
				lead.reached_date = Some(now);
				lead.message_sent = true;
				lead.message_sent_date = Some(now);
				LeadOutcome {
					lead_id: lead.lead_id.clone(),
					status: OutcomeStatus::Success,
					message: "Messages sent successfully".to_string(),
					phone_number: Some(lead.contact_number.clone()),
					message_type: Some(message_type),
				}
			}
			Err(err) => {
				warn!(target = "leadcast.dispatch", lead_id, error = %err, "send failed");
				LeadOutcome {
					lead_id: lead.lead_id.clone(),
					status: OutcomeStatus::Error,
					message: classify_send_error(&err),
					phone_number: Some(lead.contact_number.clone()),
					message_type: None,
				}
			}
		}
	}

	/// Greeting first, then the two-message variant for the lead's audience,
	/// each send separated by the fixed inter-message delay. The handle is
	/// re-acquired per message so a mid-sequence disconnect surfaces as a
	/// send error instead of hitting a dead handle.
	async fn send_sequence(&self, chat_id: &str, greeting: &str, pair: &MessagePair) -> Result<()> {
		let handle = self.session.ready_handle()?;

		// Advisory pre-check: the send attempt itself is authoritative.
		match handle.is_registered(chat_id).await {
			Ok(true) => {}
			Ok(false) => {
				warn!(target = "leadcast.dispatch", chat_id, "recipient may not be registered")
			}
			Err(err) => {
				debug!(target = "leadcast.dispatch", chat_id, error = %err, "registration pre-check failed")
			}
		}

		handle.send_message(chat_id, &format!("Hi {greeting}")).await?;
		self.clock.sleep(self.config.message_delay).await;
		self.session.ready_handle()?.send_message(chat_id, &pair.message1).await?;
		self.clock.sleep(self.config.message_delay).await;
		self.session.ready_handle()?.send_message(chat_id, &pair.message2).await?;
		Ok(())
	}

	fn pace_delay(&self) -> Duration {
		let min = self.config.pace_delay_min;
		let max = self.config.pace_delay_max;
		if max <= min {
			return min;
		}
		let span = (max - min).as_millis() as u64;
		min + Duration::from_millis(rand::thread_rng().gen_range(0..=span))
	}
}

fn summarize(results: &[LeadOutcome]) -> BatchSummary {
	let mut summary = BatchSummary {
		total: results.len(),
		..BatchSummary::default()
	};
	for outcome in results {
		match outcome.status {
			OutcomeStatus::Success => summary.success += 1,
			OutcomeStatus::Skipped => summary.skipped += 1,
			OutcomeStatus::Error => summary.failed += 1,
		}
	}
	summary
}

fn classify_send_error(err: &CoreError) -> String {
	match err {
		CoreError::SessionNotReady => "Messaging session is not ready".to_string(),
		CoreError::Transport(TransportError::NotRegistered) => {
			"Number is not registered on the messaging service".to_string()
		}
		CoreError::Transport(TransportError::InvalidRecipient(_)) => "Invalid phone number".to_string(),
		CoreError::Transport(TransportError::NotFound) => "Contact not found".to_string(),
		other => other.to_string(),
	}
}

fn greeting_at(now: DateTime<Utc>) -> &'static str {
	let hour = (now.timestamp() + LOCAL_UTC_OFFSET_SECS).rem_euclid(86_400) / 3600;
	match hour {
		5..=11 => "Good Morning",
		12..=16 => "Good Afternoon",
		17..=20 => "Good Evening",
		_ => "Good Night",
	}
}

fn has_usable_website(website: &str) -> bool {
	let url = website.trim().to_ascii_lowercase();
	!url.is_empty() && !SOCIAL_DOMAINS.iter().any(|domain| url.contains(domain))
}
