use thiserror::Error;

use leadcast_transport::TransportError;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
	/// Dispatch attempted while the session is not in the ready state.
	#[error("messaging session is not ready")]
	SessionNotReady,

	/// Admission denied; carries what the caller needs to schedule a retry.
	#[error("rate limit reached: {available} slot(s) available, window resets in {minutes_remaining} minute(s)")]
	RateLimited {
		max_per_window: u32,
		available: u32,
		minutes_remaining: i64,
	},

	#[error("lead batch is empty")]
	EmptyBatch,

	#[error("lead batch exceeds {max} leads per window")]
	BatchTooLarge { max: u32 },

	/// Session initialization gave up after the retry budget; requires
	/// operator intervention.
	#[error("session initialization failed after {attempts} attempt(s)")]
	InitRetriesExhausted { attempts: u32 },

	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}
