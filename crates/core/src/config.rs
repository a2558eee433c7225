use std::path::PathBuf;
use std::time::Duration;

/// Tunables for session supervision and dispatch pacing.
///
/// Environment variables override the operational limits; directories come
/// from the binary's flags. Message pacing is fixed: it exists to mimic a
/// human operator, not to be tuned per deployment.
#[derive(Debug, Clone)]
pub struct Config {
	pub data_dir: PathBuf,
	/// Directory the transport persists its credentials under; also the
	/// needle the process supervisor scans for.
	pub session_dir: PathBuf,
	pub max_per_window: u32,
	pub window: Duration,
	pub max_init_retries: u32,
	pub backoff_base: Duration,
	pub backoff_cap: Duration,
	pub disconnect_cooldown: Duration,
	pub message_delay: Duration,
	pub pace_delay_min: Duration,
	pub pace_delay_max: Duration,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			data_dir: PathBuf::from("data"),
			session_dir: PathBuf::from("data/session"),
			max_per_window: 10,
			window: Duration::from_secs(10 * 60),
			max_init_retries: 3,
			backoff_base: Duration::from_secs(5),
			backoff_cap: Duration::from_secs(30),
			disconnect_cooldown: Duration::from_secs(5),
			message_delay: Duration::from_secs(1),
			pace_delay_min: Duration::from_secs(5),
			pace_delay_max: Duration::from_secs(10),
		}
	}
}

impl Config {
	pub fn from_env(data_dir: PathBuf) -> Self {
		let defaults = Self::default();
		Self {
			session_dir: data_dir.join("session"),
			data_dir,
			max_per_window: env_parse("LEADCAST_MAX_PER_WINDOW", defaults.max_per_window),
			window: Duration::from_secs(env_parse("LEADCAST_WINDOW_MINUTES", 10u64) * 60),
			max_init_retries: env_parse("LEADCAST_MAX_INIT_RETRIES", defaults.max_init_retries),
			backoff_base: Duration::from_secs(env_parse("LEADCAST_BACKOFF_BASE_SECS", 5)),
			backoff_cap: Duration::from_secs(env_parse("LEADCAST_BACKOFF_CAP_SECS", 30)),
			disconnect_cooldown: Duration::from_secs(env_parse("LEADCAST_DISCONNECT_COOLDOWN_SECS", 5)),
			message_delay: defaults.message_delay,
			pace_delay_min: defaults.pace_delay_min,
			pace_delay_max: defaults.pace_delay_max,
		}
	}
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
	std::env::var(key).ok().and_then(|raw| raw.parse().ok()).unwrap_or(default)
}
