use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Time source and delay primitive.
///
/// Every suspension the core performs (inter-message pacing, retry backoff,
/// window waits) goes through this trait so behavior is assertable without
/// real waits.
#[async_trait]
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
	async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}

	async fn sleep(&self, duration: Duration) {
		tokio::time::sleep(duration).await;
	}
}
