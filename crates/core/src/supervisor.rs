//! Forced reclamation of worker processes that hold the session directory.
//!
//! When the transport reports a session-lock conflict, some earlier driver
//! (or its browser worker) is still alive and bound to the session path.
//! The supervisor finds those processes by command line and terminates them:
//! best-effort, idempotent, and bounded in time.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::Clock;

const KILL_SETTLE: Duration = Duration::from_secs(1);
const MAX_PASSES: usize = 2;

/// Platform seam: discovery and termination of candidate processes.
pub trait ProcessBackend: Send + Sync {
	/// Pids of processes whose command line references `session_path`.
	fn list_candidates(&self, session_path: &Path) -> Vec<u32>;

	fn kill(&self, pid: u32) -> std::io::Result<()>;
}

/// What one reclaim run accomplished.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimOutcome {
	pub killed: usize,
	pub survivors: usize,
}

pub struct ProcessSupervisor {
	backend: Arc<dyn ProcessBackend>,
	clock: Arc<dyn Clock>,
}

impl ProcessSupervisor {
	pub fn new(backend: Arc<dyn ProcessBackend>, clock: Arc<dyn Clock>) -> Self {
		Self { backend, clock }
	}

	/// Kills every process bound to `session_path`, verifies, and retries
	/// once. "Nothing to kill" is a normal outcome, not an error; survivors
	/// after the second pass are reported and left alone.
	pub async fn reclaim(&self, session_path: &Path) -> ReclaimOutcome {
		let mut outcome = ReclaimOutcome::default();
		let mut candidates = self.backend.list_candidates(session_path);
		if candidates.is_empty() {
			debug!(
				target = "leadcast.supervisor",
				path = %session_path.display(),
				"no processes hold the session directory"
			);
			return outcome;
		}

		for pass in 0..MAX_PASSES {
			for &pid in &candidates {
				match self.backend.kill(pid) {
					Ok(()) => {
						outcome.killed += 1;
						info!(target = "leadcast.supervisor", pid, pass, "killed session worker");
					}
					Err(err) => {
						warn!(target = "leadcast.supervisor", pid, error = %err, "kill failed");
					}
				}
			}

			self.clock.sleep(KILL_SETTLE).await;
			candidates = self.backend.list_candidates(session_path);
			if candidates.is_empty() {
				return outcome;
			}
		}

		outcome.survivors = candidates.len();
		warn!(
			target = "leadcast.supervisor",
			survivors = outcome.survivors,
			path = %session_path.display(),
			"session workers survived forced termination"
		);
		outcome
	}
}

/// Default backend: `/proc` command-line scan on unix, `wmic` on windows.
#[derive(Debug, Default)]
pub struct SystemBackend;

impl ProcessBackend for SystemBackend {
	fn list_candidates(&self, session_path: &Path) -> Vec<u32> {
		#[cfg(unix)]
		{
			unix_candidates(session_path)
		}

		#[cfg(windows)]
		{
			windows_candidates(session_path)
		}

		#[cfg(not(any(unix, windows)))]
		{
			let _ = session_path;
			Vec::new()
		}
	}

	fn kill(&self, pid: u32) -> std::io::Result<()> {
		#[cfg(unix)]
		{
			let status = std::process::Command::new("kill").arg("-9").arg(pid.to_string()).status()?;
			if status.success() {
				Ok(())
			} else {
				Err(std::io::Error::other(format!("kill exited with {status}")))
			}
		}

		#[cfg(windows)]
		{
			let status = std::process::Command::new("taskkill")
				.args(["/PID", &pid.to_string(), "/T", "/F"])
				.status()?;
			if status.success() {
				Ok(())
			} else {
				Err(std::io::Error::other(format!("taskkill exited with {status}")))
			}
		}

		#[cfg(not(any(unix, windows)))]
		{
			let _ = pid;
			Ok(())
		}
	}
}

#[cfg(unix)]
fn unix_candidates(session_path: &Path) -> Vec<u32> {
	let needle = session_path.to_string_lossy();
	let own_pid = std::process::id();
	let Ok(entries) = std::fs::read_dir("/proc") else {
		return Vec::new();
	};

	let mut pids = Vec::new();
	for entry in entries.flatten() {
		let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok()) else {
			continue;
		};
		if pid == own_pid {
			continue;
		}
		let Ok(cmdline) = std::fs::read(entry.path().join("cmdline")) else {
			continue;
		};
		let cmdline = String::from_utf8_lossy(&cmdline).replace('\0', " ");
		if cmdline.contains(needle.as_ref()) {
			pids.push(pid);
		}
	}
	pids
}

#[cfg(windows)]
fn windows_candidates(session_path: &Path) -> Vec<u32> {
	let needle = session_path.to_string_lossy().replace('\\', "\\\\");
	let Ok(output) = std::process::Command::new("wmic")
		.args([
			"process",
			"where",
			&format!("CommandLine like '%{needle}%'"),
			"get",
			"ProcessId",
			"/FORMAT:CSV",
		])
		.output()
	else {
		return Vec::new();
	};
	if !output.status.success() {
		return Vec::new();
	}

	let own_pid = std::process::id();
	String::from_utf8_lossy(&output.stdout)
		.lines()
		.filter_map(|line| line.trim().rsplit(',').next().and_then(|field| field.parse::<u32>().ok()))
		.filter(|&pid| pid != own_pid)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::{FakeBackend, ManualClock};

	#[tokio::test]
	async fn no_candidates_is_a_quiet_noop() {
		let backend = FakeBackend::empty();
		let clock = ManualClock::new();
		let supervisor = ProcessSupervisor::new(backend.clone(), clock.clone());

		let outcome = supervisor.reclaim(Path::new("/tmp/leadcast-session")).await;

		assert_eq!(outcome, ReclaimOutcome::default());
		assert!(backend.kills.lock().is_empty());
		// No candidates means no settle wait either.
		assert!(clock.slept().is_empty());
	}

	#[tokio::test]
	async fn kills_and_verifies_in_one_pass() {
		let backend = FakeBackend::with_pids(&[101, 102], &[]);
		let clock = ManualClock::new();
		let supervisor = ProcessSupervisor::new(backend.clone(), clock.clone());

		let outcome = supervisor.reclaim(Path::new("/tmp/leadcast-session")).await;

		assert_eq!(outcome.killed, 2);
		assert_eq!(outcome.survivors, 0);
		assert_eq!(*backend.kills.lock(), vec![101, 102]);
		assert_eq!(clock.slept().len(), 1);
	}

	#[tokio::test]
	async fn stubborn_processes_get_exactly_one_retry_pass() {
		let backend = FakeBackend::with_pids(&[200, 201], &[201]);
		let clock = ManualClock::new();
		let supervisor = ProcessSupervisor::new(backend.clone(), clock.clone());

		let outcome = supervisor.reclaim(Path::new("/tmp/leadcast-session")).await;

		// Pass one kills both, pass two re-kills the survivor, then we stop.
		assert_eq!(*backend.kills.lock(), vec![200, 201, 201]);
		assert_eq!(outcome.survivors, 1);
		assert_eq!(clock.slept().len(), 2);
	}
}
