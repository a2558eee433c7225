//! leadcast server: wires the store, rate limiter, session manager, and
//! dispatcher together and serves the HTTP surface.

mod logging;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use leadcast_core::{
	Config, Dispatcher, JsonStore, ProcessSupervisor, RateLimiter, SessionManager, SystemBackend,
	SystemClock,
};
use leadcast_transport::BridgeTransport;

use crate::routes::AppState;

#[derive(Debug, Parser)]
#[command(name = "leadcast", about = "Rate-limited outbound lead messaging service", version)]
struct Args {
	/// Port to listen on.
	#[arg(short, long, default_value_t = 3060)]
	port: u16,

	/// Directory holding the JSON data documents and the session directory.
	#[arg(long, default_value = "data")]
	data_dir: PathBuf,

	/// Driver program the transport bridge spawns.
	#[arg(long, default_value = "leadcast-driver")]
	driver: PathBuf,

	/// Increase log verbosity (-v, -vv).
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();
	logging::init_logging(args.verbose);

	let config = Config::from_env(args.data_dir);
	let clock = Arc::new(SystemClock);
	let store = Arc::new(JsonStore::new(config.data_dir.clone()).context("failed to create data directory")?);
	let limiter = Arc::new(RateLimiter::new(
		Arc::clone(&store),
		clock.clone(),
		config.max_per_window,
		config.window,
	));
	let transport = Arc::new(BridgeTransport::new(args.driver));
	let supervisor = ProcessSupervisor::new(Arc::new(SystemBackend), clock.clone());
	let session = Arc::new(SessionManager::new(transport, supervisor, clock.clone(), config.clone()));
	let dispatcher = Arc::new(Dispatcher::new(
		store,
		Arc::clone(&limiter),
		Arc::clone(&session),
		clock,
		config,
	));

	// Bring the session up in the background; pairing progress is polled
	// over HTTP.
	{
		let session = Arc::clone(&session);
		tokio::spawn(async move {
			if let Err(err) = session.initialize().await {
				error!(target = "leadcast.session", error = %err, "initial session bring-up failed");
			}
		});
	}

	let state = AppState {
		session: Arc::clone(&session),
		limiter,
		dispatcher,
	};
	let app = routes::router(state);

	let addr = format!("127.0.0.1:{}", args.port);
	let listener = TcpListener::bind(&addr)
		.await
		.with_context(|| format!("failed to bind {addr}"))?;
	info!(target = "leadcast.http", addr, "listening");

	let served = axum::serve(listener, app.into_make_service())
		.with_graceful_shutdown(shutdown_signal())
		.await;

	// Always release the driver and its browser worker before exiting,
	// whatever stopped the server.
	session.cleanup().await;

	served.context("server error")
}

async fn shutdown_signal() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{SignalKind, signal};

		let mut sigterm = signal(SignalKind::terminate()).ok();
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				info!(target = "leadcast.http", "received Ctrl+C, shutting down");
			}
			_ = async {
				match sigterm.as_mut() {
					Some(sig) => {
						sig.recv().await;
					}
					None => std::future::pending::<()>().await,
				}
			} => {
				info!(target = "leadcast.http", "received SIGTERM, shutting down");
			}
		}
	}

	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
		info!(target = "leadcast.http", "received Ctrl+C, shutting down");
	}
}
