use std::sync::Arc;

use lattice_core::{info, warn};

use crate::Server;

#[cfg(unix)]
pub async fn enable(server: Arc<Server>) {
	use tokio::signal::unix::{SignalKind, signal};

	let mut term = signal(SignalKind::terminate()).expect("SIGTERM handler");
	let mut int = signal(SignalKind::interrupt()).expect("SIGINT handler");

	let sig = tokio::select! {
		_ = term.recv() => "SIGTERM",
		_ = int.recv() => "SIGINT",
	};

	info!("Received {sig}");
	if let Err(e) = server.server.shutdown() {
		warn!("shutdown: {e}");
	}
}

#[cfg(not(unix))]
pub async fn enable(server: Arc<Server>) {
	_ = tokio::signal::ctrl_c().await;

	info!("Received Ctrl+C");
	if let Err(e) = server.server.shutdown() {
		warn!("shutdown: {e}");
	}
}
