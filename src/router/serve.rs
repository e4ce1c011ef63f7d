use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{Handle as ServerHandle, bind};
use lattice_core::{Result, debug_info, err, info};
use lattice_service::Services;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub(super) async fn serve(services: &Arc<Services>) -> Result {
	let config = &services.server.config;
	let addr = SocketAddr::new(config.address, config.port);

	let handle = ServerHandle::new();
	tokio::spawn(graceful_shutdown(services.clone(), handle.clone()));

	let router = super::build(services).into_make_service_with_connect_info::<SocketAddr>();

	info!("Listening on {addr}");
	bind(addr)
		.handle(handle)
		.serve(router)
		.await
		.map_err(|e| err!(Err("listener failed: {e}")))?;

	debug_info!("Stopped listening on {addr}");
	Ok(())
}

async fn graceful_shutdown(services: Arc<Services>, handle: ServerHandle) {
	services.server.until_shutdown().await;
	handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
