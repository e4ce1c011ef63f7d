pub mod args;
pub mod server;
pub mod signals;

use std::sync::Arc;

use lattice_core::{Result, debug_info, error, runtime, runtime::Runtime};

pub use self::server::Server;

/// Start, run and stop the server within the runtime, then tear the
/// runtime down.
pub fn exec(server: &Arc<Server>, runtime: Runtime) -> Result {
	runtime.spawn(signals::enable(server.clone()));
	runtime.block_on(async_exec(server))?;
	runtime::shutdown(&server.server, runtime)
}

#[tracing::instrument(name = "main", parent = None, skip_all)]
pub async fn async_exec(server: &Arc<Server>) -> Result {
	async_start(server).await?;
	async_run(server).await?;
	async_stop(server).await?;

	debug_info!("Exit runtime");
	Ok(())
}

#[tracing::instrument(name = "start", skip_all)]
pub async fn async_start(server: &Arc<Server>) -> Result {
	match lattice_router::start(&server.server).await {
		| Ok(services) => {
			server.services.lock().await.replace(services);
			Ok(())
		},
		| Err(error) => {
			error!("Critical error starting server: {error}");
			Err(error)
		},
	}
}

pub async fn async_run(server: &Arc<Server>) -> Result {
	let services = server
		.services
		.lock()
		.await
		.clone()
		.expect("services initialized");

	if let Err(error) = lattice_router::run(&services).await {
		error!("Critical error running server: {error}");
		return Err(error);
	}

	Ok(())
}

#[tracing::instrument(name = "stop", skip_all)]
pub async fn async_stop(server: &Arc<Server>) -> Result {
	let services = server
		.services
		.lock()
		.await
		.take()
		.expect("services initialized");

	if let Err(error) = lattice_router::stop(services).await {
		error!("Critical error stopping server: {error}");
		return Err(error);
	}

	Ok(())
}
