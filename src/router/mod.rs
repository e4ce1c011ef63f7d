mod federation;
mod response;
mod router;
mod serve;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use lattice_core::{Result, Server};
use lattice_service::Services;

pub use self::router::build;

/// Build and start the services over the database.
pub async fn start(server: &Arc<Server>) -> Result<Arc<Services>> {
	let services = Services::build(server.clone()).await?;
	services.start().await?;
	Ok(services)
}

/// Serve the federation surface until shutdown.
pub async fn run(services: &Arc<Services>) -> Result {
	serve::serve(services).await
}

/// Tear down the services.
pub async fn stop(services: Arc<Services>) -> Result {
	services.stop().await;
	Ok(())
}
