use std::sync::Arc;

use lattice_core::{Result, Server, debug, debug_info, info};
use lattice_database::Database;

use crate::{config, federation, globals, rooms, server_keys};

/// All services of the server, built in dependency order over one
/// database. The loop and the store are collaborators passed in; nothing
/// here is process-global.
pub struct Services {
	pub server: Arc<Server>,
	pub db: Arc<Database>,
	pub globals: Arc<globals::Service>,
	pub server_keys: Arc<server_keys::Service>,
	pub index: Arc<rooms::index::Service>,
	pub events: Arc<rooms::events::Service>,
	pub state: Arc<rooms::state::Service>,
	pub timeline: Arc<rooms::timeline::Service>,
	pub eval: Arc<rooms::eval::Service>,
	pub federation: Arc<federation::Service>,
	pub config: Arc<config::Service>,
}

impl Services {
	pub async fn build(server: Arc<Server>) -> Result<Arc<Self>> {
		let db = Database::open(&server).await?;

		let globals = globals::Service::build(&server, &db).await?;
		let server_keys = server_keys::Service::build(&server, &db).await?;
		let index = rooms::index::Service::build(&db)?;
		let events = rooms::events::Service::build(&db)?;
		let state = rooms::state::Service::build(&db, &index, &events)?;
		let timeline = rooms::timeline::Service::build(&db)?;
		let eval = rooms::eval::Service::build(
			&server,
			&db,
			&globals,
			&server_keys,
			&index,
			&events,
			&state,
			&timeline,
		)?;
		let federation = federation::Service::build(&server, &state)?;
		let config = config::Service::build(
			&server,
			&globals,
			&server_keys,
			&events,
			&state,
			&timeline,
			&eval,
		)?;

		Ok(Arc::new(Self {
			server,
			db,
			globals,
			server_keys,
			index,
			events,
			state,
			timeline,
			eval,
			federation,
			config,
		}))
	}

	/// Late startup: publish our verify key, then reconcile the conf
	/// room. Ordered so every admission the reconcile performs can
	/// verify its signature through the key store path.
	pub async fn start(self: &Arc<Self>) -> Result {
		debug!("Starting services...");

		self.server_keys.publish_own_key().await?;
		self.config.start().await?;

		info!("Services started");
		Ok(())
	}

	pub async fn stop(&self) {
		debug!("Stopping services...");

		if let Err(e) = self.db.engine.flush() {
			lattice_core::error!("final flush failed: {e}");
		}

		debug_info!("Services stopped");
	}
}
