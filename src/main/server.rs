use std::sync::Arc;

use lattice_core::{Config, Result, info, log, runtime};
use lattice_service::Services;
use tokio::sync::Mutex;

use crate::{Args, args};

/// Server runtime state; complete
pub struct Server {
	/// Server runtime state; public portion
	pub server: Arc<lattice_core::Server>,

	pub services: Mutex<Option<Arc<Services>>>,
}

impl Server {
	pub fn new(args: Option<&Args>, runtime: Option<&runtime::Handle>) -> Result<Arc<Self>> {
		let args_default = args.is_none().then(Args::default);
		let args = args.unwrap_or_else(|| args_default.as_ref().expect("default arguments"));

		let raw = Config::load(args.config.as_deref())?;
		let raw = args::update(raw, args)?;
		let config = Config::new(&raw)?;

		log::init(&config)?;
		config.check()?;

		info!(
			server_name = %config.server_name,
			database_path = ?config.database_path,
			log_levels = %config.log,
			"lattice {}",
			env!("CARGO_PKG_VERSION"),
		);

		Ok(Arc::new(Self {
			server: Arc::new(lattice_core::Server::new(config, runtime.cloned())),
			services: None.into(),
		}))
	}
}
