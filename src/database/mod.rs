mod batch;
mod engine;
mod map;
pub mod maps;

use std::{collections::BTreeMap, ops::Index, sync::Arc};

use lattice_core::{Result, Server, err};

pub use self::{batch::Batch, engine::Engine, map::Map};

pub struct Database {
	maps: BTreeMap<&'static str, Arc<Map>>,
	pub engine: Arc<Engine>,
}

impl Database {
	/// Load an existing database or create a new one.
	pub async fn open(server: &Arc<Server>) -> Result<Arc<Self>> {
		let engine = Engine::open(&server.config, maps::MAPS)?;
		Ok(Arc::new(Self {
			maps: maps::open(&engine),
			engine,
		}))
	}

	#[inline]
	pub fn get(&self, name: &str) -> Result<&Arc<Map>> {
		self.maps
			.get(name)
			.ok_or_else(|| err!(NotFound("column {name} not found")))
	}

	/// Start an atomic write batch across any set of columns.
	#[inline]
	#[must_use]
	pub fn batch(&self) -> Batch { Batch::new(self.engine.clone()) }

	#[inline]
	pub fn keys(&self) -> impl Iterator<Item = &&'static str> + Send + '_ { self.maps.keys() }
}

impl Index<&str> for Database {
	type Output = Arc<Map>;

	fn index(&self, name: &str) -> &Self::Output {
		self.maps
			.get(name)
			.expect("column in database does not exist")
	}
}
