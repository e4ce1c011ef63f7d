use std::{path::Path, sync::Arc};

use lattice_core::{Result, config::Manager, debug, err, info};
use rocksdb::{
	BoundColumnFamily, Cache, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
	WriteBatch,
};

pub(crate) type Db = DBWithThreadMode<MultiThreaded>;

/// Owns the RocksDB instance and the shared block cache. Columns are
/// addressed by name through [`Engine::cf`]; handles are never held
/// across suspension points.
pub struct Engine {
	pub(crate) db: Db,
	_row_cache: Cache,
}

impl Engine {
	pub(crate) fn open(config: &Manager, maps: &[&'static str]) -> Result<Arc<Self>> {
		let path = &config.database_path;

		#[allow(clippy::as_conversions)]
		let cache_bytes = (config.db_cache_capacity_mb * 1024.0 * 1024.0) as usize;
		let row_cache = Cache::new_lru_cache(cache_bytes);

		let mut opts = Options::default();
		opts.create_if_missing(true);
		opts.create_missing_column_families(true);
		opts.set_row_cache(&row_cache);

		let cfs = existing_columns(&opts, path);
		let descriptors = maps
			.iter()
			.map(|name| (*name).to_owned())
			.chain(cfs.into_iter().filter(|cf| !maps.contains(&cf.as_str())))
			.map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

		let db = Db::open_cf_descriptors(&opts, path, descriptors)
			.map_err(|e| err!(Database("failed to open database at {path:?}: {e}")))?;

		info!(?path, columns = maps.len(), "Database opened");

		Ok(Arc::new(Self { db, _row_cache: row_cache }))
	}

	/// Column handle by name. The handle borrows the engine; take it
	/// fresh in every operation.
	pub(crate) fn cf(&self, name: &str) -> Arc<BoundColumnFamily<'_>> {
		self.db
			.cf_handle(name)
			.expect("column family opened at database start")
	}

	pub(crate) fn write(&self, batch: WriteBatch) -> Result {
		self.db
			.write(batch)
			.map_err(|e| err!(Database("write batch failed: {e}")))
	}

	pub fn flush(&self) -> Result {
		self.db
			.flush()
			.map_err(|e| err!(Database("flush failed: {e}")))
	}
}

fn existing_columns(opts: &Options, path: &Path) -> Vec<String> {
	Db::list_cf(opts, path)
		.inspect_err(|e| debug!("assuming new database: {e}"))
		.unwrap_or_default()
}

impl Drop for Engine {
	fn drop(&mut self) {
		_ = self.db.flush();
		debug!("Database closed");
	}
}
