use std::sync::Arc;

use lattice_core::Result;
use rocksdb::WriteBatch;

use crate::{Engine, Map};

/// Atomic multi-column write. Stages cells against any set of maps, then
/// commits in one engine write: readers observe either none or all of
/// the batch. Dropping an uncommitted batch discards it.
pub struct Batch {
	engine: Arc<Engine>,
	batch: WriteBatch,
	ops: usize,
}

impl Batch {
	pub(crate) fn new(engine: Arc<Engine>) -> Self {
		Self {
			engine,
			batch: WriteBatch::default(),
			ops: 0,
		}
	}

	pub fn put(&mut self, map: &Map, key: &[u8], val: &[u8]) {
		let cf = self.engine.cf(map.name());
		self.batch.put_cf(&cf, key, val);
		self.ops = self.ops.saturating_add(1);
	}

	pub fn delete(&mut self, map: &Map, key: &[u8]) {
		let cf = self.engine.cf(map.name());
		self.batch.delete_cf(&cf, key);
		self.ops = self.ops.saturating_add(1);
	}

	#[inline]
	#[must_use]
	pub fn len(&self) -> usize { self.ops }

	#[inline]
	#[must_use]
	pub fn is_empty(&self) -> bool { self.ops == 0 }

	#[tracing::instrument(level = "debug", skip(self), fields(ops = self.ops))]
	pub async fn commit(self) -> Result {
		let Self { engine, batch, .. } = self;
		tokio::task::spawn_blocking(move || engine.write(batch)).await?
	}
}
