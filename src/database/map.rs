use std::{fmt, sync::Arc};

use lattice_core::{Result, err};
use rocksdb::{Direction, IteratorMode};

use crate::Engine;

/// One named, ordered key/value column. Point reads hand off to the
/// blocking pool so the loop thread never stalls on disk; the calling
/// task suspends until the completion posts back.
pub struct Map {
	name: &'static str,
	engine: Arc<Engine>,
}

impl Map {
	pub(crate) fn open(engine: &Arc<Engine>, name: &'static str) -> Arc<Self> {
		Arc::new(Self { name, engine: engine.clone() })
	}

	#[inline]
	#[must_use]
	pub fn name(&self) -> &str { self.name }

	/// Point read. NotFound when the key has no value.
	pub async fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
		let engine = self.engine.clone();
		let name = self.name;
		let key = key.to_owned();

		tokio::task::spawn_blocking(move || get_blocking(&engine, name, &key)).await?
	}

	/// Same read without the pool handoff, for synchronous callers.
	pub fn get_sync(&self, key: &[u8]) -> Result<Vec<u8>> {
		get_blocking(&self.engine, self.name, key)
	}

	pub async fn exists(&self, key: &[u8]) -> bool { self.get(key).await.is_ok() }

	/// Batched point reads: one pool handoff for the whole row. Results
	/// arrive in key order.
	pub async fn multi_get(&self, keys: Vec<Vec<u8>>) -> Result<Vec<Option<Vec<u8>>>> {
		let engine = self.engine.clone();
		let name = self.name;

		tokio::task::spawn_blocking(move || {
			let cf = engine.cf(name);
			engine
				.db
				.multi_get_cf(keys.iter().map(|key| (&cf, key)))
				.into_iter()
				.map(|res| res.map_err(|e| err!(Database("multi_get in {name} failed: {e}"))))
				.collect()
		})
		.await?
	}

	/// Issue a read-ahead for keys expected to be fetched shortly. Fire
	/// and forget; errors surface on the later read.
	pub fn prefetch(&self, keys: Vec<Vec<u8>>) {
		let engine = self.engine.clone();
		let name = self.name;

		tokio::task::spawn_blocking(move || {
			let cf = engine.cf(name);
			for _ in engine
				.db
				.multi_get_cf(keys.iter().map(|key| (&cf, key)))
			{}
		});
	}

	/// Single-key write outside any admission batch.
	pub async fn put(&self, key: &[u8], val: &[u8]) -> Result {
		let engine = self.engine.clone();
		let name = self.name;
		let key = key.to_owned();
		let val = val.to_owned();

		tokio::task::spawn_blocking(move || {
			let cf = engine.cf(name);
			engine
				.db
				.put_cf(&cf, key, val)
				.map_err(|e| err!(Database("put in {name} failed: {e}")))
		})
		.await?
	}

	/// Forward iteration of every `(key, value)` under `prefix`, bounded
	/// by `limit`.
	pub async fn prefix(&self, prefix: Vec<u8>, limit: usize) -> Result<Vec<KeyVal>> {
		let engine = self.engine.clone();
		let name = self.name;

		tokio::task::spawn_blocking(move || {
			let cf = engine.cf(name);
			let mode = IteratorMode::From(&prefix, Direction::Forward);
			engine
				.db
				.iterator_cf(&cf, mode)
				.take_while(|item| match item {
					| Ok((key, _)) => key.starts_with(&prefix),
					| Err(_) => true,
				})
				.take(limit)
				.map(|item| {
					item.map(|(key, val)| (Vec::from(key), Vec::from(val)))
						.map_err(|e| err!(Database("iteration of {name} failed: {e}")))
				})
				.collect()
		})
		.await?
	}

	/// Reverse iteration under `prefix` starting at-or-before `from`,
	/// bounded by `limit`. Feeds the backward room walk of backfill.
	pub async fn rev_from(
		&self,
		prefix: Vec<u8>,
		from: Vec<u8>,
		limit: usize,
	) -> Result<Vec<KeyVal>> {
		let engine = self.engine.clone();
		let name = self.name;

		tokio::task::spawn_blocking(move || {
			let cf = engine.cf(name);
			let mut out = Vec::new();
			let mut it = engine.db.raw_iterator_cf(&cf);
			it.seek_for_prev(&from);
			while it.valid() && out.len() < limit {
				let Some((key, val)) = it.item() else { break };
				if !key.starts_with(&prefix) {
					break;
				}

				out.push((key.to_vec(), val.to_vec()));
				it.prev();
			}

			it.status()
				.map_err(|e| err!(Database("iteration of {name} failed: {e}")))?;

			Ok(out)
		})
		.await?
	}
}

pub type KeyVal = (Vec<u8>, Vec<u8>);

fn get_blocking(engine: &Engine, name: &'static str, key: &[u8]) -> Result<Vec<u8>> {
	let cf = engine.cf(name);
	engine
		.db
		.get_pinned_cf(&cf, key)
		.map_err(|e| err!(Database("get in {name} failed: {e}")))?
		.map(|slice| slice.to_vec())
		.ok_or_else(|| err!(NotFound("no value for key in {name}")))
}

impl fmt::Debug for Map {
	fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(out, "Map {{name: {0}}}", self.name)
	}
}

impl fmt::Display for Map {
	fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result { write!(out, "{0}", self.name) }
}
