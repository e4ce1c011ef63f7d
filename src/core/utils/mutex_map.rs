use std::{collections::HashMap, hash::Hash, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map of Mutexes keyed by room (or any hashable key). Lock acquisition
/// queues the task rather than blocking the loop; waiters resume in FIFO
/// order.
pub struct MutexMap<Key, Val> {
	map: Mutex<HashMap<Key, Arc<Mutex<Val>>>>,
}

pub struct Guard<Key, Val> {
	map: Arc<Mutex<Val>>,
	_guard: OwnedMutexGuard<Val>,
	_key: std::marker::PhantomData<Key>,
}

impl<Key, Val> MutexMap<Key, Val>
where
	Key: Clone + Eq + Hash + Send,
	Val: Default + Send + 'static,
{
	#[must_use]
	pub fn new() -> Self {
		Self {
			map: Mutex::new(HashMap::new()),
		}
	}

	#[tracing::instrument(level = "trace", skip(self))]
	pub async fn lock<K>(&self, k: &K) -> Guard<Key, Val>
	where
		K: Eq + Hash + ToOwned<Owned = Key> + std::fmt::Debug + ?Sized,
		Key: std::borrow::Borrow<K>,
	{
		let val = self
			.map
			.lock()
			.await
			.entry(k.to_owned())
			.or_default()
			.clone();

		Guard::<Key, Val> {
			map: val.clone(),
			_guard: val.lock_owned().await,
			_key: std::marker::PhantomData,
		}
	}

	pub async fn contains(&self, k: &Key) -> bool { self.map.lock().await.contains_key(k) }

	pub async fn is_empty(&self) -> bool { self.map.lock().await.is_empty() }

	pub async fn len(&self) -> usize { self.map.lock().await.len() }
}

impl<Key, Val> Default for MutexMap<Key, Val>
where
	Key: Clone + Eq + Hash + Send,
	Val: Default + Send + 'static,
{
	fn default() -> Self { Self::new() }
}

impl<Key, Val> Guard<Key, Val> {
	/// Number of tasks waiting behind this guard, approximately.
	#[must_use]
	pub fn strong_count(&self) -> usize { Arc::strong_count(&self.map) }
}
