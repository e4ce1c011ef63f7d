use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

use lattice_core::{EventIdx, Result, Server, implement, utils::bytes};
use lattice_database::{Database, Map};

/// Global counters and identity helpers. The event_idx counter lives
/// here: monotonic, never reused, persisted inside every admission
/// batch.
pub struct Service {
	server: Arc<Server>,
	db: Data,
	event_idx: AtomicU64,
}

struct Data {
	global: Arc<Map>,
}

pub const COUNTER_KEY: &[u8] = b"event_idx_counter";

impl Service {
	pub(crate) async fn build(server: &Arc<Server>, db: &Arc<Database>) -> Result<Arc<Self>> {
		let global = db["global"].clone();

		let last = match global.get(COUNTER_KEY).await {
			| Ok(val) => bytes::u64_from_le(&val)?,
			| Err(e) if e.is_not_found() => 0,
			| Err(e) => return Err(e),
		};

		Ok(Arc::new(Self {
			server: server.clone(),
			db: Data { global },
			event_idx: AtomicU64::new(last),
		}))
	}
}

/// Allocate the next event_idx. The caller persists [`COUNTER_KEY`] in
/// the same batch as the admission so a restart resumes past every
/// assigned index.
#[implement(Service)]
#[must_use]
pub fn next_event_idx(&self) -> EventIdx {
	self.event_idx
		.fetch_add(1, Ordering::AcqRel)
		.saturating_add(1)
}

#[implement(Service)]
#[must_use]
pub fn current_event_idx(&self) -> EventIdx { self.event_idx.load(Ordering::Acquire) }

#[implement(Service)]
#[inline]
#[must_use]
pub fn server_name(&self) -> &str { self.server.name.as_str() }

/// checks if `mxid`'s host is this server via server_name comparison
#[implement(Service)]
#[must_use]
pub fn host_is_ours(&self, mxid: &str) -> bool {
	lattice_core::event::host_of(mxid).is_some_and(|host| self.server.is_ours(host))
}

#[implement(Service)]
#[inline]
#[must_use]
pub fn server_is_ours(&self, name: &str) -> bool { self.server.is_ours(name) }

#[implement(Service)]
#[inline]
#[must_use]
pub fn conf_room_id(&self) -> String { format!("!conf:{}", self.server_name()) }

#[implement(Service)]
#[inline]
#[must_use]
pub fn server_user(&self) -> String { format!("@lattice:{}", self.server_name()) }

#[implement(Service)]
#[inline]
pub(crate) fn counter_map(&self) -> &Arc<Map> { &self.db.global }
