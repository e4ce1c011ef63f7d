use std::sync::Arc;

use lattice_core::{EventIdx, Result, implement, utils::bytes};
use lattice_database::{Batch, Database, Map};

/// The event_id -> event_idx bijection. An id maps to the same index
/// forever after first assignment; index 0 means the event is unknown.
pub struct Service {
	db: Data,
}

struct Data {
	eventid_eventidx: Arc<Map>,
}

impl Service {
	pub(crate) fn build(db: &Arc<Database>) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			db: Data {
				eventid_eventidx: db["eventid_eventidx"].clone(),
			},
		}))
	}
}

/// Look up the index for an event id; 0 when unknown.
#[implement(Service)]
pub async fn index(&self, event_id: &str) -> Result<EventIdx> {
	match self.db.eventid_eventidx.get(event_id.as_bytes()).await {
		| Ok(val) => bytes::u64_from_le(&val),
		| Err(e) if e.is_not_found() => Ok(0),
		| Err(e) => Err(e),
	}
}

#[implement(Service)]
pub async fn exists(&self, event_id: &str) -> Result<bool> {
	Ok(self.index(event_id).await? != 0)
}

/// Stage the id -> idx assignment into an admission batch. The cell is
/// 8 bytes little-endian.
#[implement(Service)]
pub(crate) fn stage(&self, batch: &mut Batch, event_id: &str, event_idx: EventIdx) {
	debug_assert!(event_idx != 0, "event_idx 0 means absent");
	batch.put(&self.db.eventid_eventidx, event_id.as_bytes(), &bytes::u64_to_le(event_idx));
}
