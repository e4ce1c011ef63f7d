use std::sync::Arc;

use lattice_core::{
	EventIdx, Result, err, implement,
	utils::bytes,
};
use lattice_database::{Batch, Database, Map};

/// Per-room head tracking and the admission-ordered message index
/// walked backward by backfill.
pub struct Service {
	db: Data,
}

struct Data {
	roomid_head: Arc<Map>,
	roomeventidx_eventid: Arc<Map>,
}

/// Separator between the room id and the big-endian event_idx in the
/// message index key. Room ids never contain this byte.
const SEP: u8 = 0xFF;

impl Service {
	pub(crate) fn build(db: &Arc<Database>) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			db: Data {
				roomid_head: db["roomid_head"].clone(),
				roomeventidx_eventid: db["roomeventidx_eventid"].clone(),
			},
		}))
	}
}

/// The latest-admitted event of a room. NotFound for unknown rooms.
#[implement(Service)]
pub async fn head(&self, room_id: &str) -> Result<EventIdx> {
	let val = self.db.roomid_head.get(room_id.as_bytes()).await?;
	bytes::u64_from_le(&val)
}

/// Stage the head advance and the message-index entry for an admission.
#[implement(Service)]
pub(crate) fn stage(
	&self,
	batch: &mut Batch,
	room_id: &str,
	event_idx: EventIdx,
	event_id: &str,
) {
	batch.put(&self.db.roomid_head, room_id.as_bytes(), &bytes::u64_to_le(event_idx));
	batch.put(
		&self.db.roomeventidx_eventid,
		&message_key(room_id, event_idx),
		event_id.as_bytes(),
	);
}

/// Walk the room's messages backward from `from` (inclusive; the head
/// when None), up to `limit` entries.
#[implement(Service)]
pub async fn messages_rev(
	&self,
	room_id: &str,
	from: Option<EventIdx>,
	limit: usize,
) -> Result<Vec<(EventIdx, String)>> {
	let prefix = room_prefix(room_id);
	let from = message_key(room_id, from.unwrap_or(u64::MAX));

	self.db
		.roomeventidx_eventid
		.rev_from(prefix.clone(), from, limit)
		.await?
		.into_iter()
		.map(|(key, val)| {
			let event_idx = bytes::u64_from_be(&key[prefix.len()..])?;
			let event_id = String::from_utf8(val)
				.map_err(|e| err!(Database("event id not utf-8: {e}")))?;

			Ok((event_idx, event_id))
		})
		.collect()
}

fn room_prefix(room_id: &str) -> Vec<u8> {
	let mut key = Vec::with_capacity(room_id.len().saturating_add(1));
	key.extend_from_slice(room_id.as_bytes());
	key.push(SEP);
	key
}

fn message_key(room_id: &str, event_idx: EventIdx) -> Vec<u8> {
	let mut key = room_prefix(room_id);
	key.extend_from_slice(&bytes::u64_to_be(event_idx));
	key
}
