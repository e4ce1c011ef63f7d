use std::sync::Arc;

use futures::future::try_join_all;
use lattice_core::{
	Event, EventIdx, Result, err, implement,
	utils::bytes,
};
use lattice_database::{Batch, Database, Map};
use ruma::{CanonicalJsonObject, CanonicalJsonValue};

/// Column-sharded event field storage: one ordered column per schema
/// field, keyed by big-endian event_idx, valued by the raw JSON fragment
/// of that field. A whole-event read is a row of point reads; a partial
/// read touches only the selected columns.
pub struct Service {
	columns: Vec<(&'static str, Arc<Map>)>,
}

/// Field -> column mapping. Order matches the on-disk column set.
const COLUMNS: &[(&str, &str)] = &[
	("auth_events", "eventidx_authevents"),
	("content", "eventidx_content"),
	("depth", "eventidx_depth"),
	("event_id", "eventidx_eventid"),
	("hashes", "eventidx_hashes"),
	("membership", "eventidx_membership"),
	("origin", "eventidx_origin"),
	("origin_server_ts", "eventidx_originserverts"),
	("prev_events", "eventidx_prevevents"),
	("prev_state", "eventidx_prevstate"),
	("redacts", "eventidx_redacts"),
	("room_id", "eventidx_roomid"),
	("sender", "eventidx_sender"),
	("signatures", "eventidx_signatures"),
	("state_key", "eventidx_statekey"),
	("type", "eventidx_type"),
];

impl Service {
	pub(crate) fn build(db: &Arc<Database>) -> Result<Arc<Self>> {
		let columns = COLUMNS
			.iter()
			.map(|(field, map)| (*field, db[*map].clone()))
			.collect();

		Ok(Arc::new(Self { columns }))
	}

	fn column(&self, field: &str) -> Result<&Arc<Map>> {
		self.columns
			.iter()
			.find(|(name, _)| *name == field)
			.map(|(_, map)| map)
			.ok_or_else(|| err!(NotFound("no column for event field {field}")))
	}
}

/// Stage every present field of an event into the admission batch. A
/// reader of any row sees either no cells or all of them.
#[implement(Service)]
pub(crate) fn append(&self, batch: &mut Batch, event_idx: EventIdx, event: &Event) -> Result {
	let key = bytes::u64_to_be(event_idx);
	for (field, map) in &self.columns {
		if let Some(value) = event.object().get(*field) {
			batch.put(map, &key, &serde_json::to_vec(value)?);
		}
	}

	Ok(())
}

/// Fill a whole event from its row.
#[implement(Service)]
pub async fn get(&self, event_idx: EventIdx) -> Result<Event> {
	let fields: Vec<&str> = COLUMNS.iter().map(|(field, _)| *field).collect();
	self.seek(event_idx, &fields).await
}

/// Fill the selected fields of an event from one row of point reads.
/// NotFound when the event has no row at all.
#[implement(Service)]
pub async fn seek(&self, event_idx: EventIdx, fields: &[&str]) -> Result<Event> {
	let key = bytes::u64_to_be(event_idx);
	let reads = fields.iter().map(|field| {
		let map = self.column(field);
		async move {
			match map {
				| Ok(map) => Ok((*field, map.get(&key).await.ok())),
				| Err(e) => Err(e),
			}
		}
	});

	let mut object = CanonicalJsonObject::new();
	for (field, cell) in try_join_all(reads).await? {
		let Some(cell) = cell else { continue };
		let value: CanonicalJsonValue = serde_json::from_slice(&cell)?;
		object.insert(field.to_owned(), value);
	}

	if object.is_empty() {
		return Err(err!(NotFound("no event at idx {event_idx}")));
	}

	Ok(Event::from_object(object))
}

/// One field of one event.
#[implement(Service)]
pub async fn field(&self, event_idx: EventIdx, field: &str) -> Result<CanonicalJsonValue> {
	let cell = self
		.column(field)?
		.get(&bytes::u64_to_be(event_idx))
		.await?;

	Ok(serde_json::from_slice(&cell)?)
}

#[implement(Service)]
pub async fn event_id(&self, event_idx: EventIdx) -> Result<String> {
	match self.field(event_idx, "event_id").await? {
		| CanonicalJsonValue::String(id) => Ok(id),
		| _ => Err(err!(Database("event_id cell is not a string"))),
	}
}

/// Read-ahead the selected columns of an event expected to be fetched
/// shortly; suspending readers fault through the loop as usual.
#[implement(Service)]
pub fn prefetch(&self, event_idx: EventIdx, fields: &[&str]) {
	let key = bytes::u64_to_be(event_idx);
	for field in fields {
		if let Ok(map) = self.column(field) {
			map.prefetch(vec![key.to_vec()]);
		}
	}
}
