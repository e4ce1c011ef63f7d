use ring::signature::Ed25519KeyPair;
use ruma::{CanonicalJsonObject, CanonicalJsonValue};

use super::{Event, content_hash, make_event_id};
use crate::{Result, err, matrix::canonical::b64encode_unpadded, utils::now_millis};

/// Reference to a prior event: `[event_id, {hashes}]` on the wire.
pub type EventRef = (String, CanonicalJsonObject);

/// Assembles a locally-originated event. The builder fills the graph
/// fields, then [`build`](Self::build) mints the event id from the
/// content hash, attaches `hashes`, signs the essential projection and
/// returns the sealed event.
#[derive(Clone, Debug, Default)]
pub struct Builder {
	pub kind: String,
	pub sender: String,
	pub room_id: String,
	pub content: CanonicalJsonObject,
	pub state_key: Option<String>,
	pub redacts: Option<String>,
	pub membership: Option<String>,
	pub depth: u64,
	pub prev_events: Vec<EventRef>,
	pub prev_state: Vec<EventRef>,
	pub auth_events: Vec<EventRef>,
	pub origin_server_ts: Option<u64>,
}

impl Builder {
	#[must_use]
	pub fn new(kind: &str, sender: &str, room_id: &str) -> Self {
		Self {
			kind: kind.into(),
			sender: sender.into(),
			room_id: room_id.into(),
			..Default::default()
		}
	}

	#[must_use]
	pub fn state(mut self, state_key: &str, content: CanonicalJsonObject) -> Self {
		self.state_key = Some(state_key.into());
		self.content = content;
		self
	}

	#[must_use]
	pub fn timeline(mut self, content: CanonicalJsonObject) -> Self {
		self.content = content;
		self
	}

	/// Seal the event: mint the id, hash, sign. The origin is the
	/// sender's host; `key_id` names the signing key, e.g. "ed25519:0".
	pub fn build(self, keypair: &Ed25519KeyPair, key_id: &str) -> Result<Event> {
		let origin = super::host_of(&self.sender)
			.ok_or_else(|| err!(BadJson("sender {:?} has no host part", self.sender)))?
			.to_owned();

		let mut object = CanonicalJsonObject::new();
		object.insert("type".into(), self.kind.into());
		object.insert("sender".into(), self.sender.into());
		object.insert("room_id".into(), self.room_id.into());
		object.insert("origin".into(), origin.clone().into());
		object.insert("content".into(), CanonicalJsonValue::Object(self.content));
		object.insert(
			"origin_server_ts".into(),
			int_value(self.origin_server_ts.unwrap_or_else(now_millis))?,
		);
		object.insert("depth".into(), int_value(self.depth)?);
		object.insert("prev_events".into(), refs_value(self.prev_events));

		if let Some(state_key) = self.state_key {
			object.insert("state_key".into(), state_key.into());
		}

		if let Some(redacts) = self.redacts {
			object.insert("redacts".into(), redacts.into());
		}

		if let Some(membership) = self.membership {
			object.insert("membership".into(), membership.into());
		}

		if !self.prev_state.is_empty() {
			object.insert("prev_state".into(), refs_value(self.prev_state));
		}

		if !self.auth_events.is_empty() {
			object.insert("auth_events".into(), refs_value(self.auth_events));
		}

		let event_id = make_event_id(&object, &origin);
		object.insert("event_id".into(), event_id.into());

		let mut hashes = CanonicalJsonObject::new();
		hashes.insert("sha256".into(), b64encode_unpadded(&content_hash(&object)).into());
		object.insert("hashes".into(), CanonicalJsonValue::Object(hashes));

		let signature = super::sign(&object, keypair);
		let mut key_sigs = CanonicalJsonObject::new();
		key_sigs.insert(key_id.into(), b64encode_unpadded(&signature).into());
		let mut signatures = CanonicalJsonObject::new();
		signatures.insert(origin, CanonicalJsonValue::Object(key_sigs));
		object.insert("signatures".into(), CanonicalJsonValue::Object(signatures));

		Ok(Event::from_object(object))
	}
}

fn int_value(val: u64) -> Result<CanonicalJsonValue> {
	let int = ruma::Int::try_from(val).map_err(|e| err!(BadJson("out of range: {e}")))?;
	Ok(CanonicalJsonValue::Integer(int))
}

fn refs_value(refs: Vec<EventRef>) -> CanonicalJsonValue {
	let array = refs
		.into_iter()
		.map(|(event_id, hashes)| {
			CanonicalJsonValue::Array(vec![
				event_id.into(),
				CanonicalJsonValue::Object(hashes),
			])
		})
		.collect();

	CanonicalJsonValue::Array(array)
}
