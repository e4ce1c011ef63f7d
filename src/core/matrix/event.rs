mod builder;
mod conforms;
mod essential;

use ruma::{CanonicalJsonObject, CanonicalJsonValue};

pub use self::{
	builder::{Builder, EventRef},
	conforms::{Code, Conforms},
	essential::{content_hash, essential, make_event_id, sign, verify, verify_hash},
};
use crate::Result;

/// The [maximum size allowed] for an event on the wire.
/// [maximum size allowed]: https://spec.matrix.org/latest/client-server-api/#size-limits
pub const MAX_EVENT_BYTES: usize = 65_535;

/// A typed view over the canonical JSON object of one event. Accessors
/// are lenient: absent or mistyped fields read as `None` so the
/// conformance pass can enumerate every defect instead of failing on the
/// first. The object is never mutated after construction.
#[derive(Clone, Debug)]
pub struct Event {
	object: CanonicalJsonObject,
}

impl Event {
	/// Parse an event from wire bytes. Only malformed JSON fails here;
	/// field-level problems are the conformance checker's department.
	pub fn from_slice(bytes: &[u8]) -> Result<Self> {
		Ok(Self {
			object: super::canonical::parse(bytes)?,
		})
	}

	#[inline]
	#[must_use]
	pub fn from_object(object: CanonicalJsonObject) -> Self { Self { object } }

	#[inline]
	#[must_use]
	pub fn object(&self) -> &CanonicalJsonObject { &self.object }

	#[inline]
	#[must_use]
	pub fn into_object(self) -> CanonicalJsonObject { self.object }

	#[inline]
	#[must_use]
	pub fn event_id(&self) -> Option<&str> { self.str_field("event_id") }

	#[inline]
	#[must_use]
	pub fn room_id(&self) -> Option<&str> { self.str_field("room_id") }

	#[inline]
	#[must_use]
	pub fn sender(&self) -> Option<&str> { self.str_field("sender") }

	#[inline]
	#[must_use]
	pub fn origin(&self) -> Option<&str> { self.str_field("origin") }

	#[inline]
	#[must_use]
	pub fn kind(&self) -> Option<&str> { self.str_field("type") }

	#[inline]
	#[must_use]
	pub fn state_key(&self) -> Option<&str> { self.str_field("state_key") }

	#[inline]
	#[must_use]
	pub fn redacts(&self) -> Option<&str> { self.str_field("redacts") }

	#[inline]
	#[must_use]
	pub fn origin_server_ts(&self) -> Option<i64> { self.int_field("origin_server_ts") }

	#[inline]
	#[must_use]
	pub fn depth(&self) -> Option<i64> { self.int_field("depth") }

	#[inline]
	#[must_use]
	pub fn is_state(&self) -> bool { self.object.contains_key("state_key") }

	#[inline]
	#[must_use]
	pub fn content(&self) -> Option<&CanonicalJsonObject> { self.object_field("content") }

	#[inline]
	#[must_use]
	pub fn signatures(&self) -> Option<&CanonicalJsonObject> { self.object_field("signatures") }

	/// The `sha256` member of the `hashes` object.
	#[must_use]
	pub fn hashes_sha256(&self) -> Option<&str> {
		match self.object_field("hashes")?.get("sha256") {
			| Some(CanonicalJsonValue::String(s)) => Some(s),
			| _ => None,
		}
	}

	/// The top-level `membership` field; membership events carry it in
	/// addition to `content.membership`.
	#[inline]
	#[must_use]
	pub fn membership(&self) -> Option<&str> { self.str_field("membership") }

	/// Effective membership: the top-level field, falling back to
	/// `content.membership`.
	#[must_use]
	pub fn effective_membership(&self) -> Option<&str> {
		self.membership().or_else(|| self.content_membership())
	}

	#[must_use]
	pub fn content_membership(&self) -> Option<&str> {
		match self.content()?.get("membership") {
			| Some(CanonicalJsonValue::String(s)) => Some(s),
			| _ => None,
		}
	}

	/// Event ids referenced by `prev_events`, in order.
	pub fn prev_events(&self) -> impl Iterator<Item = &str> + Clone + '_ {
		Self::reference_ids(self.array_field("prev_events"))
	}

	/// Event ids referenced by `auth_events`, in order.
	pub fn auth_events(&self) -> impl Iterator<Item = &str> + Clone + '_ {
		Self::reference_ids(self.array_field("auth_events"))
	}

	/// Event ids referenced by the legacy `prev_state`, in order.
	pub fn prev_state(&self) -> impl Iterator<Item = &str> + Clone + '_ {
		Self::reference_ids(self.array_field("prev_state"))
	}

	/// Serialized size of the canonical form.
	#[must_use]
	pub fn size(&self) -> usize { super::canonical::canonicalize(&self.object).len() }

	/// Each reference is a two-element array `[event_id, {hashes}]`;
	/// entries of any other shape are skipped rather than failed, the
	/// conformance codes cover them.
	fn reference_ids(
		array: Option<&Vec<CanonicalJsonValue>>,
	) -> impl Iterator<Item = &str> + Clone + '_ {
		array
			.map(Vec::as_slice)
			.unwrap_or_default()
			.iter()
			.filter_map(|entry| match entry {
				| CanonicalJsonValue::Array(pair) => match pair.first() {
					| Some(CanonicalJsonValue::String(id)) => Some(id.as_str()),
					| _ => None,
				},
				| _ => None,
			})
	}

	fn str_field(&self, name: &str) -> Option<&str> {
		match self.object.get(name) {
			| Some(CanonicalJsonValue::String(s)) => Some(s),
			| _ => None,
		}
	}

	fn int_field(&self, name: &str) -> Option<i64> {
		match self.object.get(name) {
			| Some(CanonicalJsonValue::Integer(i)) => Some(i64::from(*i)),
			| _ => None,
		}
	}

	fn object_field(&self, name: &str) -> Option<&CanonicalJsonObject> {
		match self.object.get(name) {
			| Some(CanonicalJsonValue::Object(o)) => Some(o),
			| _ => None,
		}
	}

	fn array_field(&self, name: &str) -> Option<&Vec<CanonicalJsonValue>> {
		match self.object.get(name) {
			| Some(CanonicalJsonValue::Array(a)) => Some(a),
			| _ => None,
		}
	}
}

/// Host part of a sigil-prefixed Matrix identifier: everything after the
/// first colon. Server names may carry a port, so the split is on the
/// first separator only.
#[must_use]
pub fn host_of(mxid: &str) -> Option<&str> {
	let (_, host) = mxid.get(1..)?.split_once(':')?;
	(!host.is_empty()).then_some(host)
}

/// Sigil and host syntax check for an identifier.
#[must_use]
pub fn valid_mxid(sigil: char, mxid: &str) -> bool {
	mxid.starts_with(sigil)
		&& mxid
			.get(1..)
			.and_then(|rest| rest.split_once(':'))
			.is_some_and(|(localpart, host)| !localpart.is_empty() && !host.is_empty())
}
