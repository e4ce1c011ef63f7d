//! Hashing and signing of events. The content hash (I1) covers the
//! canonical form with `hashes` and `signatures` removed. Signatures
//! cover the *essential* projection: the same form with `content`
//! additionally reduced to the per-type whitelist of fields which affect
//! authorization.

use ring::signature::Ed25519KeyPair;
use ruma::{CanonicalJsonObject, CanonicalJsonValue};

use super::Event;
use crate::{
	Result, err,
	matrix::canonical::{
		ED25519_SIG_LEN, b58encode, b64encode_unpadded, canonicalize, sha256,
	},
};

/// Content whitelist for the essential projection, by event type. Types
/// not listed keep nothing.
fn essential_content_keys(kind: &str) -> &'static [&'static str] {
	match kind {
		| "m.room.aliases" => &["aliases"],
		| "m.room.create" => &["creator"],
		| "m.room.history_visibility" => &["history_visibility"],
		| "m.room.join_rules" => &["join_rule"],
		| "m.room.member" => &["membership"],
		| "m.room.power_levels" => &[
			"ban",
			"events",
			"events_default",
			"kick",
			"redact",
			"state_default",
			"users",
			"users_default",
		],
		| _ => &[],
	}
}

/// The essential projection of an event object: `hashes` and
/// `signatures` stripped, `content` reduced to the authorization-relevant
/// whitelist. Redactions additionally drop `redacts`.
#[must_use]
pub fn essential(object: &CanonicalJsonObject) -> CanonicalJsonObject {
	let mut out = object.clone();
	out.remove("hashes");
	out.remove("signatures");

	let kind = match object.get("type") {
		| Some(CanonicalJsonValue::String(kind)) => kind.as_str(),
		| _ => "",
	};

	if kind == "m.room.redaction" {
		out.remove("redacts");
	}

	let keep = essential_content_keys(kind);
	let content = match out.remove("content") {
		| Some(CanonicalJsonValue::Object(content)) => content,
		| _ => CanonicalJsonObject::new(),
	};

	let essential_content: CanonicalJsonObject = content
		.into_iter()
		.filter(|(key, _)| keep.contains(&key.as_str()))
		.collect();

	out.insert("content".into(), CanonicalJsonValue::Object(essential_content));
	out
}

/// Canonical bytes of the object with `hashes` and `signatures` removed;
/// the preimage for both the content hash and the event id.
#[must_use]
pub fn hash_preimage(object: &CanonicalJsonObject) -> Vec<u8> {
	if !object.contains_key("hashes") && !object.contains_key("signatures") {
		return canonicalize(object);
	}

	let mut stripped = object.clone();
	stripped.remove("hashes");
	stripped.remove("signatures");
	canonicalize(&stripped)
}

#[must_use]
pub fn content_hash(object: &CanonicalJsonObject) -> [u8; 32] { sha256(&hash_preimage(object)) }

/// Recompute the content hash and compare against the stored
/// `hashes.sha256` (invariant I1).
pub fn verify_hash(event: &Event) -> Result {
	let Some(stored) = event.hashes_sha256() else {
		return Err(err!(HashMismatch("event carries no sha256 hash")));
	};

	let computed = b64encode_unpadded(&content_hash(event.object()));
	if stored != computed {
		return Err(err!(HashMismatch("sha256 {computed} does not match stored {stored}")));
	}

	Ok(())
}

/// Mint the event id for an object which does not yet carry `event_id`,
/// `hashes` or `signatures`.
#[must_use]
pub fn make_event_id(object: &CanonicalJsonObject, origin: &str) -> String {
	debug_assert!(!object.contains_key("event_id"), "event_id minted twice");

	let hash = sha256(&hash_preimage(object));
	format!("${}:{origin}", b58encode(&hash))
}

/// Sign the essential projection; returns the raw 64-byte signature.
#[must_use]
pub fn sign(object: &CanonicalJsonObject, keypair: &Ed25519KeyPair) -> [u8; ED25519_SIG_LEN] {
	let preimage = canonicalize(&essential(object));
	crate::matrix::canonical::ed25519_sign(keypair, &preimage)
}

/// Verify one signature over the essential projection.
#[must_use]
pub fn verify(object: &CanonicalJsonObject, public_key: &[u8], signature: &[u8]) -> bool {
	let preimage = canonicalize(&essential(object));
	crate::matrix::canonical::ed25519_verify(public_key, &preimage, signature)
}
