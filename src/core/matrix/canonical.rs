//! Canonical serialization and the digest/signature primitives. The
//! canonical form of an object is its JSON with keys sorted and no
//! insignificant whitespace; it is byte-identical across implementations
//! for equal input. All hashes are SHA-256; signatures are Ed25519.

use ring::signature::{ED25519, Ed25519KeyPair, KeyPair, UnparsedPublicKey};
use ruma::{CanonicalJsonObject, CanonicalJsonValue};

use crate::{Result, err};

pub const SHA256_LEN: usize = 32;
pub const ED25519_SIG_LEN: usize = 64;

/// Parse a byte buffer into a canonical JSON object. Malformed JSON, a
/// non-object document, or values outside the canonical range (floats,
/// integers beyond 2^53) are schema errors.
pub fn parse(bytes: &[u8]) -> Result<CanonicalJsonObject> {
	let value: serde_json::Value = serde_json::from_slice(bytes)?;
	let value = CanonicalJsonValue::try_from(value)
		.map_err(|e| err!(BadJson("not canonicalizable: {e}")))?;

	match value {
		| CanonicalJsonValue::Object(object) => Ok(object),
		| _ => Err(err!(BadJson("expected a JSON object at the top level"))),
	}
}

/// Serialize to the canonical form. The object representation already
/// sorts keys; output is the compact encoding with the standard escape
/// set.
#[must_use]
pub fn canonicalize(object: &CanonicalJsonObject) -> Vec<u8> {
	serde_json::to_vec(object).expect("canonical object always serializes")
}

#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; SHA256_LEN] {
	ring::digest::digest(&ring::digest::SHA256, bytes)
		.as_ref()
		.try_into()
		.expect("SHA-256 digest is 32 bytes")
}

#[must_use]
pub fn b58encode(bytes: &[u8]) -> String { bs58::encode(bytes).into_string() }

#[must_use]
pub fn b64encode_unpadded(bytes: &[u8]) -> String {
	use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};

	STANDARD_NO_PAD.encode(bytes)
}

pub fn b64decode_unpadded(input: &str) -> Result<Vec<u8>> {
	use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};

	STANDARD_NO_PAD
		.decode(input)
		.map_err(|e| err!(BadJson("invalid unpadded base64: {e}")))
}

#[must_use]
pub fn ed25519_sign(keypair: &Ed25519KeyPair, message: &[u8]) -> [u8; ED25519_SIG_LEN] {
	keypair
		.sign(message)
		.as_ref()
		.try_into()
		.expect("Ed25519 signature is 64 bytes")
}

/// Signature check; never errors, a malformed key or signature is simply
/// not a verifying one.
#[must_use]
pub fn ed25519_verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
	UnparsedPublicKey::new(&ED25519, public_key)
		.verify(message, signature)
		.is_ok()
}

#[must_use]
pub fn public_key(keypair: &Ed25519KeyPair) -> &[u8] { keypair.public_key().as_ref() }
