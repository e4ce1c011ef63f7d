use std::{collections::BTreeMap, sync::Arc};

use lattice_core::{
	Event, Result, Server, debug_info, err, event, implement,
	matrix::canonical::{b64decode_unpadded, b64encode_unpadded, public_key},
};
use lattice_database::{Database, Map};
use ring::{rand::SystemRandom, signature::Ed25519KeyPair};
use ruma::CanonicalJsonValue;

/// The server's Ed25519 signing identity plus the store of verify keys
/// for remote origins. Event signatures are checked here against the
/// essential projection; acquisition of remote keys is the caller's
/// concern, they land in the key store before verification needs them.
pub struct Service {
	server: Arc<Server>,
	keypair: Ed25519KeyPair,
	key_id: String,
	db: Data,
}

struct Data {
	global: Arc<Map>,
	server_signingkeys: Arc<Map>,
}

const KEYPAIR_KEY: &[u8] = b"keypair";

impl Service {
	pub(crate) async fn build(server: &Arc<Server>, db: &Arc<Database>) -> Result<Arc<Self>> {
		let global = db["global"].clone();
		let (version, keypair) = load_or_create_keypair(&global).await?;

		Ok(Arc::new(Self {
			server: server.clone(),
			keypair,
			key_id: format!("ed25519:{version}"),
			db: Data {
				global,
				server_signingkeys: db["server_signingkeys"].clone(),
			},
		}))
	}
}

/// Stored as `<version> 0xFF <pkcs8 document>`.
async fn load_or_create_keypair(global: &Arc<Map>) -> Result<(String, Ed25519KeyPair)> {
	let stored = match global.get(KEYPAIR_KEY).await {
		| Ok(stored) => Some(stored),
		| Err(e) if e.is_not_found() => None,
		| Err(e) => return Err(e),
	};

	let (version, document) = match stored {
		| Some(stored) => {
			let mut split = stored.splitn(2, |&b| b == 0xFF);
			let version = split
				.next()
				.and_then(|v| String::from_utf8(v.to_vec()).ok())
				.ok_or_else(|| err!(Database("stored keypair has no version")))?;
			let document = split
				.next()
				.ok_or_else(|| err!(Database("stored keypair has no document")))?
				.to_vec();

			(version, document)
		},
		| None => {
			let document = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new())
				.map_err(|_| err!(Err("failed to generate signing key")))?;

			let version = "0".to_owned();
			let mut stored = version.clone().into_bytes();
			stored.push(0xFF);
			stored.extend_from_slice(document.as_ref());
			global.put(KEYPAIR_KEY, &stored).await?;
			debug_info!("Generated new Ed25519 signing key, version {version}");

			(version, document.as_ref().to_vec())
		},
	};

	let keypair = Ed25519KeyPair::from_pkcs8(&document)
		.map_err(|_| err!(Database("stored signing key is unusable")))?;

	Ok((version, keypair))
}

#[implement(Service)]
#[inline]
#[must_use]
pub fn keypair(&self) -> &Ed25519KeyPair { &self.keypair }

#[implement(Service)]
#[inline]
#[must_use]
pub fn active_key_id(&self) -> &str { &self.key_id }

#[implement(Service)]
#[inline]
#[must_use]
pub fn verify_key(&self) -> &[u8] { public_key(&self.keypair) }

/// Signature check for one event: at least one signature from the
/// event's origin must verify over the essential projection with a key
/// known for that origin.
#[implement(Service)]
#[tracing::instrument(level = "debug", skip_all, fields(event_id = ?event.event_id()))]
pub async fn verify_event(&self, event: &Event) -> Result {
	let Some(origin) = event.origin() else {
		return Err(err!(Signature("event has no origin")));
	};

	let sigs = event
		.signatures()
		.and_then(|sigs| sigs.get(origin));
	let Some(CanonicalJsonValue::Object(sigs)) = sigs else {
		return Err(err!(Signature("event carries no signature from {origin}")));
	};

	for (key_id, sig) in sigs {
		let CanonicalJsonValue::String(sig) = sig else {
			continue;
		};

		let Ok(sig) = b64decode_unpadded(sig) else {
			continue;
		};

		let Ok(key) = self.get_verify_key(origin, key_id).await else {
			continue;
		};

		if event::verify(event.object(), &key, &sig) {
			return Ok(());
		}
	}

	Err(err!(Signature("no verifying signature from {origin}")))
}

/// Public key for `(origin, key_id)` from the key store. Our own key
/// short-circuits the store.
#[implement(Service)]
pub async fn get_verify_key(&self, origin: &str, key_id: &str) -> Result<Vec<u8>> {
	if self.server.is_ours(origin) && key_id == self.key_id {
		return Ok(self.verify_key().to_vec());
	}

	let stored = self
		.db
		.server_signingkeys
		.get(origin.as_bytes())
		.await?;

	let keys: BTreeMap<String, String> = serde_json::from_slice(&stored)?;
	let key = keys
		.get(key_id)
		.ok_or_else(|| err!(NotFound("no key {key_id} known for {origin}")))?;

	b64decode_unpadded(key)
}

/// Record a verify key for a remote origin.
#[implement(Service)]
pub async fn add_signing_key(&self, origin: &str, key_id: &str, key_b64: &str) -> Result {
	let mut keys: BTreeMap<String, String> = match self
		.db
		.server_signingkeys
		.get(origin.as_bytes())
		.await
	{
		| Ok(stored) => serde_json::from_slice(&stored)?,
		| Err(e) if e.is_not_found() => BTreeMap::new(),
		| Err(e) => return Err(e),
	};

	keys.insert(key_id.to_owned(), key_b64.to_owned());
	self.db
		.server_signingkeys
		.put(origin.as_bytes(), &serde_json::to_vec(&keys)?)
		.await
}

/// Publish our own verify key into the store so verification of local
/// events takes the same path as remote ones.
#[implement(Service)]
pub(crate) async fn publish_own_key(&self) -> Result {
	let key = b64encode_unpadded(self.verify_key());
	self.add_signing_key(self.server.name.as_str(), &self.key_id, &key)
		.await
}
