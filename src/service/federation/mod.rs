//! Federation collectives: fan-out requests to every remote origin of a
//! room, each under its own timeout, awaited together under an aggregate
//! deadline. Results are consumed as they stand when the deadline
//! passes; stragglers are cancelled, idempotently.

use std::{sync::Arc, time::Duration};

use lattice_core::{
	Result, Server, debug, err, implement,
	utils::future::{Future, promise, when_all},
};
use tokio::task::JoinHandle;

use crate::rooms::state;

pub struct Service {
	server: Arc<Server>,
	state: Arc<state::Service>,
	client: reqwest::Client,
}

/// Per-origin outcome of one collective.
#[derive(Debug)]
pub struct OriginResult {
	pub origin: String,
	pub result: Result<serde_json::Value>,
}

impl Service {
	pub(crate) fn build(server: &Arc<Server>, state: &Arc<state::Service>) -> Result<Arc<Self>> {
		let client = reqwest::Client::builder()
			.user_agent(concat!("lattice/", env!("CARGO_PKG_VERSION")))
			.connect_timeout(Duration::from_secs(server.config.request_timeout))
			.build()
			.map_err(|e| err!(Err("failed to construct federation client: {e}")))?;

		Ok(Arc::new(Self {
			server: server.clone(),
			state: state.clone(),
			client,
		}))
	}
}

/// The remote origin servers of a room: every distinct host among the
/// member state, ours excluded.
#[implement(Service)]
pub async fn origins(&self, room_id: &str) -> Result<Vec<String>> {
	let root = self.state.room_root(room_id).await?;
	let entries = self.state.entries(&root, Some("m.room.member")).await?;

	let mut origins: Vec<String> = entries
		.iter()
		.filter_map(|(key, _)| lattice_core::event::host_of(key.state_key()))
		.filter(|host| !self.server.is_ours(host))
		.map(ToOwned::to_owned)
		.collect();

	origins.sort_unstable();
	origins.dedup();
	Ok(origins)
}

/// Ask every remote origin of the room for its federation version. A
/// diagnostic collective: one request per origin with a per-attempt
/// timeout, all awaited under the aggregate deadline.
#[implement(Service)]
#[tracing::instrument(level = "debug", skip(self))]
pub async fn versions(&self, room_id: &str) -> Result<Vec<OriginResult>> {
	let origins = self.origins(room_id).await?;
	let deadline = Duration::from_secs(self.server.config.federation_timeout);
	let attempt = Duration::from_secs(self.server.config.request_timeout);

	let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(origins.len());
	let mut futures: Vec<Future<Result<serde_json::Value>>> = Vec::with_capacity(origins.len());
	for origin in &origins {
		let (p, f) = promise();
		let url = format!("https://{origin}/_matrix/federation/v1/version");
		let client = self.client.clone();
		tasks.push(tokio::spawn(async move {
			let result = request(&client, &url, attempt).await;
			p.set(result);
		}));

		futures.push(f);
	}

	let all = when_all(&futures);
	if tokio::time::timeout(deadline, all).await.is_err() {
		debug!("aggregate deadline passed with stragglers outstanding");
	}

	let results = origins
		.into_iter()
		.zip(&futures)
		.zip(&tasks)
		.map(|((origin, future), task)| match future.try_take() {
			| Some(result) => OriginResult { origin, result },
			| None => {
				// Straggler: cancel at its next suspension point.
				task.abort();
				OriginResult {
					origin,
					result: Err(err!(Timeout("no response within the deadline"))),
				}
			},
		})
		.collect();

	Ok(results)
}

async fn request(
	client: &reqwest::Client,
	url: &str,
	attempt: Duration,
) -> Result<serde_json::Value> {
	let response = tokio::time::timeout(attempt, client.get(url).send())
		.await
		.map_err(|_| err!(Timeout("request timed out")))?
		.map_err(|e| err!(Err("request failed: {e}")))?;

	tokio::time::timeout(attempt, response.json())
		.await
		.map_err(|_| err!(Timeout("response body timed out")))?
		.map_err(|e| err!(Err("malformed response: {e}")))
}
