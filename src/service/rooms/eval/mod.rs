//! The admission pipeline. One evaluation takes an event through
//! conformance, the content hash, the origin signature, authorization
//! against the room's current state, and finally the atomic commit which
//! assigns its index, writes its columns and advances the room's state
//! root and head. Admissions are serialized per room; across rooms they
//! interleave freely.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::Duration,
};

use lattice_core::{
	Event, EventIdx, Result, Server, debug, err, implement,
	error::Error,
	event::{Code, Conforms, verify_hash},
	matrix::auth::{AuthState, authorize},
	state::{Appendix, Key, NodeId},
	utils::{MutexMap, backoff_delay, bytes},
};
use lattice_database::Database;

use super::{events, index, state, timeline};
use crate::{globals, server_keys};

pub struct Service {
	server: Arc<Server>,
	db: Arc<Database>,
	globals: Arc<globals::Service>,
	server_keys: Arc<server_keys::Service>,
	index: Arc<index::Service>,
	events: Arc<events::Service>,
	state: Arc<state::Service>,
	timeline: Arc<timeline::Service>,

	/// Per-room admission serialization; waiters queue without blocking
	/// the loop.
	mutex: MutexMap<String, ()>,

	/// Per-room in-flight admission counts for backpressure.
	inflight: Mutex<HashMap<String, usize>>,
}

/// Evaluation options.
#[derive(Clone, Debug)]
pub struct Opts {
	/// Conformance codes to ignore for this evaluation. The legacy
	/// `prev_state` requirement is skipped unless a caller opts in.
	pub non_conform: Conforms,
}

impl Default for Opts {
	fn default() -> Self {
		Self {
			non_conform: Conforms::mask(&[Code::MissingPrevState]),
		}
	}
}

/// Outcome of a successful admission.
#[derive(Clone, Debug)]
pub struct Admitted {
	pub event_idx: EventIdx,
	pub root: NodeId,
}

const COMMIT_TRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(50);
const BACKOFF_MAX: Duration = Duration::from_secs(2);

impl Service {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn build(
		server: &Arc<Server>,
		db: &Arc<Database>,
		globals: &Arc<globals::Service>,
		server_keys: &Arc<server_keys::Service>,
		index: &Arc<index::Service>,
		events: &Arc<events::Service>,
		state: &Arc<state::Service>,
		timeline: &Arc<timeline::Service>,
	) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			server: server.clone(),
			db: db.clone(),
			globals: globals.clone(),
			server_keys: server_keys.clone(),
			index: index.clone(),
			events: events.clone(),
			state: state.clone(),
			timeline: timeline.clone(),
			mutex: MutexMap::new(),
			inflight: Mutex::new(HashMap::new()),
		}))
	}
}

/// Evaluate one event for admission into its room.
#[implement(Service)]
#[tracing::instrument(
	name = "eval",
	level = "debug",
	skip_all,
	fields(event_id = ?event.event_id()),
)]
pub async fn eval(&self, event: &Event, opts: &Opts) -> Result<Admitted> {
	self.server.check_running()?;

	let max_size = self.server.config.event_max_size();
	if event.size() > max_size {
		return Err(err!(BadJson("event exceeds the maximum of {max_size} bytes")));
	}

	let report = Conforms::check(event).masked(opts.non_conform);
	if !report.is_clean() {
		return Err(Error::Conformance(report));
	}

	// Conformance passed, so the fields below are present and shaped.
	let event_id = event.event_id().expect("conforming event has an id");
	let room_id = event.room_id().expect("conforming event has a room");

	let _inflight = self.acquire_inflight(room_id)?;

	verify_hash(event)?;
	self.server_keys.verify_event(event).await?;

	// Serialize against other admissions for this room: idx assignment
	// and root advance below are total-ordered per room.
	let _lock = self.mutex.lock(room_id).await;

	if self.index.index(event_id).await? != 0 {
		return Err(err!(AlreadyExists("{event_id} is already evaluated")));
	}

	let root = match self.state.room_root(room_id).await {
		| Ok(root) => Some(root),
		| Err(e) if e.is_not_found() => None,
		| Err(e) => return Err(e),
	};

	self.authorize(event, root.as_deref()).await?;
	self.commit(event, root.as_deref()).await
}

/// Resolve the referenced auth state out of the state tree and apply
/// the authorization predicates.
#[implement(Service)]
async fn authorize(&self, event: &Event, root: Option<&str>) -> Result {
	let fetch = |kind: &'static str, state_key: String| async move {
		let Some(root) = root else { return Ok(None) };
		match self.state.event_at(root, kind, &state_key).await {
			| Ok(event) => Ok(Some(event)),
			| Err(e) if e.is_not_found() => Ok(None),
			| Err(e) => Err(e),
		}
	};

	let sender = event.sender().unwrap_or_default();
	let create = fetch("m.room.create", String::new()).await?;
	let power_levels = fetch("m.room.power_levels", String::new()).await?;
	let join_rules = fetch("m.room.join_rules", String::new()).await?;
	let sender_member = fetch("m.room.member", sender.to_owned()).await?;

	let target_member = if event.kind() == Some("m.room.member") {
		let target = event.state_key().unwrap_or_default();
		fetch("m.room.member", target.to_owned()).await?
	} else {
		None
	};

	authorize(event, &AuthState {
		create: create.as_ref(),
		power_levels: power_levels.as_ref(),
		join_rules: join_rules.as_ref(),
		sender_member: sender_member.as_ref(),
		target_member: target_member.as_ref(),
	})
}

/// The atomic commit: every cell of the admission in one batch.
/// Transient storage errors retry with bounded backoff; the same
/// event_idx and tree nodes are reused across attempts.
#[implement(Service)]
async fn commit(&self, event: &Event, root: Option<&str>) -> Result<Admitted> {
	let event_id = event.event_id().expect("conforming event has an id");
	let room_id = event.room_id().expect("conforming event has a room");
	let event_idx = self.globals.next_event_idx();

	let (root, appendix) = if let Some(state_key) = event.state_key() {
		let kind = event.kind().expect("conforming event has a type");
		let key = Key::make(kind, state_key);
		let (root, appendix) = self.state.insert(root, key, event_id).await?;
		(root, Some(appendix))
	} else {
		let root = root
			.ok_or_else(|| err!(NotFound("room {room_id} has no state")))?
			.to_owned();

		(root, None)
	};

	let mut tries = 0;
	loop {
		let result = self
			.try_commit(event, event_idx, room_id, &root, appendix.as_ref())
			.await;

		match result {
			| Ok(()) =>
				return Ok(Admitted { event_idx, root }),
			| Err(e) if e.is_transient() && tries < COMMIT_TRIES => {
				tries = tries.saturating_add(1);
				let delay = backoff_delay(tries, BACKOFF_BASE, BACKOFF_MAX);
				debug!("commit attempt {tries} failed, retrying in {delay:?}: {e}");
				tokio::time::sleep(delay).await;
			},
			| Err(e) => return Err(e),
		}
	}
}

#[implement(Service)]
async fn try_commit(
	&self,
	event: &Event,
	event_idx: EventIdx,
	room_id: &str,
	root: &str,
	appendix: Option<&Appendix>,
) -> Result {
	let event_id = event.event_id().expect("conforming event has an id");

	let mut batch = self.db.batch();
	self.index.stage(&mut batch, event_id, event_idx);
	self.events.append(&mut batch, event_idx, event)?;
	self.timeline.stage(&mut batch, room_id, event_idx, event_id);

	if let Some(appendix) = appendix {
		self.state
			.stage(&mut batch, room_id, event_idx, root, appendix);
	} else {
		self.state.stage_event_root(&mut batch, event_idx, root);
	}

	batch.put(
		self.globals.counter_map(),
		globals::COUNTER_KEY,
		&bytes::u64_to_le(self.globals.current_event_idx()),
	);

	batch.commit().await
}

/// Soft bound on concurrent evaluations per room; overflow is a
/// retriable rejection for the caller.
#[implement(Service)]
fn acquire_inflight(&self, room_id: &str) -> Result<InflightGuard<'_>> {
	let max = self.server.config.eval_inflight_max();
	let mut inflight = self.inflight.lock()?;
	let count = inflight.entry(room_id.to_owned()).or_insert(0);
	if *count >= max {
		return Err(err!(Limited("room {room_id} has {count} admissions in flight")));
	}

	*count = count.saturating_add(1);
	drop(inflight);

	Ok(InflightGuard { service: self, room_id: room_id.to_owned() })
}

struct InflightGuard<'a> {
	service: &'a Service,
	room_id: String,
}

impl Drop for InflightGuard<'_> {
	fn drop(&mut self) {
		let mut inflight = self
			.service
			.inflight
			.lock()
			.expect("inflight admissions");

		if let Some(count) = inflight.get_mut(&self.room_id) {
			*count = count.saturating_sub(1);
			if *count == 0 {
				inflight.remove(&self.room_id);
			}
		}
	}
}
