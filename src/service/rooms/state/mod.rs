use std::sync::Arc;

use async_trait::async_trait;
use lattice_core::{
	Event, EventIdx, Result, err, implement,
	state::{Appendix, Key, Node, NodeId, NodeStore, Tree},
	utils::bytes,
};
use lattice_database::{Batch, Database, Map};

use super::{events, index};

/// The room state index: wires the content-addressed B-tree to the
/// `statenode` column and tracks each room's current root plus the
/// historical root at every admitted event.
pub struct Service {
	tree: Tree,
	db: Data,
	index: Arc<index::Service>,
	events: Arc<events::Service>,
}

struct Data {
	statenode: Arc<Map>,
	roomid_stateroot: Arc<Map>,
	eventidx_stateroot: Arc<Map>,
}

#[async_trait]
impl NodeStore for Service {
	async fn get_node(&self, id: &str) -> Result<Node> {
		let bytes = self.db.statenode.get(id.as_bytes()).await?;
		Node::parse(&bytes)
	}
}

impl Service {
	pub(crate) fn build(
		db: &Arc<Database>,
		index: &Arc<index::Service>,
		events: &Arc<events::Service>,
	) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			tree: Tree::new(),
			db: Data {
				statenode: db["statenode"].clone(),
				roomid_stateroot: db["roomid_stateroot"].clone(),
				eventidx_stateroot: db["eventidx_stateroot"].clone(),
			},
			index: index.clone(),
			events: events.clone(),
		}))
	}
}

/// Current state root of a room. NotFound before the create event.
#[implement(Service)]
pub async fn room_root(&self, room_id: &str) -> Result<NodeId> {
	let root = self
		.db
		.roomid_stateroot
		.get(room_id.as_bytes())
		.await?;

	Ok(String::from_utf8(root).map_err(|e| err!(Database("state root not utf-8: {e}")))?)
}

/// State root as of a given admitted event: the room's history at that
/// point in its causal order.
#[implement(Service)]
pub async fn root_at(&self, event_idx: EventIdx) -> Result<NodeId> {
	let root = self
		.db
		.eventidx_stateroot
		.get(&bytes::u64_to_be(event_idx))
		.await?;

	Ok(String::from_utf8(root).map_err(|e| err!(Database("state root not utf-8: {e}")))?)
}

/// Run the tree insertion. Nothing is persisted: the new root and the
/// fresh nodes come back for staging into the admission batch.
#[implement(Service)]
pub async fn insert(
	&self,
	root: Option<&str>,
	key: Key,
	event_id: &str,
) -> Result<(NodeId, Appendix)> {
	let mut appendix = Appendix::default();
	let root = self
		.tree
		.insert(self, root, key, event_id, &mut appendix)
		.await?;

	Ok((root, appendix))
}

/// Stage a root advance: the new nodes, the room's current root and the
/// per-event historical root, all in the admission batch.
#[implement(Service)]
pub(crate) fn stage(
	&self,
	batch: &mut Batch,
	room_id: &str,
	event_idx: EventIdx,
	root: &str,
	appendix: &Appendix,
) {
	for (id, bytes) in appendix.iter() {
		batch.put(&self.db.statenode, id.as_bytes(), bytes);
	}

	batch.put(&self.db.roomid_stateroot, room_id.as_bytes(), root.as_bytes());
	self.stage_event_root(batch, event_idx, root);
}

/// Non-state admissions still record the root in effect at the event.
#[implement(Service)]
pub(crate) fn stage_event_root(&self, batch: &mut Batch, event_idx: EventIdx, root: &str) {
	batch.put(&self.db.eventidx_stateroot, &bytes::u64_to_be(event_idx), root.as_bytes());
}

/// Value at `(type, state_key)` under a given root.
#[implement(Service)]
pub async fn get_at(&self, root: &str, kind: &str, state_key: &str) -> Result<String> {
	self.tree
		.get(self, root, &Key::make(kind, state_key))
		.await
}

/// Value at `(type, state_key)` in a room's current state.
#[implement(Service)]
pub async fn get(&self, room_id: &str, kind: &str, state_key: &str) -> Result<String> {
	let root = self.room_root(room_id).await?;
	self.get_at(&root, kind, state_key).await
}

/// Full event at `(type, state_key)` in a room's current state,
/// resolved through the index and the column store.
#[implement(Service)]
pub async fn event(&self, room_id: &str, kind: &str, state_key: &str) -> Result<Event> {
	let event_id = self.get(room_id, kind, state_key).await?;
	self.event_of(&event_id).await
}

/// Same, under an explicit root.
#[implement(Service)]
pub async fn event_at(&self, root: &str, kind: &str, state_key: &str) -> Result<Event> {
	let event_id = self.get_at(root, kind, state_key).await?;
	self.event_of(&event_id).await
}

#[implement(Service)]
async fn event_of(&self, event_id: &str) -> Result<Event> {
	let event_idx = self.index.index(event_id).await?;
	if event_idx == 0 {
		return Err(err!(NotFound("state value {event_id} is not indexed")));
	}

	self.events.get(event_idx).await
}

/// Every `(key, event_id)` under a root, optionally bounded to one type,
/// in key order.
#[implement(Service)]
pub async fn entries(&self, root: &str, kind: Option<&str>) -> Result<Vec<(Key, String)>> {
	let prefix = kind.map(Key::make_type);
	let mut entries = Vec::new();
	self.tree
		.for_each(self, root, prefix.as_ref(), &mut |key, val| {
			entries.push((key.clone(), val.to_owned()));
		})
		.await?;

	Ok(entries)
}

/// The full events of a room's current state, in key order.
#[implement(Service)]
pub async fn full_events(&self, room_id: &str) -> Result<Vec<Event>> {
	let root = self.room_root(room_id).await?;
	let mut events = Vec::new();
	for (_, event_id) in self.entries(&root, None).await? {
		match self.event_of(&event_id).await {
			| Ok(event) => events.push(event),
			| Err(e) if e.is_not_found() => {},
			| Err(e) => return Err(e),
		}
	}

	Ok(events)
}

#[implement(Service)]
pub async fn count(&self, root: &str) -> Result<usize> { self.tree.count(self, root).await }
