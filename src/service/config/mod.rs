//! Configuration persistence through the `!conf` room. Overridable
//! items live as `ircd.conf.item` state events keyed by item name; at
//! startup the room state folds back into the config manager, and items
//! missing from the room are seeded with their current values.

use std::sync::Arc;

use lattice_core::{Event, Result, Server, debug, err, event::Builder, implement, warn};
use ruma::{CanonicalJsonObject, CanonicalJsonValue};

use crate::{
	globals,
	rooms::{eval, events, state, timeline},
	server_keys,
};

pub struct Service {
	server: Arc<Server>,
	globals: Arc<globals::Service>,
	server_keys: Arc<server_keys::Service>,
	events: Arc<events::Service>,
	state: Arc<state::Service>,
	timeline: Arc<timeline::Service>,
	eval: Arc<eval::Service>,
}

pub const ITEM_TYPE: &str = "ircd.conf.item";

impl Service {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn build(
		server: &Arc<Server>,
		globals: &Arc<globals::Service>,
		server_keys: &Arc<server_keys::Service>,
		events: &Arc<events::Service>,
		state: &Arc<state::Service>,
		timeline: &Arc<timeline::Service>,
		eval: &Arc<eval::Service>,
	) -> Result<Arc<Self>> {
		Ok(Arc::new(Self {
			server: server.clone(),
			globals: globals.clone(),
			server_keys: server_keys.clone(),
			events: events.clone(),
			state: state.clone(),
			timeline: timeline.clone(),
			eval: eval.clone(),
		}))
	}
}

/// Bring the `!conf` room and the config manager into agreement:
/// existing item events override the manager; items without an event are
/// seeded from their current values.
#[implement(Service)]
pub(crate) async fn start(&self) -> Result {
	let room_id = self.globals.conf_room_id();
	match self.state.room_root(&room_id).await {
		| Ok(root) => self.fold(&root).await?,
		| Err(e) if e.is_not_found() => self.bootstrap(&room_id).await?,
		| Err(e) => return Err(e),
	}

	self.rehash(&room_id).await
}

/// Apply every item event in the conf room state to the manager.
#[implement(Service)]
async fn fold(&self, root: &str) -> Result {
	for (key, _) in self.state.entries(root, Some(ITEM_TYPE)).await? {
		let name = key.state_key();
		let event = self.state.event_at(root, ITEM_TYPE, name).await?;
		let Some(value) = item_value(&event) else {
			warn!("conf item {name} has no value; ignoring");
			continue;
		};

		if let Err(e) = self.server.config.set(name, value) {
			warn!("failed to apply conf item {name}: {e}");
		} else {
			debug!("conf [{name}] => {value}");
		}
	}

	Ok(())
}

/// Persist items which have no event in the conf room yet.
#[implement(Service)]
async fn rehash(&self, room_id: &str) -> Result {
	let items: Vec<_> = self
		.server
		.config
		.items()
		.filter(|(item, _)| item.persist)
		.map(|(item, value)| (item.name, value))
		.collect();

	for (name, value) in items {
		if self.state.get(room_id, ITEM_TYPE, name).await.is_ok() {
			continue;
		}

		self.send_item(name, &value).await?;
	}

	Ok(())
}

/// Set an item: admit the state event into the conf room, then apply
/// the override.
#[implement(Service)]
pub async fn set(&self, name: &str, value: &str) -> Result<String> {
	let event = self.send_item(name, value).await?;
	self.server.config.set(name, value)?;

	Ok(event
		.event_id()
		.expect("admitted event has an id")
		.to_owned())
}

/// Current value of an item as recorded in the conf room.
#[implement(Service)]
pub async fn get(&self, name: &str) -> Result<String> {
	let room_id = self.globals.conf_room_id();
	let event = self.state.event(&room_id, ITEM_TYPE, name).await?;
	item_value(&event)
		.map(ToOwned::to_owned)
		.ok_or_else(|| err!(NotFound("conf item {name} has no value")))
}

#[implement(Service)]
async fn send_item(&self, name: &str, value: &str) -> Result<Event> {
	let room_id = self.globals.conf_room_id();
	let sender = self.globals.server_user();

	let mut content = CanonicalJsonObject::new();
	content.insert("value".into(), value.to_owned().into());

	let builder = Builder::new(ITEM_TYPE, &sender, &room_id).state(name, content);
	self.append_local(builder).await
}

/// Create the conf room: the create event then the server user's join.
#[implement(Service)]
async fn bootstrap(&self, room_id: &str) -> Result {
	let sender = self.globals.server_user();

	let mut content = CanonicalJsonObject::new();
	content.insert("creator".into(), sender.clone().into());
	let create = Builder::new("m.room.create", &sender, room_id).state("", content);
	self.append_local(create).await?;

	let mut content = CanonicalJsonObject::new();
	content.insert("membership".into(), "join".into());
	let mut join = Builder::new("m.room.member", &sender, room_id).state(&sender, content);
	join.membership = Some("join".into());
	self.append_local(join).await?;

	debug!("created {room_id}");
	Ok(())
}

/// Fill the graph fields of a locally-originated event, seal it with
/// the server key and run it through the admission pipeline.
#[implement(Service)]
async fn append_local(&self, mut builder: Builder) -> Result<Event> {
	let room_id = builder.room_id.clone();
	if builder.kind != "m.room.create" {
		let head_idx = self.timeline.head(&room_id).await?;
		let head_id = self.events.event_id(head_idx).await?;
		let head_depth = match self.events.field(head_idx, "depth").await {
			| Ok(CanonicalJsonValue::Integer(depth)) => i64::from(depth).max(0).unsigned_abs(),
			| _ => 0,
		};

		builder.depth = head_depth.saturating_add(1);
		builder.prev_events = vec![(head_id, CanonicalJsonObject::new())];

		if let Ok(create_id) = self.state.get(&room_id, "m.room.create", "").await {
			builder.auth_events = vec![(create_id, CanonicalJsonObject::new())];
		}
	}

	let event = builder.build(self.server_keys.keypair(), self.server_keys.active_key_id())?;
	self.eval.eval(&event, &eval::Opts::default()).await?;
	Ok(event)
}

fn item_value(event: &Event) -> Option<&str> {
	match event.content()?.get("value") {
		| Some(CanonicalJsonValue::String(value)) => Some(value),
		| _ => None,
	}
}
