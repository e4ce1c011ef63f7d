#![cfg(test)]

use std::sync::Arc;

use lattice_core::{
	Config, Error, Event, Server,
	event::{Builder, Code},
	utils::result::NotFound,
};
use ruma::{CanonicalJsonObject, CanonicalJsonValue};

use crate::{Services, rooms::eval::Opts};

async fn services(dir: &tempfile::TempDir) -> Arc<Services> {
	use figment::providers::Serialized;

	let raw = figment::Figment::new()
		.merge(Serialized::default("server_name", "a.example"))
		.merge(Serialized::default("database_path", dir.path().to_str().unwrap()));

	let config = Config::new(&raw).unwrap();
	let server = Arc::new(Server::new(config, None));
	Services::build(server).await.unwrap()
}

fn content(json: &str) -> CanonicalJsonObject {
	lattice_core::matrix::canonical::parse(json.as_bytes()).unwrap()
}

fn seal(services: &Services, builder: Builder) -> Event {
	builder
		.build(services.server_keys.keypair(), services.server_keys.active_key_id())
		.unwrap()
}

fn create_room(services: &Services, room_id: &str, creator: &str) -> Event {
	seal(
		services,
		Builder::new("m.room.create", creator, room_id)
			.state("", content(&format!(r#"{{"creator": "{creator}"}}"#))),
	)
}

fn member(services: &Services, room_id: &str, user: &str, prev: &Event, depth: u64) -> Event {
	let mut builder = Builder::new("m.room.member", user, room_id)
		.state(user, content(r#"{"membership": "join"}"#));
	builder.membership = Some("join".into());
	builder.depth = depth;
	builder.prev_events = vec![(
		prev.event_id().unwrap().to_owned(),
		CanonicalJsonObject::new(),
	)];

	seal(services, builder)
}

#[tokio::test]
async fn create_room_seeds_single_leaf_state() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;

	let create = create_room(&services, "!room:a.example", "@u:a.example");
	let admitted = services
		.eval
		.eval(&create, &Opts::default())
		.await
		.unwrap();

	assert!(admitted.event_idx != 0);

	let got = services
		.state
		.get("!room:a.example", "m.room.create", "")
		.await
		.unwrap();
	assert_eq!(got, create.event_id().unwrap());

	let root = services
		.state
		.room_root("!room:a.example")
		.await
		.unwrap();
	assert_eq!(admitted.root, root);
	assert_eq!(services.state.count(&root).await.unwrap(), 1);
}

#[tokio::test]
async fn replay_is_idempotent() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;

	let create = create_room(&services, "!room:a.example", "@u:a.example");
	let admitted = services
		.eval
		.eval(&create, &Opts::default())
		.await
		.unwrap();

	let replay = services.eval.eval(&create, &Opts::default()).await;
	assert!(matches!(replay, Err(Error::AlreadyExists(_))));

	// No new index was assigned and the root is unchanged.
	let idx = services
		.index
		.index(create.event_id().unwrap())
		.await
		.unwrap();
	assert_eq!(idx, admitted.event_idx);
	assert_eq!(
		services
			.state
			.room_root("!room:a.example")
			.await
			.unwrap(),
		admitted.root
	);
}

#[tokio::test]
async fn origin_mismatch_is_a_conformance_rejection() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;

	let create = create_room(&services, "!room:a.example", "@u:a.example");
	let mut object = create.into_object();
	object.insert("origin".into(), "b.example".into());
	let forged = Event::from_object(object);

	let Err(Error::Conformance(report)) =
		services.eval.eval(&forged, &Opts::default()).await
	else {
		panic!("expected a conformance rejection");
	};

	assert!(report.has(Code::MismatchOriginEventId));
}

#[tokio::test]
async fn members_populate_state_and_timeline() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;
	let room_id = "!room:a.example";

	let create = create_room(&services, room_id, "@u00:a.example");
	services
		.eval
		.eval(&create, &Opts::default())
		.await
		.unwrap();

	let creator_join = member(&services, room_id, "@u00:a.example", &create, 1);
	services
		.eval
		.eval(&creator_join, &Opts::default())
		.await
		.unwrap();

	let mut rules = Builder::new("m.room.join_rules", "@u00:a.example", room_id)
		.state("", content(r#"{"join_rule": "public"}"#));
	rules.depth = 2;
	rules.prev_events = vec![(
		creator_join.event_id().unwrap().to_owned(),
		CanonicalJsonObject::new(),
	)];
	let rules = seal(&services, rules);
	services
		.eval
		.eval(&rules, &Opts::default())
		.await
		.unwrap();

	let mut prev = rules.clone();
	for i in 1..32_u32 {
		let user = format!("@u{i:02}:a.example");
		let join = member(&services, room_id, &user, &prev, 2 + u64::from(i));
		services.eval.eval(&join, &Opts::default()).await.unwrap();
		prev = join;
	}

	// create + join_rules + 32 member events
	let root = services.state.room_root(room_id).await.unwrap();
	assert_eq!(services.state.count(&root).await.unwrap(), 34);

	let entries = services
		.state
		.entries(&root, Some("m.room.member"))
		.await
		.unwrap();
	assert_eq!(entries.len(), 32);
	assert!(
		entries
			.windows(2)
			.all(|w| w[0].0.state_key() < w[1].0.state_key()),
		"member state iterates in state_key order"
	);

	// The timeline walks backward from the head.
	let messages = services
		.timeline
		.messages_rev(room_id, None, 5)
		.await
		.unwrap();
	assert_eq!(messages.len(), 5);
	assert!(
		messages.windows(2).all(|w| w[0].0 > w[1].0),
		"reverse admission order"
	);
	assert_eq!(messages[0].1, prev.event_id().unwrap());
}

#[tokio::test]
async fn stranger_cannot_join_invite_only_room() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;
	let room_id = "!room:a.example";

	let create = create_room(&services, room_id, "@u:a.example");
	services
		.eval
		.eval(&create, &Opts::default())
		.await
		.unwrap();

	let join = member(&services, room_id, "@stranger:a.example", &create, 1);
	let result = services.eval.eval(&join, &Opts::default()).await;
	assert!(matches!(result, Err(Error::AuthFailed(_))));
}

#[tokio::test]
async fn historical_roots_resolve_old_state() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;
	let room_id = "!room:a.example";

	let create = create_room(&services, room_id, "@u:a.example");
	let at_create = services
		.eval
		.eval(&create, &Opts::default())
		.await
		.unwrap();

	let join = member(&services, room_id, "@u:a.example", &create, 1);
	services
		.eval
		.eval(&join, &Opts::default())
		.await
		.unwrap();

	// The old root still answers for the old state.
	let old_root = services
		.state
		.root_at(at_create.event_idx)
		.await
		.unwrap();
	assert_eq!(old_root, at_create.root);
	assert_eq!(services.state.count(&old_root).await.unwrap(), 1);
	assert!(
		services
			.state
			.get_at(&old_root, "m.room.member", "@u:a.example")
			.await
			.is_not_found()
	);
}

#[tokio::test]
async fn unsigned_event_is_rejected() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;

	let create = create_room(&services, "!room:a.example", "@u:a.example");
	let mut object = create.into_object();

	// Replace the signature with garbage of valid shape.
	let mut key_sigs = CanonicalJsonObject::new();
	key_sigs.insert("ed25519:0".into(), "AAAA".into());
	let mut sigs = CanonicalJsonObject::new();
	sigs.insert("a.example".into(), CanonicalJsonValue::Object(key_sigs));
	object.insert("signatures".into(), CanonicalJsonValue::Object(sigs));

	let forged = Event::from_object(object);
	let result = services.eval.eval(&forged, &Opts::default()).await;
	assert!(matches!(result, Err(Error::Signature(_))));
}

#[tokio::test]
async fn conf_room_reconciles_on_start() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;
	services.start().await.unwrap();

	// The conf room exists and carries every persistent item.
	assert_eq!(services.config.get("event.max_size").await.unwrap(), "65507");
	assert_eq!(
		services
			.config
			.get("federation.backfill_ids.limit.default")
			.await
			.unwrap(),
		"64"
	);

	// Setting an item admits a new state event and applies the override.
	services
		.config
		.set("federation.backfill_ids.limit.default", "128")
		.await
		.unwrap();

	assert_eq!(services.server.config.backfill_ids_limit_default(), 128);
	assert_eq!(
		services
			.config
			.get("federation.backfill_ids.limit.default")
			.await
			.unwrap(),
		"128"
	);
}
