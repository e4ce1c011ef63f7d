#![cfg(test)]

use std::sync::Arc;

use axum::{
	body::Body,
	http::{Request, StatusCode},
};
use lattice_core::{
	Config, Server,
	event::Builder,
	matrix::canonical::{b64encode_unpadded, parse, public_key},
};
use lattice_service::{Services, rooms::eval::Opts};
use ring::{rand::SystemRandom, signature::Ed25519KeyPair};
use tower::ServiceExt;

async fn services(dir: &tempfile::TempDir) -> Arc<Services> {
	use figment::providers::Serialized;

	let raw = figment::Figment::new()
		.merge(Serialized::default("server_name", "a.example"))
		.merge(Serialized::default("database_path", dir.path().to_str().unwrap()));

	let config = Config::new(&raw).unwrap();
	let server = Arc::new(Server::new(config, None));
	Services::build(server).await.unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();

	serde_json::from_slice(&bytes).unwrap()
}

/// Admit a create event, the creator's join and a public join rule so a
/// remote user may join. Returns the id of the latest event.
async fn public_room(services: &Arc<Services>, room_id: &str, creator: &str) -> String {
	let keypair = services.server_keys.keypair();
	let key_id = services.server_keys.active_key_id();

	let content = parse(format!(r#"{{"creator": "{creator}"}}"#).as_bytes()).unwrap();
	let create = Builder::new("m.room.create", creator, room_id)
		.state("", content)
		.build(keypair, key_id)
		.unwrap();
	services.eval.eval(&create, &Opts::default()).await.unwrap();

	let content = parse(br#"{"membership": "join"}"#).unwrap();
	let mut join = Builder::new("m.room.member", creator, room_id).state(creator, content);
	join.membership = Some("join".into());
	join.depth = 1;
	join.prev_events = vec![(create.event_id().unwrap().to_owned(), Default::default())];
	let join = join.build(keypair, key_id).unwrap();
	services.eval.eval(&join, &Opts::default()).await.unwrap();

	let content = parse(br#"{"join_rule": "public"}"#).unwrap();
	let mut rules = Builder::new("m.room.join_rules", creator, room_id).state("", content);
	rules.depth = 2;
	rules.prev_events = vec![(join.event_id().unwrap().to_owned(), Default::default())];
	let rules = rules.build(keypair, key_id).unwrap();
	services.eval.eval(&rules, &Opts::default()).await.unwrap();

	rules.event_id().unwrap().to_owned()
}

#[tokio::test]
async fn send_join_admits_remote_member() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;
	let room_id = "!room:a.example";
	let head = public_room(&services, room_id, "@creator:a.example").await;

	// The joining server's key becomes known ahead of the join.
	let doc = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
	let remote_key = Ed25519KeyPair::from_pkcs8(doc.as_ref()).unwrap();
	services
		.server_keys
		.add_signing_key("b.example", "ed25519:0", &b64encode_unpadded(public_key(&remote_key)))
		.await
		.unwrap();

	let content = parse(br#"{"membership": "join"}"#).unwrap();
	let mut join =
		Builder::new("m.room.member", "@guest:b.example", room_id).state("@guest:b.example", content);
	join.depth = 3;
	join.prev_events = vec![(head, Default::default())];
	let join = join.build(&remote_key, "ed25519:0").unwrap();
	let event_id = join.event_id().unwrap().to_owned();

	let request = Request::builder()
		.method("PUT")
		.uri(format!("/_matrix/federation/v1/send_join/{room_id}/{event_id}"))
		.header("content-type", "application/json")
		.body(Body::from(serde_json::to_vec(join.object()).unwrap()))
		.unwrap();

	let response = crate::build(&services).oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);

	let body = body_json(response).await;
	assert_eq!(body[0], 200);

	let auth_chain = body[1]["auth_chain"].as_array().unwrap();
	assert!(
		auth_chain
			.iter()
			.any(|event| event["type"] == "m.room.create"),
		"auth chain carries the create event"
	);

	let state = body[1]["state"].as_array().unwrap();
	assert!(
		state
			.iter()
			.any(|event| event["event_id"] == event_id.as_str()),
		"state carries the admitted member event"
	);
}

#[tokio::test]
async fn send_join_rejects_wrong_event_type() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;
	let room_id = "!room:a.example";
	public_room(&services, room_id, "@creator:a.example").await;

	let content = parse(br#"{"name": "not a join"}"#).unwrap();
	let mut event =
		Builder::new("m.room.name", "@creator:a.example", room_id).state("", content);
	event.depth = 3;
	event.prev_events = vec![("$x:a.example".to_owned(), Default::default())];
	let event = event
		.build(services.server_keys.keypair(), services.server_keys.active_key_id())
		.unwrap();
	let event_id = event.event_id().unwrap().to_owned();

	let request = Request::builder()
		.method("PUT")
		.uri(format!("/_matrix/federation/v1/send_join/{room_id}/{event_id}"))
		.header("content-type", "application/json")
		.body(Body::from(serde_json::to_vec(event.object()).unwrap()))
		.unwrap();

	let response = crate::build(&services).oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	let body = body_json(response).await;
	assert_eq!(body["errcode"], "M_INVALID_TYPE");
}

#[tokio::test]
async fn backfill_ids_walk_backward_with_limit() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;
	let room_id = "!room:a.example";
	let head = public_room(&services, room_id, "@creator:a.example").await;

	let request = Request::builder()
		.method("GET")
		.uri(format!("/_matrix/federation/v1/backfill_ids/{room_id}?limit=2"))
		.body(Body::empty())
		.unwrap();

	let response = crate::build(&services).oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);

	let body = body_json(response).await;
	let pdu_ids = body["pdu_ids"].as_array().unwrap();
	assert_eq!(pdu_ids.len(), 2);
	assert_eq!(pdu_ids[0], head.as_str(), "walk starts at the room head");
}

#[tokio::test]
async fn unknown_route_is_unrecognized() {
	let dir = tempfile::tempdir().unwrap();
	let services = services(&dir).await;

	let request = Request::builder()
		.method("GET")
		.uri("/_matrix/federation/v1/no_such_thing")
		.body(Body::empty())
		.unwrap();

	let response = crate::build(&services).oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	let body = body_json(response).await;
	assert_eq!(body["errcode"], "M_UNRECOGNIZED");
}
