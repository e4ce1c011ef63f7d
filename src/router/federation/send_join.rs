//! `PUT /_matrix/federation/v1/send_join/{roomId}/{eventId}`
//!
//! Inject a join event into a room originating from a server without any
//! joined users in that room. Responds `[200, {auth_chain, state}]`.

use std::sync::Arc;

use axum::{
	Json,
	extract::{Path, State},
	response::IntoResponse,
};
use http::StatusCode;
use lattice_core::{Event, Result, err, event::Code};
use lattice_service::{Services, rooms::eval::Opts};
use serde_json::json;

use crate::response::MatrixError;

pub(crate) async fn put_send_join(
	State(services): State<Arc<Services>>,
	Path((room_id, event_id)): Path<(String, String)>,
	body: axum::body::Bytes,
) -> Result<impl IntoResponse, MatrixError> {
	if !services.globals.host_is_ours(&room_id) {
		return Err(err!(Request(
			"M_INVALID_ROOM_ID",
			StatusCode::FORBIDDEN,
			"Can only send_join for rooms on my host '{}'",
			services.globals.server_name()
		))
		.into());
	}

	let event = Event::from_slice(&body)?;

	if event.event_id() != Some(event_id.as_str()) {
		return Err(err!(Request(
			"M_MISMATCH_EVENT_ID",
			StatusCode::BAD_REQUEST,
			"ID of event in request body does not match path parameter."
		))
		.into());
	}

	if event.room_id() != Some(room_id.as_str()) {
		return Err(err!(Request(
			"M_MISMATCH_ROOM_ID",
			StatusCode::BAD_REQUEST,
			"ID of room in request body does not match path parameter."
		))
		.into());
	}

	if event.kind() != Some("m.room.member") {
		return Err(err!(Request(
			"M_INVALID_TYPE",
			StatusCode::BAD_REQUEST,
			"Event type must be m.room.member"
		))
		.into());
	}

	// Top-level membership is optional on the wire here; when present it
	// must agree.
	if event
		.membership()
		.is_some_and(|membership| membership != "join")
	{
		return Err(err!(Request(
			"M_INVALID_MEMBERSHIP",
			StatusCode::BAD_REQUEST,
			"Event membership state must be 'join'."
		))
		.into());
	}

	if event.content_membership() != Some("join") {
		return Err(err!(Request(
			"M_INVALID_CONTENT_MEMBERSHIP",
			StatusCode::BAD_REQUEST,
			"Event content.membership state must be 'join'."
		))
		.into());
	}

	let opts = Opts {
		non_conform: lattice_core::event::Conforms::mask(&[
			Code::MissingPrevState,
			Code::MissingMembership,
		]),
	};

	services.eval.eval(&event, &opts).await?;

	// The auth chain: the canonical ancestors out of the (now current)
	// room state.
	let mut auth_chain = Vec::new();
	let state_key = event.state_key().unwrap_or_default();
	for (kind, state_key) in [
		("m.room.create", ""),
		("m.room.power_levels", ""),
		("m.room.join_rules", ""),
		("m.room.member", state_key),
	] {
		match services.state.event(&room_id, kind, state_key).await {
			| Ok(event) => auth_chain.push(serde_json::to_value(event.object())?),
			| Err(e) if e.is_not_found() => {},
			| Err(e) => return Err(e.into()),
		}
	}

	let state = services
		.state
		.full_events(&room_id)
		.await?
		.iter()
		.map(|event| serde_json::to_value(event.object()))
		.collect::<Result<Vec<_>, _>>()?;

	Ok(Json(json!([200, {
		"auth_chain": auth_chain,
		"state": state,
	}])))
}
