use std::sync::Arc;

use axum::{
	Router,
	routing::{get, put},
};
use lattice_service::Services;
use tower_http::trace::TraceLayer;

use crate::{federation, response::MatrixError};

pub fn build(services: &Arc<Services>) -> Router {
	Router::new()
		.route("/_matrix/federation/v1/version", get(federation::version::get_version))
		.route(
			"/_matrix/federation/v1/send_join/{room_id}/{event_id}",
			put(federation::send_join::put_send_join),
		)
		.route(
			"/_matrix/federation/v1/backfill_ids/{room_id}",
			get(federation::backfill_ids::get_backfill_ids),
		)
		.fallback(unrecognized)
		.layer(TraceLayer::new_for_http())
		.with_state(services.clone())
}

async fn unrecognized() -> MatrixError {
	MatrixError(lattice_core::err!(Request(
		"M_UNRECOGNIZED",
		http::StatusCode::NOT_FOUND,
		"Unrecognized request"
	)))
}
