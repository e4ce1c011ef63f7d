//! `GET /_matrix/federation/v1/backfill_ids/{roomId}?v=&limit=`
//!
//! Event ids walking the room backward from `v` (the head by default),
//! up to `limit`, clamped by the configured maximum.

use std::sync::Arc;

use axum::{
	Json,
	extract::{Path, Query, State},
	response::IntoResponse,
};
use lattice_core::{Result, err};
use lattice_service::Services;
use serde::Deserialize;
use serde_json::json;

use crate::response::MatrixError;

#[derive(Deserialize)]
pub(crate) struct BackfillQuery {
	v: Option<String>,
	limit: Option<usize>,
}

pub(crate) async fn get_backfill_ids(
	State(services): State<Arc<Services>>,
	Path(room_id): Path<String>,
	Query(query): Query<BackfillQuery>,
) -> Result<impl IntoResponse, MatrixError> {
	let limit = query
		.limit
		.unwrap_or_else(|| services.server.config.backfill_ids_limit_default())
		.min(services.server.config.backfill_ids_limit_max());

	let from = match query.v {
		| Some(ref v) => {
			let event_idx = services.index.index(v).await?;
			if event_idx == 0 {
				return Err(err!(NotFound("{v} is not known here")).into());
			}

			Some(event_idx)
		},
		| None => None,
	};

	let pdu_ids: Vec<String> = services
		.timeline
		.messages_rev(&room_id, from, limit)
		.await?
		.into_iter()
		.map(|(_, event_id)| event_id)
		.collect();

	Ok(Json(json!({ "pdu_ids": pdu_ids })))
}
