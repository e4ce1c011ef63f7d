//! `GET /_matrix/federation/v1/version`

use axum::{Json, response::IntoResponse};
use serde_json::json;

pub(crate) async fn get_version() -> impl IntoResponse {
	Json(json!({
		"server": {
			"name": "lattice",
			"version": env!("CARGO_PKG_VERSION"),
		}
	}))
}
