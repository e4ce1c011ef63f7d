use axum::{
	Json,
	response::{IntoResponse, Response},
};
use lattice_core::{Error, debug_error};
use serde_json::json;

/// Wraps the core error for the wire: HTTP status from the variant, the
/// Matrix `errcode`, and the sanitized message.
pub(crate) struct MatrixError(pub(crate) Error);

impl<E> From<E> for MatrixError
where
	E: Into<Error>,
{
	fn from(e: E) -> Self { Self(e.into()) }
}

impl IntoResponse for MatrixError {
	fn into_response(self) -> Response {
		let error = self.0;
		debug_error!("request failed: {error}");

		let body = Json(json!({
			"errcode": error.kind(),
			"error": error.sanitized_message(),
		}));

		(error.status_code(), body).into_response()
	}
}
