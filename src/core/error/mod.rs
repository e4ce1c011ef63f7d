mod err;

use std::{borrow::Cow, convert::Infallible, sync::PoisonError};

use crate::matrix::event::Conforms;

#[derive(thiserror::Error)]
pub enum Error {
	// std
	#[error(transparent)]
	Fmt(#[from] std::fmt::Error),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	ParseInt(#[from] std::num::ParseIntError),
	#[error(transparent)]
	SystemTime(#[from] std::time::SystemTimeError),
	#[error(transparent)]
	TryFromInt(#[from] std::num::TryFromIntError),
	#[error(transparent)]
	TryFromSlice(#[from] std::array::TryFromSliceError),
	#[error(transparent)]
	Utf8(#[from] std::str::Utf8Error),

	// third-party
	#[error(transparent)]
	Clap(#[from] clap::error::Error),
	#[error(transparent)]
	Figment(#[from] figment::error::Error),
	#[error(transparent)]
	Http(#[from] http::Error),
	#[error("Join error: {0}")]
	JoinError(#[from] tokio::task::JoinError),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	#[error(transparent)]
	Mxid(#[from] ruma::IdParseError),
	#[error("Mutex poisoned: {0}")]
	Poison(Cow<'static, str>),
	#[error("Tracing filter error: {0}")]
	TracingFilter(#[from] tracing_subscriber::filter::ParseError),

	// lattice
	#[error("{0}")]
	AlreadyExists(Cow<'static, str>),
	#[error("Authorization failed: {0}")]
	AuthFailed(Cow<'static, str>),
	#[error("Bad JSON: {0}")]
	BadJson(Cow<'static, str>),
	#[error("Cancelled: {0}")]
	Cancelled(Cow<'static, str>),
	#[error("Event does not conform: {0}")]
	Conformance(Conforms),
	#[error("There was a problem with the '{0}' directive in your configuration: {1}")]
	Config(&'static str, Cow<'static, str>),
	#[error("{0}")]
	Database(Cow<'static, str>),
	#[error("Content hash mismatch: {0}")]
	HashMismatch(Cow<'static, str>),
	#[error("{0}")]
	Limited(Cow<'static, str>),
	#[error("{0}")]
	NotFound(Cow<'static, str>),
	#[error("{1}")]
	Request(&'static str, Cow<'static, str>, http::StatusCode),
	#[error("Signature verification failed: {0}")]
	Signature(Cow<'static, str>),
	#[error("Timeout: {0}")]
	Timeout(Cow<'static, str>),

	// unique / untyped
	#[error("{0}")]
	Err(Cow<'static, str>),
}

impl Error {
	/// Returns the Matrix error code for the client-facing response body.
	pub fn kind(&self) -> &'static str {
		match self {
			| Self::AlreadyExists(..) => "M_DUPLICATE",
			| Self::AuthFailed(..) => "M_FORBIDDEN",
			| Self::BadJson(..) | Self::Json(..) => "M_BAD_JSON",
			| Self::Conformance(..) => "M_INVALID_PARAM",
			| Self::Limited(..) => "M_LIMIT_EXCEEDED",
			| Self::Mxid(..) => "M_INVALID_PARAM",
			| Self::NotFound(..) => "M_NOT_FOUND",
			| Self::Request(kind, ..) => kind,
			| Self::Signature(..) | Self::HashMismatch(..) => "M_UNAUTHORIZED",
			| _ => "M_UNKNOWN",
		}
	}

	/// Returns the HTTP error code or closest approximation based on error
	/// variant.
	pub fn status_code(&self) -> http::StatusCode {
		use http::StatusCode;

		match self {
			| Self::AlreadyExists(..) => StatusCode::CONFLICT,
			| Self::AuthFailed(..) => StatusCode::FORBIDDEN,
			| Self::BadJson(..) | Self::Json(..) | Self::Mxid(..) | Self::Conformance(..) =>
				StatusCode::BAD_REQUEST,
			| Self::Limited(..) => StatusCode::TOO_MANY_REQUESTS,
			| Self::NotFound(..) => StatusCode::NOT_FOUND,
			| Self::Request(.., code) => *code,
			| Self::Signature(..) | Self::HashMismatch(..) => StatusCode::FORBIDDEN,
			| Self::Timeout(..) => StatusCode::GATEWAY_TIMEOUT,
			| _ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Sanitizes public-facing errors that can leak sensitive information.
	pub fn sanitized_message(&self) -> String {
		match self {
			| Self::Database(..) => String::from("Database error occurred."),
			| Self::Io(..) => String::from("I/O error occurred."),
			| _ => format!("{self}"),
		}
	}

	/// Returns true for "not found" errors. Often used to eliminate a
	/// contained Option with a Result where Ok(None) is instead Err(e) if
	/// e.is_not_found().
	#[inline]
	pub fn is_not_found(&self) -> bool { self.status_code() == http::StatusCode::NOT_FOUND }

	/// Transient errors are eligible for retry with backoff; everything
	/// else is terminal for the operation which produced it.
	#[inline]
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Database(..) | Self::Io(..) | Self::Timeout(..))
	}
}

impl std::fmt::Debug for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{self}")
	}
}

impl<T> From<PoisonError<T>> for Error {
	#[cold]
	#[inline(never)]
	fn from(e: PoisonError<T>) -> Self { Self::Poison(e.to_string().into()) }
}

#[allow(clippy::fallible_impl_from)]
impl From<Infallible> for Error {
	#[cold]
	#[inline(never)]
	fn from(_e: Infallible) -> Self {
		panic!("infallible error should never exist");
	}
}
