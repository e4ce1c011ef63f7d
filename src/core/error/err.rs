//! Error construction macros. `err!` builds an [`Error`](super::Error)
//! variant from a format expression; `Err!` wraps it for early return.
//!
//! ```ignore
//! return Err!(NotFound("no index found for {event_id}"));
//! err!(Database("column write failed: {e}"))
//! ```

#[macro_export]
macro_rules! err {
	(Request($kind:literal, $code:expr_2021, $($t:tt)+)) => {
		$crate::error::Error::Request($kind, format!($($t)+).into(), $code)
	};

	(Config($item:literal, $($t:tt)+)) => {
		$crate::error::Error::Config($item, format!($($t)+).into())
	};

	($variant:ident($($t:tt)+)) => {
		$crate::error::Error::$variant(format!($($t)+).into())
	};
}

#[macro_export]
macro_rules! Err {
	($($t:tt)+) => {
		Err($crate::err!($($t)+))
	};
}
