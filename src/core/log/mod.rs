//! Logging is the `tracing` ecosystem; this module re-exports the level
//! macros used throughout the workspace and owns subscriber setup.

pub use tracing::{debug, debug_span, error, info, info_span, trace, trace_span, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::{Config, Result};

/// Install the global subscriber. Called once from the binary before any
/// services spin up; tests leave the default subscriber alone.
pub fn init(config: &Config) -> Result {
	let filter = EnvFilter::try_new(&config.log)?;
	let fmt_layer = fmt::Layer::new().with_target(false);

	// A second init (another server in the same process, tests) keeps
	// the first subscriber.
	if let Err(e) = tracing_subscriber::registry()
		.with(filter)
		.with(fmt_layer)
		.try_init()
	{
		debug!("logging already initialized: {e}");
	}

	Ok(())
}

/// Event at info level in debug-mode; debug level in release-mode.
#[macro_export]
macro_rules! debug_info {
	($($x:tt)+) => {
		if cfg!(debug_assertions) {
			$crate::tracing::info!($($x)+);
		} else {
			$crate::tracing::debug!($($x)+);
		}
	}
}

/// Event at warn level in debug-mode; debug level in release-mode.
#[macro_export]
macro_rules! debug_warn {
	($($x:tt)+) => {
		if cfg!(debug_assertions) {
			$crate::tracing::warn!($($x)+);
		} else {
			$crate::tracing::debug!($($x)+);
		}
	}
}

/// Event at error level in debug-mode; debug level in release-mode.
#[macro_export]
macro_rules! debug_error {
	($($x:tt)+) => {
		if cfg!(debug_assertions) {
			$crate::tracing::error!($($x)+);
		} else {
			$crate::tracing::debug!($($x)+);
		}
	}
}
