pub mod config;
pub mod error;
pub mod log;
pub mod matrix;
pub mod runtime;
pub mod server;
pub mod utils;

pub use ::futures;
pub use ::http;
pub use ::ruma;
pub use ::smallstr;
pub use ::smallvec;
pub use ::tracing;
pub use config::Config;
pub use error::Error;
pub use log::{debug, debug_span, error, info, info_span, trace, trace_span, warn};
pub use matrix::{Event, EventIdx, StateKey, event, state};
pub use server::Server;
pub use utils::{implement, result, result::Result};

pub use crate as lattice_core;
