mod manager;

use std::{net::IpAddr, path::{Path, PathBuf}};

use figment::{
	Figment,
	providers::{Env, Format, Toml},
};
use ruma::OwnedServerName;
use serde::Deserialize;

pub use self::manager::{ITEMS, Item, Manager};
use crate::{Result, err};

/// Server configuration; deserialized from the TOML config file merged
/// with `LATTICE_*` environment variables. Items listed in
/// [`manager::ITEMS`] can additionally be overridden at runtime through
/// the `!conf` room.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	/// Name of this homeserver; the host part of every local user, room
	/// and event identifier. Not changeable after the database exists.
	pub server_name: OwnedServerName,

	#[serde(default = "default_database_path")]
	pub database_path: PathBuf,

	#[serde(default = "default_address")]
	pub address: IpAddr,

	#[serde(default = "default_port")]
	pub port: u16,

	/// Tracing filter directives, e.g. "info" or "lattice_service=debug".
	#[serde(default = "default_log")]
	pub log: String,

	#[serde(default = "default_db_cache_capacity_mb")]
	pub db_cache_capacity_mb: f64,

	/// Maximum size of an event accepted for evaluation. The protocol
	/// hard cap is 65535; the default leaves headroom for envelopes.
	#[serde(default = "default_event_max_size")]
	pub event_max_size: usize,

	#[serde(default = "default_backfill_ids_limit")]
	pub backfill_ids_limit_default: usize,

	#[serde(default = "default_backfill_ids_limit_max")]
	pub backfill_ids_limit_max: usize,

	/// Bound on concurrently evaluating admissions per room; overflow is
	/// a soft rejection.
	#[serde(default = "default_eval_inflight_max")]
	pub eval_inflight_max: usize,

	/// Aggregate deadline for federation fan-out collectives, seconds.
	#[serde(default = "default_federation_timeout")]
	pub federation_timeout: u64,

	/// Per-attempt timeout for a single outbound federation request,
	/// seconds.
	#[serde(default = "default_request_timeout")]
	pub request_timeout: u64,
}

const EVENT_MAX_SIZE_HARD: usize = 65_535;

impl Config {
	/// Gather the raw configuration sources. The file is optional; the
	/// environment wins over it.
	pub fn load(path: Option<&Path>) -> Result<Figment> {
		let mut raw = Figment::new();
		if let Some(path) = path {
			raw = raw.merge(Toml::file(path));
		}

		Ok(raw.merge(Env::prefixed("LATTICE_").split("__")))
	}

	pub fn new(raw: &Figment) -> Result<Self> {
		let config: Self = raw.extract()?;
		Ok(config)
	}

	pub fn check(&self) -> Result {
		if self.port == 0 {
			return Err(err!(Config("port", "listening port cannot be 0")));
		}

		if self.event_max_size > EVENT_MAX_SIZE_HARD {
			return Err(err!(Config(
				"event_max_size",
				"cannot exceed the protocol limit of {EVENT_MAX_SIZE_HARD}"
			)));
		}

		if self.backfill_ids_limit_default > self.backfill_ids_limit_max {
			return Err(err!(Config(
				"backfill_ids_limit_default",
				"default cannot exceed backfill_ids_limit_max"
			)));
		}

		Ok(())
	}
}

fn default_database_path() -> PathBuf { "lattice.db".into() }

fn default_address() -> IpAddr { [127, 0, 0, 1].into() }

fn default_port() -> u16 { 8448 }

fn default_log() -> String { "info".into() }

fn default_db_cache_capacity_mb() -> f64 { 128.0 }

fn default_event_max_size() -> usize { 65_507 }

fn default_backfill_ids_limit() -> usize { 64 }

fn default_backfill_ids_limit_max() -> usize { 2048 }

fn default_eval_inflight_max() -> usize { 16 }

fn default_federation_timeout() -> u64 { 30 }

fn default_request_timeout() -> u64 { 5 }

#[cfg(test)]
mod tests {
	use figment::{Figment, providers::Serialized};

	use super::Config;

	fn minimal() -> Config {
		let raw = Figment::new().merge(Serialized::default("server_name", "a.example"));
		Config::new(&raw).expect("minimal config")
	}

	#[test]
	fn defaults() {
		let config = minimal();
		assert_eq!(config.port, 8448);
		assert_eq!(config.backfill_ids_limit_default, 64);
		assert_eq!(config.backfill_ids_limit_max, 2048);
		config.check().expect("defaults pass check");
	}

	#[test]
	fn check_rejects_oversized_events() {
		let mut config = minimal();
		config.event_max_size = 70_000;
		assert!(config.check().is_err());
	}
}
