use std::path::PathBuf;

use clap::Parser;
use figment::{Figment, providers::Serialized};
use lattice_core::Result;

/// Command-line arguments. Anything given here wins over the config
/// file and the environment.
#[derive(Debug, Default, Parser)]
#[command(name = "lattice", version, about)]
pub struct Args {
	/// Path to the configuration file
	#[arg(short, long)]
	pub config: Option<PathBuf>,

	/// Name of this homeserver
	#[arg(long)]
	pub server_name: Option<String>,

	/// Path to the database directory
	#[arg(long)]
	pub database_path: Option<PathBuf>,

	/// Tracing filter directives
	#[arg(long)]
	pub log: Option<String>,
}

#[must_use]
pub fn parse() -> Args { Args::parse() }

/// Layer the argument overrides onto the raw configuration sources.
pub fn update(mut raw: Figment, args: &Args) -> Result<Figment> {
	if let Some(ref server_name) = args.server_name {
		raw = raw.merge(Serialized::default("server_name", server_name));
	}

	if let Some(ref database_path) = args.database_path {
		raw = raw.merge(Serialized::default("database_path", database_path));
	}

	if let Some(ref log) = args.log {
		raw = raw.merge(Serialized::default("log", log));
	}

	Ok(raw)
}
