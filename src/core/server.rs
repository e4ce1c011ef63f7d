use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::SystemTime,
};

use ruma::OwnedServerName;
use tokio::{runtime, sync::broadcast};

use crate::{Err, Result, config, config::Config};

/// Server runtime state; public portion
pub struct Server {
	/// Configured name of server. This is the same as the one in the config
	/// but developers can (and should) reference this string instead.
	pub name: OwnedServerName,

	/// Server-wide configuration instance
	pub config: config::Manager,

	/// Timestamp server was started; used for uptime.
	pub started: SystemTime,

	/// Shutdown pending indicator; server is shutting down. This is an
	/// observable used on shutdown and should not be modified.
	pub stopping: AtomicBool,

	/// Handle to the runtime
	pub runtime: Option<runtime::Handle>,

	/// Shutdown signal
	pub signal: broadcast::Sender<&'static str>,
}

impl Server {
	#[must_use]
	pub fn new(config: Config, runtime: Option<runtime::Handle>) -> Self {
		Self {
			name: config.server_name.clone(),
			config: config::Manager::new(config),
			started: SystemTime::now(),
			stopping: AtomicBool::new(false),
			runtime,
			signal: broadcast::channel::<&'static str>(1).0,
		}
	}

	pub fn shutdown(&self) -> Result {
		if self.stopping.swap(true, Ordering::AcqRel) {
			return Err!(Err("Shutdown already in progress"));
		}

		self.signal("SIGTERM").inspect_err(|_| {
			self.stopping.store(false, Ordering::Release);
		})
	}

	pub fn signal(&self, sig: &'static str) -> Result {
		self.signal.send(sig).ok();
		Ok(())
	}

	#[inline]
	pub async fn until_shutdown(self: &Arc<Self>) {
		while self.running() {
			self.signal.subscribe().recv().await.ok();
		}
	}

	#[inline]
	pub fn runtime(&self) -> &runtime::Handle {
		self.runtime
			.as_ref()
			.expect("runtime handle available in Server")
	}

	#[inline]
	pub fn check_running(&self) -> Result {
		use std::{io, io::ErrorKind::Interrupted};

		self.running()
			.then_some(())
			.ok_or_else(|| io::Error::new(Interrupted, "Server shutting down"))
			.map_err(Into::into)
	}

	#[inline]
	pub fn running(&self) -> bool { !self.is_stopping() }

	#[inline]
	pub fn is_stopping(&self) -> bool { self.stopping.load(Ordering::Relaxed) }

	#[inline]
	pub fn is_ours(&self, name: &str) -> bool { name == self.config.server_name }
}
