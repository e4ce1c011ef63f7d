//! The cooperative substrate is a single-OS-thread tokio runtime. Every
//! task is a cooperative context: suspension points are socket I/O,
//! database handoffs, sleeps and future awaits; there is no preemption
//! between them. Work posted to the loop executes in FIFO order.

use std::time::Duration;

use tokio::runtime::Builder;

use crate::{Result, Server, debug_info};

pub type Runtime = tokio::runtime::Runtime;
pub type Handle = tokio::runtime::Handle;

const WORKER_NAME: &str = "lattice:loop";
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

pub fn new() -> Result<Runtime> {
	let runtime = Builder::new_current_thread()
		.thread_name(WORKER_NAME)
		.enable_io()
		.enable_time()
		.build()?;

	Ok(runtime)
}

/// Tear down the runtime after the server has stopped. Tasks which have
/// not completed by the deadline are dropped at their next suspension
/// point; cancellation is idempotent and holds no transactions open.
pub fn shutdown(server: &Server, runtime: Runtime) -> Result {
	debug_assert!(server.is_stopping(), "server should be stopping before runtime shutdown");

	runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
	debug_info!("Runtime shutdown complete");

	Ok(())
}
