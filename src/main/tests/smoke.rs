#![cfg(test)]

use lattice::{Server, args::Args};
use lattice_core::{Result, runtime};

fn test_args(dir: &tempfile::TempDir) -> Args {
	Args {
		server_name: Some("a.example".into()),
		database_path: Some(dir.path().into()),
		log: Some("warn".into()),
		..Default::default()
	}
}

#[test]
fn dummy() {}

#[test]
#[should_panic = "dummy"]
fn panic_dummy() { panic!("dummy") }

#[test]
fn server_builds() -> Result {
	let dir = tempfile::tempdir()?;
	let args = test_args(&dir);
	let runtime = runtime::new()?;
	let server = Server::new(Some(&args), Some(runtime.handle()))?;

	assert!(server.server.running());
	assert!(server.server.is_ours("a.example"));

	server.server.shutdown()?;
	runtime::shutdown(&server.server, runtime)
}

#[test]
fn services_start_and_stop() -> Result {
	let dir = tempfile::tempdir()?;
	let args = test_args(&dir);
	let runtime = runtime::new()?;
	let server = Server::new(Some(&args), Some(runtime.handle()))?;

	runtime.block_on(async {
		lattice::async_start(&server).await?;
		lattice::async_stop(&server).await
	})?;

	server.server.shutdown()?;
	runtime::shutdown(&server.server, runtime)
}
