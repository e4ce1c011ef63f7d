use lattice::{Server, args};
use lattice_core::{Result, debug_info, runtime};

fn main() -> Result {
	let args = args::parse();
	let runtime = runtime::new()?;
	let server = Server::new(Some(&args), Some(runtime.handle()))?;

	lattice::exec(&server, runtime)?;

	debug_info!("Exit");
	Ok(())
}
