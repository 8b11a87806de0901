//! Delete command handler.

use std::{
	io::Write,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Args;
use k8s_resource::{delete_file, DeleteOutcome, Reconciled, ResourceEngine};
use tracing::instrument;

use super::{util::create_tokio_runtime, ConnectionArgs};

#[derive(Args)]
pub struct DeleteArgs {
	/// Multi-document YAML file whose resources should be deleted
	pub file: PathBuf,
}

/// Run the delete command.
pub fn run<W: Write>(args: DeleteArgs, connection: ConnectionArgs, writer: W) -> Result<()> {
	let runtime = create_tokio_runtime()?;
	runtime.block_on(async {
		let conn = connection.connect().await?;
		let mut engine = connection.engine(&conn);
		delete_manifests(&mut engine, &args.file, writer).await?;
		Ok(())
	})
}

/// Delete every document in `file`. Resources that are already gone are
/// reported but do not fail the command.
#[instrument(skip_all, fields(file = %file.display()))]
pub async fn delete_manifests<W: Write>(
	engine: &mut ResourceEngine,
	file: &Path,
	mut writer: W,
) -> Result<Vec<Reconciled<DeleteOutcome>>> {
	let deleted = delete_file(engine, file)
		.await
		.with_context(|| format!("deleting {}", file.display()))?;

	for result in &deleted {
		writeln!(writer, "{} {}", result.resource, result.outcome)?;
	}
	Ok(deleted)
}
