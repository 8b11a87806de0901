//! Apply command handler.
//!
//! Creates every resource in a manifest file, updating the ones that already
//! exist.

use std::{
	io::Write,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Args;
use k8s_resource::{apply_file, ApplyOutcome, Reconciled, ResourceEngine};
use tracing::instrument;

use super::{util::create_tokio_runtime, ConnectionArgs};

#[derive(Args)]
pub struct ApplyArgs {
	/// Multi-document YAML file to apply
	pub file: PathBuf,
}

/// Run the apply command.
pub fn run<W: Write>(args: ApplyArgs, connection: ConnectionArgs, writer: W) -> Result<()> {
	let runtime = create_tokio_runtime()?;
	runtime.block_on(async {
		let conn = connection.connect().await?;
		let mut engine = connection.engine(&conn);
		apply_manifests(&mut engine, &args.file, writer).await?;
		Ok(())
	})
}

/// Apply every document in `file`, printing one line per resource.
#[instrument(skip_all, fields(file = %file.display()))]
pub async fn apply_manifests<W: Write>(
	engine: &mut ResourceEngine,
	file: &Path,
	mut writer: W,
) -> Result<Vec<Reconciled<ApplyOutcome>>> {
	let applied = apply_file(engine, file)
		.await
		.with_context(|| format!("applying {}", file.display()))?;

	for result in &applied {
		writeln!(writer, "{} {}", result.resource, result.outcome)?;
	}
	tracing::debug!(count = applied.len(), "applied manifests");
	Ok(applied)
}
