//! Patch command handler.

use std::{fmt, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use k8s_resource::{load_patch_file, GroupVersionResource, PatchType, ResourceEngine};
use tracing::instrument;

use super::{util::create_tokio_runtime, ConnectionArgs};

/// Patch content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PatchFormat {
	/// JSON merge patch
	#[default]
	Merge,

	/// Kubernetes strategic merge patch (built-in kinds only)
	Strategic,
}

impl fmt::Display for PatchFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PatchFormat::Merge => write!(f, "merge"),
			PatchFormat::Strategic => write!(f, "strategic"),
		}
	}
}

impl From<PatchFormat> for PatchType {
	fn from(format: PatchFormat) -> Self {
		match format {
			PatchFormat::Merge => PatchType::Merge,
			PatchFormat::Strategic => PatchType::Strategic,
		}
	}
}

#[derive(Args)]
pub struct PatchArgs {
	/// Patch file. Files ending in .yaml are converted to JSON, anything else
	/// is read as JSON
	pub file: PathBuf,

	/// Resource to patch, as [group/]version/resource (e.g. apps/v1/deployments)
	#[arg(long, value_parser = parse_resource)]
	pub resource: GroupVersionResource,

	/// Name of the resource to patch
	#[arg(long)]
	pub name: String,

	/// Patch a cluster-scoped resource. Takes precedence over --namespace
	#[arg(long)]
	pub cluster_scoped: bool,

	/// Patch content type
	#[arg(long = "type", default_value_t = PatchFormat::Merge)]
	pub patch_type: PatchFormat,
}

fn parse_resource(s: &str) -> Result<GroupVersionResource, String> {
	GroupVersionResource::parse(s)
		.ok_or_else(|| format!("expected [group/]version/resource, got `{s}`"))
}

/// Run the patch command.
pub fn run<W: Write>(args: PatchArgs, connection: ConnectionArgs, writer: W) -> Result<()> {
	let runtime = create_tokio_runtime()?;
	runtime.block_on(async {
		let conn = connection.connect().await?;
		let engine = connection.engine(&conn);
		let namespace = if args.cluster_scoped {
			None
		} else {
			Some(
				connection
					.namespace
					.clone()
					.unwrap_or_else(|| engine.default_namespace().to_string()),
			)
		};
		patch_resource(&engine, &args, namespace.as_deref(), writer).await
	})
}

/// Patch one named resource with the contents of the patch file.
#[instrument(skip_all, fields(resource = %args.resource, name = %args.name))]
pub async fn patch_resource<W: Write>(
	engine: &ResourceEngine,
	args: &PatchArgs,
	namespace: Option<&str>,
	mut writer: W,
) -> Result<()> {
	let patch = load_patch_file(&args.file)?;
	engine
		.patch(
			&args.resource,
			namespace,
			&args.name,
			&patch,
			args.patch_type.into(),
		)
		.await
		.with_context(|| format!("patching with {}", args.file.display()))?;

	match namespace {
		Some(ns) => writeln!(writer, "{} {}/{} patched", args.resource.resource, ns, args.name)?,
		None => writeln!(writer, "{} {} patched", args.resource.resource, args.name)?,
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_resource() {
		assert_eq!(
			parse_resource("apps/v1/deployments").unwrap(),
			GroupVersionResource::new("apps", "v1", "deployments")
		);
		assert!(parse_resource("deployments")
			.unwrap_err()
			.contains("[group/]version/resource"));
	}
}
