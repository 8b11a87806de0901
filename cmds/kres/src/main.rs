use anyhow::Result;
use clap::{Parser, Subcommand};
use kres::{
	commands::{self, util::BrokenPipeGuard, ConnectionArgs},
	telemetry,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "kres")]
#[command(about = "Apply, delete and patch Kubernetes resources from YAML files", long_about = None)]
#[command(version)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[command(flatten)]
	connection: ConnectionArgs,

	/// Log level (trace, debug, info, warn, error). Defaults to $RUST_LOG, then info
	#[arg(long, global = true, env = "KRES_LOG_LEVEL")]
	log_level: Option<Level>,
}

#[derive(Subcommand)]
enum Commands {
	/// Create or update every resource in a manifest file
	Apply(commands::apply::ApplyArgs),

	/// Delete every resource in a manifest file
	Delete(commands::delete::DeleteArgs),

	/// Merge-patch a single resource with the contents of a file
	Patch(commands::patch::PatchArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let _telemetry = telemetry::init(cli.log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Apply(args) => commands::apply::run(args, cli.connection, stdout),
		Commands::Delete(args) => commands::delete::run(args, cli.connection, stdout),
		Commands::Patch(args) => commands::patch::run(args, cli.connection, stdout),
	}
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn test_cli_definition() {
		Cli::command().debug_assert();
	}

	#[test]
	fn test_parse_patch() {
		let cli = Cli::try_parse_from([
			"kres",
			"patch",
			"labels.yaml",
			"--resource",
			"apps/v1/deployments",
			"--name",
			"web",
			"-n",
			"team-a",
			"--log-level",
			"debug",
		])
		.unwrap();

		assert_eq!(cli.connection.namespace.as_deref(), Some("team-a"));
		assert_eq!(cli.log_level, Some(Level::DEBUG));
		let Commands::Patch(args) = cli.command else {
			panic!("expected patch command");
		};
		assert_eq!(args.name, "web");
		assert_eq!(args.resource.to_string(), "apps/v1, Resource=deployments");
		assert_eq!(args.patch_type, commands::patch::PatchFormat::Merge);
	}

	#[test]
	fn test_parse_rejects_bad_resource() {
		let result = Cli::try_parse_from([
			"kres",
			"patch",
			"labels.yaml",
			"--resource",
			"deployments",
			"--name",
			"web",
		]);
		assert!(result.is_err());
	}
}
