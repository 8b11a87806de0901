//! Command handlers.

pub mod apply;
pub mod delete;
pub mod patch;
pub mod util;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use k8s_resource::{kubeconfig_location, ClusterConnection, ResourceEngine};

/// Cluster selection shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
	/// Path to the kubeconfig file. Falls back to $TEST_KUBECONFIG, $KUBECONFIG,
	/// then ~/.kube/config
	#[arg(long, global = true)]
	pub kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to use instead of the current context
	#[arg(long, global = true)]
	pub context: Option<String>,

	/// Namespace for namespaced resources, overriding the one in the manifests
	#[arg(short = 'n', long, global = true, env = "KRES_NAMESPACE")]
	pub namespace: Option<String>,
}

impl ConnectionArgs {
	/// Connect to the selected cluster.
	pub async fn connect(&self) -> Result<ClusterConnection> {
		let path = match &self.kubeconfig {
			Some(path) => path.clone(),
			None => kubeconfig_location()?,
		};
		ClusterConnection::from_kubeconfig_path(&path, self.context.as_deref())
			.await
			.with_context(|| format!("connecting with kubeconfig {}", path.display()))
	}

	/// Engine for `connection` that honours `--namespace`.
	pub fn engine(&self, connection: &ClusterConnection) -> ResourceEngine {
		ResourceEngine::builder()
			.client(connection.client().clone())
			.maybe_namespace_override(self.namespace.clone())
			.build()
	}
}
