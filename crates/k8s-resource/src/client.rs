//! Kubernetes cluster connection management.

use std::{path::Path, time::Duration};

use kube::{
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("failed to get kube config from {path}")]
	ReadKubeconfig {
		path: String,
		#[source]
		source: KubeconfigError,
	},

	#[error("no context named `{0}` was found. Please check your kubeconfig")]
	ContextNotFound(String),

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// A client for one cluster, plus the context it was built from.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	/// Human-readable identifier for the cluster (context name or API server URL).
	cluster_identifier: String,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("cluster_identifier", &self.cluster_identifier)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect using the kubeconfig file at `path`.
	///
	/// `context` selects a kubeconfig context; the file's `current-context` is
	/// used when it is `None`.
	#[instrument(skip_all, fields(path = %path.display()))]
	pub async fn from_kubeconfig_path(
		path: &Path,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		let kubeconfig =
			Kubeconfig::read_from(path).map_err(|source| ConnectionError::ReadKubeconfig {
				path: path.display().to_string(),
				source,
			})?;
		Self::from_kubeconfig(kubeconfig, context).await
	}

	/// Connect using an already loaded kubeconfig.
	#[instrument(skip_all)]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		if let Some(name) = context {
			if !kubeconfig.contexts.iter().any(|c| c.name == name) {
				return Err(ConnectionError::ContextNotFound(name.to_string()));
			}
		}

		let context_name = context
			.map(str::to_string)
			.or_else(|| kubeconfig.current_context.clone());

		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: context_name.clone(),
				..Default::default()
			},
		)
		.await?;

		let cluster_identifier = match context_name {
			Some(name) => format!("{}  (context:{})", config.cluster_url, name),
			None => config.cluster_url.to_string(),
		};

		config.read_timeout = Some(DEFAULT_API_TIMEOUT);
		let client = Client::try_from(config)?;

		tracing::debug!(cluster = %cluster_identifier, "connected to cluster");

		Ok(Self {
			client,
			cluster_identifier,
		})
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Get the default namespace from the current context.
	pub fn default_namespace(&self) -> &str {
		self.client.default_namespace()
	}

	/// Get the cluster identifier (context name or API server URL).
	pub fn cluster_identifier(&self) -> &str {
		&self.cluster_identifier
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[tokio::test]
	async fn test_connect_context_not_found() {
		let result =
			ClusterConnection::from_kubeconfig(Kubeconfig::default(), Some("nonexistent")).await;
		assert_matches!(
			result,
			Err(ConnectionError::ContextNotFound(name)) if name == "nonexistent"
		);
	}

	#[tokio::test]
	async fn test_connect_missing_kubeconfig_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("missing-kubeconfig");

		let result = ClusterConnection::from_kubeconfig_path(&path, None).await;
		assert_matches!(result, Err(ConnectionError::ReadKubeconfig { .. }));
	}
}
