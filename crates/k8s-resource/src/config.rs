//! Kubeconfig location resolution.
//!
//! The kubeconfig is looked up in this order:
//! 1. `TEST_KUBECONFIG`
//! 2. `KUBECONFIG`
//! 3. `$HOME/.kube/config`

use std::path::PathBuf;

use thiserror::Error;

/// Kubeconfig override used by test runs against a dedicated cluster.
pub const TEST_KUBECONFIG_ENV: &str = "TEST_KUBECONFIG";

/// Standard kubeconfig environment variable.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("unable to find kubeconfig")]
	KubeconfigNotFound,
}

/// Resolve the kubeconfig path from the process environment.
pub fn kubeconfig_location() -> Result<PathBuf, ConfigError> {
	kubeconfig_location_with(
		|key| std::env::var(key).ok(),
		std::env::var_os("HOME").map(PathBuf::from),
	)
}

/// Resolve the kubeconfig path from an arbitrary variable lookup and home
/// directory. Empty variables are ignored.
pub fn kubeconfig_location_with(
	lookup: impl Fn(&str) -> Option<String>,
	home: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
	for key in [TEST_KUBECONFIG_ENV, KUBECONFIG_ENV] {
		if let Some(path) = lookup(key).filter(|p| !p.is_empty()) {
			return Ok(PathBuf::from(path));
		}
	}

	home.filter(|h| !h.as_os_str().is_empty())
		.map(|h| h.join(".kube").join("config"))
		.ok_or(ConfigError::KubeconfigNotFound)
}
