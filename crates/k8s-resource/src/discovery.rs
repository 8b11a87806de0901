//! Kind to REST resource mapping backed by the cluster's discovery API.
//!
//! Discovery is deferred: a group/version is only queried the first time a
//! document of that kind is seen, and the answer is kept for the lifetime of
//! the mapper.

use std::{collections::HashMap, fmt};

use kube::{
	core::GroupVersionKind,
	discovery::{oneshot::pinned_kind, ApiResource, Scope},
	Client,
};
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while resolving a kind.
#[derive(Debug, Error)]
pub enum MappingError {
	#[error("failed to map resource kind {api_version}/{kind}")]
	UnknownKind {
		api_version: String,
		kind: String,
		#[source]
		source: Box<kube::Error>,
	},
}

/// Kubernetes API resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
	/// Resource is namespaced (e.g., Deployment, Secret).
	Namespaced,

	/// Resource is cluster-wide (e.g., Namespace, ClusterRole).
	ClusterWide,
}

/// A kind resolved to the REST resource that serves it.
#[derive(Debug, Clone)]
pub struct ResourceMapping {
	pub api_resource: ApiResource,
	pub scope: ResourceScope,
}

impl ResourceMapping {
	pub fn is_namespaced(&self) -> bool {
		self.scope == ResourceScope::Namespaced
	}
}

/// Group, version and plural resource name of a REST collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionResource {
	pub group: String,
	pub version: String,
	pub resource: String,
}

impl GroupVersionResource {
	pub fn new(group: &str, version: &str, resource: &str) -> Self {
		Self {
			group: group.to_string(),
			version: version.to_string(),
			resource: resource.to_string(),
		}
	}

	/// Parse `group/version/resource`, or `version/resource` for the core group.
	pub fn parse(s: &str) -> Option<Self> {
		let parts: Vec<&str> = s.split('/').collect();
		let gvr = match parts.as_slice() {
			[version, resource] => Self::new("", version, resource),
			[group, version, resource] => Self::new(group, version, resource),
			_ => return None,
		};
		if gvr.version.is_empty() || gvr.resource.is_empty() {
			return None;
		}
		Some(gvr)
	}

	pub fn api_version(&self) -> String {
		if self.group.is_empty() {
			self.version.clone()
		} else {
			format!("{}/{}", self.group, self.version)
		}
	}

	/// An [`ApiResource`] suitable for requests that only need the URL path.
	pub fn api_resource(&self) -> ApiResource {
		let gvk = GroupVersionKind::gvk(&self.group, &self.version, "");
		ApiResource::from_gvk_with_plural(&gvk, &self.resource)
	}
}

impl fmt::Display for GroupVersionResource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}, Resource={}", self.api_version(), self.resource)
	}
}

/// Memory-cached REST mapper.
pub struct RestMapper {
	client: Client,
	cache: HashMap<GroupVersionKind, ResourceMapping>,
}

impl RestMapper {
	pub fn new(client: Client) -> Self {
		Self {
			client,
			cache: HashMap::new(),
		}
	}

	/// Resolve a kind, querying discovery on a cache miss.
	#[instrument(skip(self), fields(api_version = %gvk.api_version(), kind = %gvk.kind))]
	pub async fn resolve(&mut self, gvk: &GroupVersionKind) -> Result<ResourceMapping, MappingError> {
		if let Some(mapping) = self.cache.get(gvk) {
			return Ok(mapping.clone());
		}

		tracing::debug!("discovering resource");
		let (api_resource, capabilities) = pinned_kind(&self.client, gvk)
			.await
			.map_err(|e| MappingError::UnknownKind {
				api_version: gvk.api_version(),
				kind: gvk.kind.clone(),
				source: Box::new(e),
			})?;

		let scope = match capabilities.scope {
			Scope::Namespaced => ResourceScope::Namespaced,
			Scope::Cluster => ResourceScope::ClusterWide,
		};
		let mapping = ResourceMapping {
			api_resource,
			scope,
		};
		self.cache.insert(gvk.clone(), mapping.clone());
		Ok(mapping)
	}

	/// Number of kinds resolved so far.
	pub fn cached_len(&self) -> usize {
		self.cache.len()
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case("v1/secrets", Some(("", "v1", "secrets")))]
	#[case("apps/v1/deployments", Some(("apps", "v1", "deployments")))]
	#[case(
		"rbac.authorization.k8s.io/v1/clusterroles",
		Some(("rbac.authorization.k8s.io", "v1", "clusterroles"))
	)]
	#[case("secrets", None)]
	#[case("a/b/c/d", None)]
	#[case("v1/", None)]
	fn test_parse_gvr(#[case] input: &str, #[case] expected: Option<(&str, &str, &str)>) {
		let expected = expected.map(|(g, v, r)| GroupVersionResource::new(g, v, r));
		assert_eq!(GroupVersionResource::parse(input), expected);
	}

	#[test]
	fn test_gvr_display() {
		assert_eq!(
			GroupVersionResource::new("", "v1", "secrets").to_string(),
			"v1, Resource=secrets"
		);
		assert_eq!(
			GroupVersionResource::new("apps", "v1", "deployments").to_string(),
			"apps/v1, Resource=deployments"
		);
	}

	#[test]
	fn test_gvr_api_resource() {
		let ar = GroupVersionResource::new("apps", "v1", "deployments").api_resource();
		assert_eq!(ar.group, "apps");
		assert_eq!(ar.version, "v1");
		assert_eq!(ar.api_version, "apps/v1");
		assert_eq!(ar.plural, "deployments");
	}
}
