//! Discovery data served by the mock API server.

use std::collections::BTreeMap;

/// The resource lists the mock server advertises.
pub struct MockDiscovery {
	pub core_resources: Vec<MockApiResource>,
	/// Keyed by `group/version`.
	pub group_resources: BTreeMap<String, Vec<MockApiResource>>,
}

impl Default for MockDiscovery {
	fn default() -> Self {
		Self {
			core_resources: vec![
				MockApiResource::namespaced("configmaps", "ConfigMap"),
				MockApiResource::namespaced("secrets", "Secret"),
				MockApiResource::namespaced("services", "Service"),
				MockApiResource::cluster_scoped("namespaces", "Namespace"),
			],
			group_resources: BTreeMap::from([
				(
					"apps/v1".to_string(),
					vec![MockApiResource::namespaced("deployments", "Deployment")],
				),
				(
					"rbac.authorization.k8s.io/v1".to_string(),
					vec![
						MockApiResource::namespaced("roles", "Role"),
						MockApiResource::cluster_scoped("clusterroles", "ClusterRole"),
					],
				),
			]),
		}
	}
}

impl MockDiscovery {
	/// Find the advertised resource for an `apiVersion` and kind.
	pub fn find(&self, api_version: &str, kind: &str) -> Option<&MockApiResource> {
		let resources = if api_version.contains('/') {
			self.group_resources.get(api_version)?
		} else if api_version == "v1" {
			&self.core_resources
		} else {
			return None;
		};
		resources.iter().find(|r| r.kind == kind)
	}

	/// Paths the discovery endpoints are mounted on.
	pub fn paths(&self) -> Vec<String> {
		let mut paths = vec!["/api".to_string(), "/apis".to_string(), "/api/v1".to_string()];
		paths.extend(self.group_resources.keys().map(|gv| format!("/apis/{gv}")));
		paths
	}
}

/// A mock API resource definition.
pub struct MockApiResource {
	/// Plural resource name.
	pub name: String,
	pub kind: String,
	pub namespaced: bool,
}

impl MockApiResource {
	pub fn namespaced(name: &str, kind: &str) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced: true,
		}
	}

	pub fn cluster_scoped(name: &str, kind: &str) -> Self {
		Self {
			name: name.to_string(),
			kind: kind.to_string(),
			namespaced: false,
		}
	}

	pub fn to_json(&self) -> serde_json::Value {
		serde_json::json!({
			"name": self.name,
			"singularName": "",
			"namespaced": self.namespaced,
			"kind": self.kind,
			"verbs": ["create", "delete", "get", "list", "patch", "update"],
		})
	}
}

/// Collection path for a resource in an optional namespace.
pub fn collection_path(api_version: &str, resource: &MockApiResource, namespace: &str) -> String {
	let prefix = if api_version.contains('/') {
		format!("/apis/{api_version}")
	} else {
		format!("/api/{api_version}")
	};
	if resource.namespaced {
		format!("{prefix}/namespaces/{namespace}/{}", resource.name)
	} else {
		format!("{prefix}/{}", resource.name)
	}
}
