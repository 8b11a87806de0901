//! HTTP-based mock Kubernetes server using wiremock.
//!
//! The server keeps an in-memory object store and answers create, get, replace,
//! delete and patch requests with the same status codes a real API server uses,
//! so clients can be exercised through a kubeconfig-based connection.

use std::{
	collections::HashMap,
	path::Path,
	sync::{Arc, RwLock},
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::Value;
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{
	discovery::{collection_path, MockDiscovery},
	helpers::{
		merge_json, resource_version, set_resource_version, split_resource_path, status_body,
		strip_strategic_merge_directives,
	},
};

const NAMESPACES_PATH: &str = "/api/v1/namespaces";

/// Objects stored by the mock server, keyed by (collection path, name).
#[derive(Default)]
pub struct ClusterState {
	objects: HashMap<(String, String), Value>,
	last_resource_version: u64,
}

impl ClusterState {
	/// Store `object` under a fresh resourceVersion and return the stored copy.
	fn store(&mut self, key: (String, String), mut object: Value) -> Value {
		self.last_resource_version += 1;
		set_resource_version(&mut object, self.last_resource_version);
		self.objects.insert(key, object.clone());
		object
	}

	fn namespace_exists(&self, name: &str) -> bool {
		self.objects
			.contains_key(&(NAMESPACES_PATH.to_string(), name.to_string()))
	}
}

/// Type alias for the shared mutable object store.
pub type SharedState = Arc<RwLock<ClusterState>>;

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Namespaces that exist at startup in addition to `default`.
	#[builder(default)]
	namespaces: Vec<String>,
	/// Objects that exist at startup. The server derives API paths from
	/// apiVersion/kind using the discovery data.
	#[builder(default)]
	resources: Vec<Value>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	state: SharedState,
	discovery_paths: Vec<String>,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured namespaces and resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		let discovery = MockDiscovery::default();

		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut state = ClusterState::default();
		let namespaces = std::iter::once("default".to_string()).chain(self.namespaces);
		for name in namespaces {
			let namespace = serde_json::json!({
				"apiVersion": "v1",
				"kind": "Namespace",
				"metadata": {"name": name}
			});
			state.store((NAMESPACES_PATH.to_string(), name), namespace);
		}

		for manifest in self.resources {
			if let Some(key) = object_key(&manifest, &discovery) {
				trace!(collection = %key.0, name = %key.1, "Registered resource");
				state.store(key, manifest);
			}
		}

		let state = Arc::new(RwLock::new(state));

		mount_discovery(&server, &discovery).await;
		mount_resources(&server, &state).await;

		RunningHttpMockK8sServer {
			server,
			state,
			discovery_paths: discovery.paths(),
		}
	}
}

/// Derive the (collection path, name) key for a manifest.
fn object_key(manifest: &Value, discovery: &MockDiscovery) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let namespace = manifest
		.pointer("/metadata/namespace")
		.and_then(Value::as_str)
		.unwrap_or("default");

	let resource = discovery.find(api_version, kind)?;
	Some((collection_path(api_version, resource, namespace), name))
}

/// Namespace segment of a namespaced collection path.
fn path_namespace(collection: &str) -> Option<&str> {
	let (_, rest) = collection.split_once("/namespaces/")?;
	let (namespace, _) = rest.split_once('/')?;
	Some(namespace)
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// Write the kubeconfig for this server to `path` as YAML.
	pub fn write_kubeconfig(&self, path: &Path) -> std::io::Result<()> {
		let yaml = serde_yaml::to_string(&self.kubeconfig()).map_err(std::io::Error::other)?;
		std::fs::write(path, yaml)
	}

	/// The stored object at `collection`/`name`, if any.
	pub fn resource(&self, collection: &str, name: &str) -> Option<Value> {
		let state = self.state.read().unwrap();
		state
			.objects
			.get(&(collection.to_string(), name.to_string()))
			.cloned()
	}

	/// Requests received so far, excluding discovery.
	pub async fn resource_requests(&self) -> Vec<Request> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.into_iter()
			.filter(|req| !self.discovery_paths.iter().any(|p| p == req.url.path()))
			.collect()
	}

	/// Requests received so far, excluding discovery, as `METHOD /path`.
	pub async fn resource_calls(&self) -> Vec<String> {
		self.resource_requests()
			.await
			.iter()
			.map(|req| format!("{} {}", req.method, req.url.path()))
			.collect()
	}
}

async fn mount_discovery(server: &MockServer, discovery: &MockDiscovery) {
	Mock::given(method("GET"))
		.and(path("/api"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIVersions",
			"versions": ["v1"],
			"serverAddressByClientCIDRs": []
		})))
		.mount(server)
		.await;

	let groups: Vec<_> = discovery
		.group_resources
		.keys()
		.map(|gv| {
			let (group, version) = gv.split_once('/').unwrap_or(("", gv));
			serde_json::json!({
				"name": group,
				"versions": [{"groupVersion": gv, "version": version}],
				"preferredVersion": {"groupVersion": gv, "version": version}
			})
		})
		.collect();

	Mock::given(method("GET"))
		.and(path("/apis"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIGroupList",
			"apiVersion": "v1",
			"groups": groups
		})))
		.mount(server)
		.await;

	let core_resources: Vec<_> = discovery
		.core_resources
		.iter()
		.map(|r| r.to_json())
		.collect();

	Mock::given(method("GET"))
		.and(path("/api/v1"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"kind": "APIResourceList",
			"apiVersion": "v1",
			"groupVersion": "v1",
			"resources": core_resources
		})))
		.mount(server)
		.await;

	for (gv, rs) in &discovery.group_resources {
		let resources: Vec<_> = rs.iter().map(|r| r.to_json()).collect();

		Mock::given(method("GET"))
			.and(path(format!("/apis/{gv}")))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"kind": "APIResourceList",
				"apiVersion": "v1",
				"groupVersion": gv,
				"resources": resources
			})))
			.mount(server)
			.await;
	}
}

fn not_found(collection: &str, name: &str) -> ResponseTemplate {
	let resource = collection.rsplit('/').next().unwrap_or_default();
	ResponseTemplate::new(404).set_body_json(status_body(
		404,
		"NotFound",
		&format!("{resource} \"{name}\" not found"),
	))
}

async fn mount_resources(server: &MockServer, state: &SharedState) {
	let post_state = Arc::clone(state);
	let put_state = Arc::clone(state);
	let patch_state = Arc::clone(state);
	let delete_state = Arc::clone(state);
	let get_state = Arc::clone(state);

	// POST creates into the collection named by the path.
	Mock::given(method("POST"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let collection = req.url.path().trim_end_matches('/').to_string();
			let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
			let name = body
				.pointer("/metadata/name")
				.and_then(Value::as_str)
				.unwrap_or("")
				.to_string();

			let mut state = post_state.write().unwrap();
			if let Some(namespace) = path_namespace(&collection) {
				if !state.namespace_exists(namespace) {
					return not_found(NAMESPACES_PATH, namespace);
				}
			}

			let key = (collection, name);
			if state.objects.contains_key(&key) {
				let resource = key.0.rsplit('/').next().unwrap_or_default();
				return ResponseTemplate::new(409).set_body_json(status_body(
					409,
					"AlreadyExists",
					&format!("{resource} \"{}\" already exists", key.1),
				));
			}

			let stored = state.store(key, body);
			ResponseTemplate::new(201).set_body_json(stored)
		})
		.mount(server)
		.await;

	// PUT replaces an existing object, honouring optimistic concurrency.
	Mock::given(method("PUT"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let key = split_resource_path(req.url.path());
			let body: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);

			let mut state = put_state.write().unwrap();
			let Some(existing) = state.objects.get(&key) else {
				return not_found(&key.0, &key.1);
			};

			if let Some(requested) = resource_version(&body) {
				if resource_version(existing) != Some(requested) {
					return ResponseTemplate::new(409).set_body_json(status_body(
						409,
						"Conflict",
						"the object has been modified; please apply your changes to the latest version and try again",
					));
				}
			}

			let stored = state.store(key, body);
			ResponseTemplate::new(200).set_body_json(stored)
		})
		.mount(server)
		.await;

	// PATCH merges the request body into an existing object.
	Mock::given(method("PATCH"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let key = split_resource_path(req.url.path());
			let patch: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);

			let mut state = patch_state.write().unwrap();
			let Some(existing) = state.objects.get(&key) else {
				return not_found(&key.0, &key.1);
			};

			let merged = strip_strategic_merge_directives(merge_json(existing.clone(), patch));
			let stored = state.store(key, merged);
			ResponseTemplate::new(200).set_body_json(stored)
		})
		.mount(server)
		.await;

	Mock::given(method("DELETE"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let key = split_resource_path(req.url.path());
			let mut state = delete_state.write().unwrap();
			match state.objects.remove(&key) {
				Some(removed) => ResponseTemplate::new(200).set_body_json(removed),
				None => not_found(&key.0, &key.1),
			}
		})
		.mount(server)
		.await;

	// GET returns a single object, or a list when the path names a collection.
	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let path_str = req.url.path().trim_end_matches('/');
			let state = get_state.read().unwrap();

			let key = split_resource_path(path_str);
			if let Some(object) = state.objects.get(&key) {
				return ResponseTemplate::new(200).set_body_json(object.clone());
			}

			let items: Vec<_> = state
				.objects
				.iter()
				.filter(|((collection, _), _)| collection == path_str)
				.map(|(_, v)| v.clone())
				.collect();

			if !items.is_empty() {
				return ResponseTemplate::new(200).set_body_json(serde_json::json!({
					"kind": "List",
					"apiVersion": "v1",
					"metadata": {"resourceVersion": state.last_resource_version.to_string()},
					"items": items
				}));
			}

			not_found(&key.0, &key.1)
		})
		.mount(server)
		.await;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_object_key() {
		let discovery = MockDiscovery::default();

		let secret = serde_json::json!({
			"apiVersion": "v1",
			"kind": "Secret",
			"metadata": {"name": "creds", "namespace": "apps"}
		});
		assert_eq!(
			object_key(&secret, &discovery),
			Some((
				"/api/v1/namespaces/apps/secrets".to_string(),
				"creds".to_string()
			))
		);

		let role = serde_json::json!({
			"apiVersion": "rbac.authorization.k8s.io/v1",
			"kind": "ClusterRole",
			"metadata": {"name": "reader"}
		});
		assert_eq!(
			object_key(&role, &discovery),
			Some((
				"/apis/rbac.authorization.k8s.io/v1/clusterroles".to_string(),
				"reader".to_string()
			))
		);
	}

	#[test]
	fn test_path_namespace() {
		assert_eq!(
			path_namespace("/api/v1/namespaces/apps/secrets"),
			Some("apps")
		);
		assert_eq!(path_namespace("/api/v1/namespaces"), None);
		assert_eq!(
			path_namespace("/apis/rbac.authorization.k8s.io/v1/clusterroles"),
			None
		);
	}
}
