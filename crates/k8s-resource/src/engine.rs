//! Resource apply/delete/patch engine.
//!
//! Apply is a create-else-update upsert: the object is created, and when the
//! server answers AlreadyExists the live resourceVersion is fetched and the
//! object is replaced. Delete treats NotFound as success. Multi-document runs
//! stop at the first failing document.

use std::fmt;

use bon::bon;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
	api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams},
	Client,
};
use thiserror::Error;
use tracing::instrument;

use crate::{
	discovery::{GroupVersionResource, MappingError, ResourceMapping, RestMapper},
	manifest::{Manifest, ManifestError},
	yaml::{ManifestReader, YamlError},
};

/// Errors that can occur while processing a single resource.
#[derive(Debug, Error)]
pub enum ResourceError {
	#[error(transparent)]
	Yaml(#[from] YamlError),

	#[error(transparent)]
	Manifest(#[from] ManifestError),

	#[error(transparent)]
	Mapping(#[from] MappingError),

	#[error("failed to find resource namespace `{0}`")]
	NamespaceNotFound(String),

	#[error("checking if namespace '{namespace}' exists")]
	NamespaceCheck {
		namespace: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("failed to create resource {kind}/{name}")]
	Create {
		kind: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("failed to get resource {kind}/{name} for update")]
	GetForUpdate {
		kind: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("failed to update resource {kind}/{name}")]
	Update {
		kind: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("failed to delete resource {kind}/{name}")]
	Delete {
		kind: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("failed to patch {namespace}/{resource} {name}")]
	Patch {
		resource: GroupVersionResource,
		namespace: String,
		name: String,
		#[source]
		source: Box<kube::Error>,
	},
}

/// A failure inside a multi-document run.
#[derive(Debug, Error)]
#[error("failed to process resource section {index} ({completed} completed before it)")]
pub struct DocumentError {
	/// Zero-based index of the failing document.
	pub index: usize,
	/// Number of documents fully processed before the failure.
	pub completed: usize,
	#[source]
	pub source: ResourceError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
	Created,
	Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
	Deleted,
	/// The resource did not exist.
	NotFound,
}

impl fmt::Display for ApplyOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApplyOutcome::Created => write!(f, "created"),
			ApplyOutcome::Updated => write!(f, "configured"),
		}
	}
}

impl fmt::Display for DeleteOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeleteOutcome::Deleted => write!(f, "deleted"),
			DeleteOutcome::NotFound => write!(f, "not found"),
		}
	}
}

/// Content type used for a patch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatchType {
	/// JSON Merge Patch (RFC 7386).
	#[default]
	Merge,
	/// Kubernetes strategic merge patch. Only built-in types support it.
	Strategic,
}

/// Identity of a processed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
	pub kind: String,
	pub namespace: Option<String>,
	pub name: String,
}

impl fmt::Display for ResourceRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.namespace {
			Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
			None => write!(f, "{} {}", self.kind, self.name),
		}
	}
}

/// Result of processing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled<O> {
	pub resource: ResourceRef,
	pub outcome: O,
}

/// Applies, deletes and patches resources through dynamic clients.
///
/// The engine owns the REST mapper, so kind lookups are cached for as long as
/// the engine lives.
pub struct ResourceEngine {
	client: Client,
	mapper: RestMapper,
	default_namespace: String,
	namespace_override: Option<String>,
}

#[bon]
impl ResourceEngine {
	/// Create an engine.
	///
	/// `default_namespace` is used for namespaced documents that carry no
	/// namespace; it falls back to the client's context namespace.
	/// `namespace_override` replaces the namespace of every namespaced document.
	#[builder]
	pub fn new(
		client: Client,
		#[builder(into)] default_namespace: Option<String>,
		#[builder(into)] namespace_override: Option<String>,
	) -> Self {
		let default_namespace =
			default_namespace.unwrap_or_else(|| client.default_namespace().to_string());
		Self {
			mapper: RestMapper::new(client.clone()),
			client,
			default_namespace,
			namespace_override,
		}
	}
}

impl ResourceEngine {
	/// Create or update a single resource, equivalent to `kubectl apply`.
	#[instrument(skip(self, manifest), fields(
		kind = manifest.kind().unwrap_or("unknown"),
		name = manifest.name().unwrap_or("unknown"),
	))]
	pub async fn apply(
		&mut self,
		mut manifest: Manifest,
	) -> Result<Reconciled<ApplyOutcome>, ResourceError> {
		let gvk = manifest.gvk()?;
		let name = manifest.required_name()?.to_string();
		let mapping = self.mapper.resolve(&gvk).await?;
		let namespace = self.target_namespace(&mut manifest, &mapping);

		if let Some(ns) = namespace.as_deref() {
			if !self.namespace_exists(ns).await? {
				return Err(ResourceError::NamespaceNotFound(ns.to_string()));
			}
		}

		let api = self.dynamic_api(&mapping, namespace.as_deref());
		let object = manifest.to_dynamic_object()?;

		let outcome = match api.create(&PostParams::default(), &object).await {
			Ok(_) => ApplyOutcome::Created,
			Err(e) if is_already_exists(&e) => {
				tracing::debug!("resource already exists, updating");
				let current = api
					.get(&name)
					.await
					.map_err(|e| ResourceError::GetForUpdate {
						kind: gvk.kind.clone(),
						name: name.clone(),
						source: Box::new(e),
					})?;
				if let Some(resource_version) = current.metadata.resource_version.as_deref() {
					manifest.set_resource_version(resource_version);
				}
				let object = manifest.to_dynamic_object()?;

				api.replace(&name, &PostParams::default(), &object)
					.await
					.map_err(|e| ResourceError::Update {
						kind: gvk.kind.clone(),
						name: name.clone(),
						source: Box::new(e),
					})?;
				ApplyOutcome::Updated
			}
			Err(e) => {
				return Err(ResourceError::Create {
					kind: gvk.kind,
					name,
					source: Box::new(e),
				});
			}
		};

		tracing::debug!(%outcome, "applied resource");
		Ok(Reconciled {
			resource: ResourceRef {
				kind: gvk.kind,
				namespace,
				name,
			},
			outcome,
		})
	}

	/// Delete a single resource, equivalent to `kubectl delete`.
	///
	/// A resource that does not exist is reported as [`DeleteOutcome::NotFound`].
	#[instrument(skip(self, manifest), fields(
		kind = manifest.kind().unwrap_or("unknown"),
		name = manifest.name().unwrap_or("unknown"),
	))]
	pub async fn delete(
		&mut self,
		mut manifest: Manifest,
	) -> Result<Reconciled<DeleteOutcome>, ResourceError> {
		let gvk = manifest.gvk()?;
		let name = manifest.required_name()?.to_string();
		let mapping = self.mapper.resolve(&gvk).await?;
		let namespace = self.target_namespace(&mut manifest, &mapping);

		let api = self.dynamic_api(&mapping, namespace.as_deref());
		let outcome = match api.delete(&name, &DeleteParams::default()).await {
			Ok(_) => DeleteOutcome::Deleted,
			Err(e) if status_code(&e) == Some(404) => {
				tracing::debug!("resource not found, nothing to delete");
				DeleteOutcome::NotFound
			}
			Err(e) => {
				return Err(ResourceError::Delete {
					kind: gvk.kind,
					name,
					source: Box::new(e),
				});
			}
		};

		Ok(Reconciled {
			resource: ResourceRef {
				kind: gvk.kind,
				namespace,
				name,
			},
			outcome,
		})
	}

	/// Patch a named resource, equivalent to `kubectl patch`.
	///
	/// `namespace = None` addresses a cluster-scoped resource.
	#[instrument(skip(self, patch), fields(resource = %gvr))]
	pub async fn patch(
		&self,
		gvr: &GroupVersionResource,
		namespace: Option<&str>,
		name: &str,
		patch: &serde_json::Value,
		patch_type: PatchType,
	) -> Result<DynamicObject, ResourceError> {
		let ar = gvr.api_resource();
		let api: Api<DynamicObject> = match namespace {
			Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
			None => Api::all_with(self.client.clone(), &ar),
		};

		let params = PatchParams::default();
		let result = match patch_type {
			PatchType::Merge => api.patch(name, &params, &Patch::Merge(patch)).await,
			PatchType::Strategic => api.patch(name, &params, &Patch::Strategic(patch)).await,
		};

		result.map_err(|e| ResourceError::Patch {
			resource: gvr.clone(),
			namespace: namespace.unwrap_or_default().to_string(),
			name: name.to_string(),
			source: Box::new(e),
		})
	}

	/// Apply every document of a YAML stream in order, stopping at the first error.
	#[instrument(skip_all, fields(bytes = data.len()))]
	pub async fn apply_all(
		&mut self,
		data: &[u8],
	) -> Result<Vec<Reconciled<ApplyOutcome>>, DocumentError> {
		let mut applied = Vec::new();
		for document in ManifestReader::new(data) {
			let (index, manifest) = document.map_err(|e| DocumentError {
				index: e.index(),
				completed: applied.len(),
				source: e.into(),
			})?;
			let result = self.apply(manifest).await.map_err(|source| DocumentError {
				index,
				completed: applied.len(),
				source,
			})?;
			applied.push(result);
		}
		Ok(applied)
	}

	/// Delete every document of a YAML stream in order, stopping at the first error.
	#[instrument(skip_all, fields(bytes = data.len()))]
	pub async fn delete_all(
		&mut self,
		data: &[u8],
	) -> Result<Vec<Reconciled<DeleteOutcome>>, DocumentError> {
		let mut deleted = Vec::new();
		for document in ManifestReader::new(data) {
			let (index, manifest) = document.map_err(|e| DocumentError {
				index: e.index(),
				completed: deleted.len(),
				source: e.into(),
			})?;
			let result = self.delete(manifest).await.map_err(|source| DocumentError {
				index,
				completed: deleted.len(),
				source,
			})?;
			deleted.push(result);
		}
		Ok(deleted)
	}

	/// Namespace a document will be written to, or `None` for cluster-scoped
	/// kinds. The chosen namespace is written back into the manifest.
	fn target_namespace(
		&self,
		manifest: &mut Manifest,
		mapping: &ResourceMapping,
	) -> Option<String> {
		if !mapping.is_namespaced() {
			return None;
		}

		let namespace = self
			.namespace_override
			.clone()
			.or_else(|| manifest.namespace().map(str::to_string))
			.unwrap_or_else(|| self.default_namespace.clone());
		manifest.set_namespace(&namespace);
		Some(namespace)
	}

	async fn namespace_exists(&self, name: &str) -> Result<bool, ResourceError> {
		let api: Api<Namespace> = Api::all(self.client.clone());
		let found = api
			.get_opt(name)
			.await
			.map_err(|e| ResourceError::NamespaceCheck {
				namespace: name.to_string(),
				source: Box::new(e),
			})?;
		Ok(found.is_some())
	}

	/// Create a dynamic API for the given resource.
	fn dynamic_api(&self, mapping: &ResourceMapping, namespace: Option<&str>) -> Api<DynamicObject> {
		match namespace {
			Some(ns) => Api::namespaced_with(self.client.clone(), ns, &mapping.api_resource),
			None => Api::all_with(self.client.clone(), &mapping.api_resource),
		}
	}

	pub fn default_namespace(&self) -> &str {
		&self.default_namespace
	}

	pub fn mapper(&self) -> &RestMapper {
		&self.mapper
	}
}

/// HTTP status of an API error response.
fn status_code(err: &kube::Error) -> Option<u16> {
	match err {
		kube::Error::Api(response) => Some(response.code),
		_ => None,
	}
}

/// A create rejected because the object is already present.
///
/// Other 409 responses (e.g. an optimistic-concurrency `Conflict`) are not
/// retried as updates.
fn is_already_exists(err: &kube::Error) -> bool {
	match err {
		kube::Error::Api(response) => response.code == 409 && response.reason == "AlreadyExists",
		_ => false,
	}
}
