//! Untyped Kubernetes objects decoded from YAML.

use kube::{api::DynamicObject, core::GroupVersionKind};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while reading well-known fields out of a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
	#[error("document is not a mapping")]
	NotAnObject,

	#[error("manifest missing apiVersion or kind")]
	MissingApiVersionOrKind,

	#[error("manifest missing metadata.name")]
	MissingName,

	#[error("converting manifest to DynamicObject")]
	Conversion(#[source] serde_json::Error),
}

/// A Kubernetes object kept as a schemaless JSON map.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
	object: Map<String, Value>,
}

impl Manifest {
	/// Wrap a decoded document. Only JSON objects are accepted.
	pub fn from_value(value: Value) -> Result<Self, ManifestError> {
		match value {
			Value::Object(object) => Ok(Self { object }),
			_ => Err(ManifestError::NotAnObject),
		}
	}

	pub fn api_version(&self) -> Option<&str> {
		self.object.get("apiVersion").and_then(Value::as_str)
	}

	pub fn kind(&self) -> Option<&str> {
		self.object.get("kind").and_then(Value::as_str)
	}

	pub fn name(&self) -> Option<&str> {
		self.metadata_str("name")
	}

	/// `metadata.namespace`, treating an empty string as unset.
	pub fn namespace(&self) -> Option<&str> {
		self.metadata_str("namespace").filter(|ns| !ns.is_empty())
	}

	pub fn resource_version(&self) -> Option<&str> {
		self.metadata_str("resourceVersion")
	}

	pub fn set_namespace(&mut self, namespace: &str) {
		self.set_metadata_field("namespace", Value::from(namespace));
	}

	pub fn set_resource_version(&mut self, resource_version: &str) {
		self.set_metadata_field("resourceVersion", Value::from(resource_version));
	}

	/// The object's GroupVersionKind, derived from `apiVersion` and `kind`.
	pub fn gvk(&self) -> Result<GroupVersionKind, ManifestError> {
		match (self.api_version(), self.kind()) {
			(Some(api_version), Some(kind)) if !api_version.is_empty() && !kind.is_empty() => {
				Ok(gvk_from_api_version(api_version, kind))
			}
			_ => Err(ManifestError::MissingApiVersionOrKind),
		}
	}

	/// `metadata.name`, or an error when the document has none.
	pub fn required_name(&self) -> Result<&str, ManifestError> {
		self.name()
			.filter(|name| !name.is_empty())
			.ok_or(ManifestError::MissingName)
	}

	pub fn into_value(self) -> Value {
		Value::Object(self.object)
	}

	pub fn to_dynamic_object(&self) -> Result<DynamicObject, ManifestError> {
		serde_json::from_value(Value::Object(self.object.clone()))
			.map_err(ManifestError::Conversion)
	}

	fn metadata_str(&self, field: &str) -> Option<&str> {
		self.object
			.get("metadata")
			.and_then(|metadata| metadata.get(field))
			.and_then(Value::as_str)
	}

	fn set_metadata_field(&mut self, field: &str, value: Value) {
		let metadata = self
			.object
			.entry("metadata")
			.or_insert_with(|| Value::Object(Map::new()));
		if let Value::Object(map) = metadata {
			map.insert(field.to_string(), value);
		} else {
			let mut map = Map::new();
			map.insert(field.to_string(), value);
			*metadata = Value::Object(map);
		}
	}
}

/// Split an `apiVersion` into group and version. Core resources have no group.
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
	let (group, version) = match api_version.split_once('/') {
		Some((g, v)) => (g, v),
		None => ("", api_version),
	};
	GroupVersionKind::gvk(group, version, kind)
}
