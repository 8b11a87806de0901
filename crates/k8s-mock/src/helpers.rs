//! JSON helpers for the mock server.

use serde_json::Value;

/// Apply a JSON merge patch (RFC 7386) to `base`.
///
/// `null` in the patch removes the key.
pub fn merge_json(base: Value, patch: Value) -> Value {
	match (base, patch) {
		(Value::Object(mut base_map), Value::Object(patch_map)) => {
			for (key, patch_value) in patch_map {
				if patch_value.is_null() {
					base_map.remove(&key);
					continue;
				}
				let base_value = base_map.remove(&key).unwrap_or(Value::Null);
				base_map.insert(key, merge_json(base_value, patch_value));
			}
			Value::Object(base_map)
		}
		(_, patch) => patch,
	}
}

/// Strip strategic merge patch directives such as `$patch` or
/// `$setElementOrder/...`, which are instructions rather than content.
pub fn strip_strategic_merge_directives(value: Value) -> Value {
	match value {
		Value::Object(map) => Value::Object(
			map.into_iter()
				.filter(|(key, _)| !key.starts_with('$'))
				.map(|(key, val)| (key, strip_strategic_merge_directives(val)))
				.collect(),
		),
		Value::Array(arr) => Value::Array(
			arr.into_iter()
				.map(strip_strategic_merge_directives)
				.collect(),
		),
		other => other,
	}
}

/// A `metav1.Status` failure body.
pub fn status_body(code: u16, reason: &str, message: &str) -> Value {
	serde_json::json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	})
}

/// Split a resource path into its collection path and name.
///
/// `/api/v1/namespaces/default/secrets/foo` -> (`/api/v1/namespaces/default/secrets`, `foo`)
pub fn split_resource_path(path: &str) -> (String, String) {
	let path = path.trim_end_matches('/');
	match path.rsplit_once('/') {
		Some((collection, name)) => (collection.to_string(), name.to_string()),
		None => (path.to_string(), String::new()),
	}
}

/// `metadata.resourceVersion` of an object, if it is a string.
pub fn resource_version(object: &Value) -> Option<&str> {
	object.pointer("/metadata/resourceVersion")?.as_str()
}

pub fn set_resource_version(object: &mut Value, version: u64) {
	let Some(object) = object.as_object_mut() else {
		return;
	};
	let metadata = object
		.entry("metadata")
		.or_insert_with(|| Value::Object(serde_json::Map::new()));
	if let Some(metadata) = metadata.as_object_mut() {
		metadata.insert(
			"resourceVersion".to_string(),
			Value::String(version.to_string()),
		);
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_merge_json_removes_null_keys() {
		let merged = merge_json(
			json!({"metadata": {"labels": {"a": "1", "b": "2"}}, "data": {"x": "y"}}),
			json!({"metadata": {"labels": {"a": null, "c": "3"}}}),
		);
		assert_eq!(
			merged,
			json!({"metadata": {"labels": {"b": "2", "c": "3"}}, "data": {"x": "y"}})
		);
	}

	#[test]
	fn test_strip_directives() {
		let stripped = strip_strategic_merge_directives(json!({
			"spec": {"$setElementOrder/containers": [{"name": "a"}], "replicas": 2}
		}));
		assert_eq!(stripped, json!({"spec": {"replicas": 2}}));
	}

	#[test]
	fn test_split_resource_path() {
		assert_eq!(
			split_resource_path("/api/v1/namespaces/default/secrets/foo"),
			(
				"/api/v1/namespaces/default/secrets".to_string(),
				"foo".to_string()
			)
		);
		assert_eq!(
			split_resource_path("/api/v1/namespaces/kube-system"),
			("/api/v1/namespaces".to_string(), "kube-system".to_string())
		);
	}

	#[test]
	fn test_set_resource_version() {
		let mut object = json!({"metadata": {"name": "x"}});
		set_resource_version(&mut object, 7);
		assert_eq!(resource_version(&object), Some("7"));
	}
}
