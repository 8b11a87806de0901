//! Manifest and patch files addressed relative to the working directory.
//!
//! A file name is first tried as given, then joined onto each ancestor of the
//! working directory in turn, so tests can refer to shared test data from any
//! crate subdirectory.

use std::{
	io,
	path::{Path, PathBuf},
};

use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::{
	discovery::GroupVersionResource,
	engine::{
		ApplyOutcome, DeleteOutcome, DocumentError, PatchType, Reconciled, ResourceEngine,
		ResourceError,
	},
	yaml::yaml_to_json,
};

#[derive(Debug, Error)]
pub enum FileError {
	#[error("failed to find test data file: {}", .0.display())]
	NotFound(PathBuf),

	#[error("failed to read the current directory")]
	CurrentDir(#[source] io::Error),

	#[error("failed to read {}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("could not convert patch {} to JSON", path.display())]
	YamlToJson {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("patch {} is not valid JSON", path.display())]
	Json {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}

/// Errors from the file-based operations.
#[derive(Debug, Error)]
pub enum FileOpError {
	#[error(transparent)]
	File(#[from] FileError),

	#[error("{}: {source}", path.display())]
	Document {
		path: PathBuf,
		#[source]
		source: DocumentError,
	},

	#[error(transparent)]
	Resource(#[from] ResourceError),
}

/// Locate `file`, searching upwards from the working directory.
pub fn find_test_data_file(file: impl AsRef<Path>) -> Result<PathBuf, FileError> {
	let cwd = std::env::current_dir().map_err(FileError::CurrentDir)?;
	find_test_data_file_from(file, &cwd)
}

/// Locate `file`, searching upwards from `start`.
pub fn find_test_data_file_from(
	file: impl AsRef<Path>,
	start: &Path,
) -> Result<PathBuf, FileError> {
	let file = file.as_ref();
	if file.exists() {
		return Ok(file.to_path_buf());
	}

	start
		.ancestors()
		.map(|dir| dir.join(file))
		.find(|candidate| candidate.exists())
		.ok_or_else(|| FileError::NotFound(file.to_path_buf()))
}

/// Locate and read a test data file.
#[instrument]
pub fn read_test_data_file(file: &Path) -> Result<(PathBuf, Vec<u8>), FileError> {
	let path = find_test_data_file(file)?;
	tracing::info!(path = %path.display(), "found resource");
	let data = std::fs::read(&path).map_err(|source| FileError::Read {
		path: path.clone(),
		source,
	})?;
	Ok((path, data))
}

/// Interpret patch file contents as JSON.
///
/// Files ending in `.yaml` are converted from YAML first; everything else must
/// already be JSON.
pub fn parse_patch(path: &Path, data: &[u8]) -> Result<Value, FileError> {
	if path.extension().is_some_and(|ext| ext == "yaml") {
		return yaml_to_json(data).map_err(|source| FileError::YamlToJson {
			path: path.to_path_buf(),
			source,
		});
	}
	serde_json::from_slice(data).map_err(|source| FileError::Json {
		path: path.to_path_buf(),
		source,
	})
}

/// Locate, read and parse a patch file.
pub fn load_patch_file(file: &Path) -> Result<Value, FileError> {
	let (path, data) = read_test_data_file(file)?;
	parse_patch(&path, &data)
}

/// Apply every document of a manifest file.
pub async fn apply_file(
	engine: &mut ResourceEngine,
	file: impl AsRef<Path>,
) -> Result<Vec<Reconciled<ApplyOutcome>>, FileOpError> {
	let (path, data) = read_test_data_file(file.as_ref())?;
	engine
		.apply_all(&data)
		.await
		.map_err(|source| FileOpError::Document { path, source })
}

/// Delete every document of a manifest file.
pub async fn delete_file(
	engine: &mut ResourceEngine,
	file: impl AsRef<Path>,
) -> Result<Vec<Reconciled<DeleteOutcome>>, FileOpError> {
	let (path, data) = read_test_data_file(file.as_ref())?;
	engine
		.delete_all(&data)
		.await
		.map_err(|source| FileOpError::Document { path, source })
}

/// Merge-patch a named resource with the contents of a patch file.
pub async fn patch_file(
	engine: &ResourceEngine,
	gvr: &GroupVersionResource,
	namespace: Option<&str>,
	name: &str,
	file: impl AsRef<Path>,
) -> Result<(), FileOpError> {
	let patch = load_patch_file(file.as_ref())?;
	engine
		.patch(gvr, namespace, name, &patch, PatchType::Merge)
		.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use serde_json::json;

	use super::*;

	#[test]
	fn test_find_in_ancestor() {
		let root = tempfile::tempdir().unwrap();
		let data_dir = root.path().join("testdata");
		std::fs::create_dir_all(&data_dir).unwrap();
		std::fs::write(data_dir.join("secret.yaml"), "kind: Secret\n").unwrap();

		let nested = root.path().join("a").join("b").join("c");
		std::fs::create_dir_all(&nested).unwrap();

		let found = find_test_data_file_from("testdata/secret.yaml", &nested).unwrap();
		assert_eq!(found, data_dir.join("secret.yaml"));
	}

	#[test]
	fn test_find_missing() {
		let root = tempfile::tempdir().unwrap();
		let err = find_test_data_file_from("testdata/does-not-exist.yaml", root.path())
			.unwrap_err();
		assert_matches!(err, FileError::NotFound(_));
		assert_eq!(
			err.to_string(),
			"failed to find test data file: testdata/does-not-exist.yaml"
		);
	}

	#[test]
	fn test_parse_yaml_patch() {
		let patch = parse_patch(
			Path::new("patch.yaml"),
			b"metadata:\n  labels:\n    patched: \"true\"\n",
		)
		.unwrap();
		assert_eq!(patch, json!({"metadata": {"labels": {"patched": "true"}}}));
	}

	#[test]
	fn test_parse_json_patch() {
		let patch = parse_patch(
			Path::new("patch.json"),
			br#"{"metadata":{"labels":{"patched":"true"}}}"#,
		)
		.unwrap();
		assert_eq!(patch, json!({"metadata": {"labels": {"patched": "true"}}}));
	}

	#[test]
	fn test_yml_suffix_is_not_converted() {
		let err = parse_patch(Path::new("patch.yml"), b"metadata:\n  name: x\n").unwrap_err();
		assert_matches!(err, FileError::Json { .. });
	}
}
