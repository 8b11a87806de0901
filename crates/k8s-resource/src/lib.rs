//! kubectl-style resource reconciliation over multi-document YAML.
//!
//! Documents are decoded into untyped [`Manifest`]s, their kinds are resolved to
//! REST resources through the cluster's discovery API, and then they are
//! created, updated, deleted or patched through dynamic clients.

pub mod client;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod files;
pub mod manifest;
pub mod yaml;

pub use client::{ClusterConnection, ConnectionError};
pub use config::{kubeconfig_location, ConfigError};
pub use discovery::{GroupVersionResource, ResourceMapping, ResourceScope, RestMapper};
pub use engine::{
	ApplyOutcome, DeleteOutcome, DocumentError, PatchType, Reconciled, ResourceEngine,
	ResourceError, ResourceRef,
};
pub use files::{
	apply_file, delete_file, find_test_data_file, load_patch_file, patch_file, FileError,
	FileOpError,
};
pub use manifest::{Manifest, ManifestError};
pub use yaml::{ManifestReader, YamlError};
