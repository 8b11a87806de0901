//! Multi-document YAML reading.
//!
//! Streams are consumed one `---`-delimited document at a time so that a
//! failure in document N leaves documents N+1.. untouched.

use std::str::Utf8Error;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::manifest::{Manifest, ManifestError};

/// Errors that can occur while reading a YAML stream.
#[derive(Debug, Error)]
pub enum YamlError {
	#[error("failed to read resource section {index}")]
	Parse {
		index: usize,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("resource section {index} is not valid UTF-8")]
	Utf8 {
		index: usize,
		#[source]
		source: Utf8Error,
	},

	#[error("failed to unmarshal resource section {index}")]
	Decode {
		index: usize,
		#[source]
		source: ManifestError,
	},
}

impl YamlError {
	/// Zero-based position of the offending document in the stream.
	pub fn index(&self) -> usize {
		match self {
			YamlError::Parse { index, .. }
			| YamlError::Utf8 { index, .. }
			| YamlError::Decode { index, .. } => *index,
		}
	}
}

/// Lazily yields the manifests of a multi-document YAML stream in file order.
///
/// Documents that are empty or only hold comments are skipped. Iteration ends
/// after the first error. Merge keys (`<<: *anchor`) are expanded.
///
/// When the stream contains invalid UTF-8, the documents before the one
/// holding the bad bytes are still yielded, followed by [`YamlError::Utf8`].
pub struct ManifestReader<'a> {
	documents: serde_yaml::Deserializer<'a>,
	invalid: Option<Utf8Error>,
	index: usize,
	failed: bool,
}

impl<'a> ManifestReader<'a> {
	pub fn new(data: &'a [u8]) -> Self {
		let (text, invalid) = match std::str::from_utf8(data) {
			Ok(text) => (text, None),
			Err(err) => {
				let valid = std::str::from_utf8(&data[..err.valid_up_to()]).unwrap_or_default();
				(&valid[..last_document_start(valid)], Some(err))
			}
		};
		Self {
			documents: serde_yaml::Deserializer::from_str(text),
			invalid,
			index: 0,
			failed: false,
		}
	}
}

impl Iterator for ManifestReader<'_> {
	type Item = Result<(usize, Manifest), YamlError>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed {
			return None;
		}

		for document in self.documents.by_ref() {
			let index = self.index;
			self.index += 1;

			let value = match serde_yaml::Value::deserialize(document).and_then(to_json) {
				Ok(Value::Null) => continue,
				Ok(value) => value,
				Err(source) => {
					self.failed = true;
					return Some(Err(YamlError::Parse { index, source }));
				}
			};

			return Some(match Manifest::from_value(value) {
				Ok(manifest) => Ok((index, manifest)),
				Err(source) => {
					self.failed = true;
					Err(YamlError::Decode { index, source })
				}
			});
		}

		let source = self.invalid.take()?;
		self.failed = true;
		Some(Err(YamlError::Utf8 {
			index: self.index,
			source,
		}))
	}
}

/// Byte offset where the last document of `text` begins: the start of its
/// final `---` marker line, or 0 when there is none.
fn last_document_start(text: &str) -> usize {
	let mut start = 0;
	let mut offset = 0;
	for line in text.split_inclusive('\n') {
		if is_document_marker(line) {
			start = offset;
		}
		offset += line.len();
	}
	start
}

fn is_document_marker(line: &str) -> bool {
	line.strip_prefix("---")
		.is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Expand merge keys and convert a YAML value to JSON.
fn to_json(mut value: serde_yaml::Value) -> Result<Value, serde_yaml::Error> {
	value.apply_merge()?;
	serde_yaml::from_value(value)
}

/// Convert a single YAML document to its JSON equivalent.
pub fn yaml_to_json(data: &[u8]) -> Result<Value, serde_yaml::Error> {
	serde_yaml::from_slice(data).and_then(to_json)
}
