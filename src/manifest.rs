// src/manifest.rs

//! Manifest data structures
//!
//! A manifest is the `databases.json` document a Datasette instance publishes
//! at `/-/databases.json`: an ordered array of resource records. The same
//! document, written back verbatim, is the local cache state for the next run.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File name of the manifest, both remote (under `-/`) and local
pub const MANIFEST_FILE: &str = "databases.json";

/// File name of the mirrored instance metadata
pub const METADATA_FILE: &str = "metadata.json";

/// One entry in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Identifier and relative destination of the resource
    pub path: String,
    /// Opaque content hash, only published for immutable resources
    #[serde(rename = "hash", default)]
    pub content_hash: Option<String>,
    #[serde(rename = "is_mutable")]
    pub mutable: bool,
    /// Every other field the remote publishes, kept so the local copy
    /// matches the remote document
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceRecord {
    /// Create a record with no extra fields
    pub fn new(path: impl Into<String>, content_hash: Option<&str>, mutable: bool) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.map(str::to_string),
            mutable,
            extra: Map::new(),
        }
    }

    /// A record takes part in hash-based syncing only when it is immutable
    /// and carries a hash
    pub fn is_cacheable(&self) -> bool {
        !self.mutable && self.content_hash.is_some()
    }

    /// The hash of a cacheable record
    pub fn cache_key(&self) -> Option<&str> {
        if self.mutable {
            return None;
        }
        self.content_hash.as_deref()
    }

    /// Destination of this resource relative to the mirror directory
    pub fn relative_path(&self) -> Result<PathBuf> {
        relative_path(&self.path)
    }
}

/// Map a manifest path to a location inside the mirror directory
///
/// Only plain path components are accepted; anything that could place the
/// file outside the mirror directory is rejected.
pub fn relative_path(path: &str) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::InvalidPath(format!(
                    "'{path}' escapes the destination directory"
                )));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(Error::InvalidPath(format!("'{path}' does not name a file")));
    }

    // The mirror's own files and their write_atomic temporaries
    let reserved = [MANIFEST_FILE, METADATA_FILE].iter().any(|name| {
        let name = Path::new(name);
        relative == name || relative == temp_path(name)
    });
    if reserved {
        return Err(Error::InvalidPath(format!(
            "'{path}' collides with a file written by the mirror"
        )));
    }

    Ok(relative)
}

/// Ordered sequence of resource records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    records: Vec<ResourceRecord>,
}

impl Manifest {
    /// Create a manifest from records, keeping their order
    pub fn new(records: Vec<ResourceRecord>) -> Self {
        Self { records }
    }

    /// Manifest used when no local copy exists yet
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records that take part in hash-based syncing, in manifest order
    pub fn cacheable(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.records.iter().filter(|r| r.is_cacheable())
    }

    /// Decode a manifest document
    ///
    /// `origin` names where the bytes came from and only appears in errors.
    pub fn from_slice(bytes: &[u8], origin: &str) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::ManifestParseError(format!("{origin}: {e}")))
    }

    /// Decode a manifest from a streamed body
    pub fn from_reader<R: Read>(reader: R, origin: &str) -> Result<Self> {
        serde_json::from_reader(reader)
            .map_err(|e| Error::ManifestParseError(format!("{origin}: {e}")))
    }

    /// Encode as pretty-printed JSON with a trailing newline
    pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
        to_pretty_json(self)
    }

    /// Load the manifest persisted by a previous run
    ///
    /// Returns `None` when the directory holds no manifest. A manifest that
    /// exists but does not decode is an error, never an empty cache.
    pub fn load_local(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE);
        match fs::read(&path) {
            Ok(bytes) => {
                debug!("Read {} bytes from {}", bytes.len(), path.display());
                Self::from_slice(&bytes, &path.display().to_string()).map(Some)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::FilesystemError(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}

impl From<Vec<ResourceRecord>> for Manifest {
    fn from(records: Vec<ResourceRecord>) -> Self {
        Self::new(records)
    }
}

/// Serialize with four-space indentation and a trailing newline
pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| Error::ManifestParseError(format!("Failed to encode JSON: {e}")))?;
    buffer.push(b'\n');
    Ok(buffer)
}

/// Sibling file `write_atomic` stages its contents in
fn temp_path(dest_path: &Path) -> PathBuf {
    dest_path.with_extension("tmp")
}

/// Replace `dest_path` with `contents`
///
/// Writes a sibling temporary file, syncs it, then renames it over the
/// destination so readers see either the old or the new file, never a
/// truncated one.
pub(crate) fn write_atomic(dest_path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = temp_path(dest_path);

    let mut file = File::create(&temp_path).map_err(|e| {
        Error::FilesystemError(format!("Failed to create file {}: {e}", temp_path.display()))
    })?;
    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|e| {
            Error::FilesystemError(format!("Failed to write {}: {e}", temp_path.display()))
        })?;
    drop(file);

    fs::rename(&temp_path, dest_path).map_err(|e| {
        Error::FilesystemError(format!(
            "Failed to move {} to {}: {e}",
            temp_path.display(),
            dest_path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DATASETTE_MANIFEST: &str = r#"[
        {
            "name": "fixtures",
            "route": "fixtures",
            "path": "fixtures.db",
            "size": 258048,
            "is_mutable": false,
            "is_memory": false,
            "hash": "a1b2c3"
        },
        {
            "name": "_internal",
            "path": "_internal.db",
            "is_mutable": true,
            "hash": null
        },
        {
            "name": "live",
            "path": "live.db",
            "is_mutable": true,
            "hash": "ignored"
        }
    ]"#;

    #[test]
    fn test_decode_datasette_manifest() {
        let manifest = Manifest::from_slice(DATASETTE_MANIFEST.as_bytes(), "remote").unwrap();

        assert_eq!(manifest.len(), 3);
        let fixtures = &manifest.records()[0];
        assert_eq!(fixtures.path, "fixtures.db");
        assert_eq!(fixtures.content_hash.as_deref(), Some("a1b2c3"));
        assert!(!fixtures.mutable);
        assert_eq!(fixtures.extra.get("size"), Some(&Value::from(258048)));
        assert_eq!(fixtures.extra.get("name"), Some(&Value::from("fixtures")));

        assert_eq!(manifest.records()[1].content_hash, None);
    }

    #[test]
    fn test_cacheable_filter() {
        let manifest = Manifest::from_slice(DATASETTE_MANIFEST.as_bytes(), "remote").unwrap();
        let cacheable: Vec<&str> = manifest.cacheable().map(|r| r.path.as_str()).collect();
        assert_eq!(cacheable, vec!["fixtures.db"]);
    }

    #[test]
    fn test_mutable_record_has_no_cache_key() {
        let record = ResourceRecord::new("live.db", Some("abc"), true);
        assert!(!record.is_cacheable());
        assert_eq!(record.cache_key(), None);

        let record = ResourceRecord::new("fixtures.db", None, false);
        assert!(!record.is_cacheable());
        assert_eq!(record.cache_key(), None);

        let record = ResourceRecord::new("fixtures.db", Some("abc"), false);
        assert_eq!(record.cache_key(), Some("abc"));
    }

    #[test]
    fn test_missing_hash_decodes_as_null() {
        let manifest =
            Manifest::from_slice(br#"[{"path": "a.db", "is_mutable": false}]"#, "remote").unwrap();
        assert_eq!(manifest.records()[0].content_hash, None);
        assert!(!manifest.records()[0].is_cacheable());
    }

    #[test]
    fn test_reject_missing_mutable_flag() {
        let err = Manifest::from_slice(br#"[{"path": "a.db", "hash": "1"}]"#, "remote").unwrap_err();
        assert!(matches!(err, Error::ManifestParseError(ref m) if m.starts_with("remote:")));
    }

    #[test]
    fn test_reject_non_array_document() {
        let err = Manifest::from_slice(br#"{"databases": []}"#, "remote").unwrap_err();
        assert!(matches!(err, Error::ManifestParseError(_)));

        let err = Manifest::from_slice(b"<html>login</html>", "remote").unwrap_err();
        assert!(matches!(err, Error::ManifestParseError(_)));
    }

    #[test]
    fn test_pretty_json_format() {
        let manifest = Manifest::new(vec![ResourceRecord::new("fixtures.db", Some("1234"), false)]);
        let text = String::from_utf8(manifest.to_pretty_json().unwrap()).unwrap();

        assert_eq!(
            text,
            "[\n    {\n        \"path\": \"fixtures.db\",\n        \"hash\": \"1234\",\n        \"is_mutable\": false\n    }\n]\n"
        );
    }

    #[test]
    fn test_encoding_keeps_extra_fields() {
        let manifest = Manifest::from_slice(DATASETTE_MANIFEST.as_bytes(), "remote").unwrap();
        let encoded = manifest.to_pretty_json().unwrap();
        let reparsed = Manifest::from_slice(&encoded, "encoded").unwrap();
        assert_eq!(reparsed, manifest);

        let raw: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(raw[0]["is_memory"], Value::Bool(false));
        assert_eq!(raw[1]["hash"], Value::Null);
    }

    #[test]
    fn test_relative_path() {
        let record = ResourceRecord::new("fixtures.db", Some("1"), false);
        assert_eq!(record.relative_path().unwrap(), PathBuf::from("fixtures.db"));

        let record = ResourceRecord::new("./nested/extra.db", Some("1"), false);
        assert_eq!(record.relative_path().unwrap(), PathBuf::from("nested/extra.db"));
    }

    #[test]
    fn test_relative_path_rejects_escapes() {
        for path in ["../outside.db", "/etc/passwd", "a/../../b.db", "", "."] {
            let record = ResourceRecord::new(path, Some("1"), false);
            assert!(
                matches!(record.relative_path(), Err(Error::InvalidPath(_))),
                "{path:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_relative_path_rejects_mirror_files() {
        for path in ["databases.json", "metadata.json", "databases.tmp", "./metadata.tmp"] {
            assert!(
                matches!(relative_path(path), Err(Error::InvalidPath(ref m)) if m.contains("collides")),
                "{path:?} should be rejected"
            );
        }

        // Only the top level of the mirror directory is reserved
        assert_eq!(
            relative_path("nested/databases.json").unwrap(),
            PathBuf::from("nested/databases.json")
        );
    }

    #[test]
    fn test_load_local_missing() {
        let temp = TempDir::new().unwrap();
        assert!(Manifest::load_local(temp.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_local_existing() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(MANIFEST_FILE),
            r#"[{"path": "fixtures.db", "hash": "1234", "is_mutable": false}]"#,
        )
        .unwrap();

        let manifest = Manifest::load_local(temp.path()).unwrap().unwrap();
        assert_eq!(manifest.records()[0].content_hash.as_deref(), Some("1234"));
    }

    #[test]
    fn test_load_local_corrupt_is_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MANIFEST_FILE), "[{\"path\": ").unwrap();

        let err = Manifest::load_local(temp.path()).unwrap_err();
        assert!(matches!(err, Error::ManifestParseError(ref m) if m.contains(MANIFEST_FILE)));
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join(MANIFEST_FILE);
        fs::write(&dest, "old").unwrap();

        write_atomic(&dest, b"new\n").unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "new\n");
        assert!(!dest.with_extension("tmp").exists());
    }
}
