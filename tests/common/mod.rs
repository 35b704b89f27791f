// tests/common/mod.rs

//! Shared helpers for integration tests against a mock Datasette instance.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Contents served for `fixtures.db`
pub const FIXTURES_DB: &[u8] = b"SQLite format 3\0fixtures";

/// Manifest listing the usual Datasette demo databases
///
/// `fixtures.db` is immutable and cacheable, `_internal` is mutable and has
/// no hash.
pub fn demo_manifest(fixtures_hash: &str) -> Value {
    json!([
        {
            "name": "fixtures",
            "path": "fixtures.db",
            "size": FIXTURES_DB.len(),
            "is_mutable": false,
            "is_memory": false,
            "hash": fixtures_hash
        },
        {
            "name": "_internal",
            "path": "_internal.db",
            "size": 0,
            "is_mutable": true,
            "is_memory": false,
            "hash": null
        }
    ])
}

pub fn demo_metadata() -> Value {
    json!({
        "title": "Datasette Fixtures",
        "license": "Apache License 2.0",
        "databases": {"fixtures": {"description": "Test tables"}}
    })
}

/// Start a server that serves the demo manifest, metadata and database
///
/// `expected_downloads` is the number of times `fixtures.db` must be
/// requested before the server is dropped.
pub async fn demo_server(fixtures_hash: &str, expected_downloads: u64) -> MockServer {
    let server = MockServer::start().await;
    mount_manifest(&server, demo_manifest(fixtures_hash)).await;
    mount_metadata(&server).await;

    Mock::given(method("GET"))
        .and(path("/fixtures.db"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(FIXTURES_DB))
        .expect(expected_downloads)
        .mount(&server)
        .await;

    server
}

pub async fn mount_manifest(server: &MockServer, manifest: Value) {
    Mock::given(method("GET"))
        .and(path("/-/databases.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
        .mount(server)
        .await;
}

pub async fn mount_metadata(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/-/metadata.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(demo_metadata()))
        .mount(server)
        .await;
}

/// Write a cached manifest into a mirror directory
pub fn seed_cache(dir: &Path, manifest: &Value) {
    fs::write(
        dir.join("databases.json"),
        serde_json::to_vec_pretty(manifest).unwrap(),
    )
    .unwrap();
}

/// Decode the manifest committed to a mirror directory
pub fn committed_manifest(dir: &Path) -> Value {
    serde_json::from_slice(&fs::read(dir.join("databases.json")).unwrap()).unwrap()
}

/// Sorted file names in a directory
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
