// src/reconcile.rs

//! Plan computation between the remote and the cached manifest.
//!
//! Only cacheable records (immutable, with a hash) take part. Everything
//! else in the remote manifest is ignored by the sync mechanism, and nothing
//! present only locally is ever pruned.

use std::collections::HashMap;
use std::fmt;

use crate::manifest::Manifest;

/// What to do with one cacheable remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Download the resource
    Fetch,
    /// The cached copy already has this hash
    Skip,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Fetch => write!(f, "fetch"),
            Decision::Skip => write!(f, "skip"),
        }
    }
}

/// One entry of a sync plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub path: String,
    /// Hash advertised by the remote manifest
    pub remote_hash: String,
    /// Hash recorded by the cached manifest, if the path was cached
    pub cached_hash: Option<String>,
    pub decision: Decision,
}

/// Fetch-or-skip decision for every cacheable remote resource, in remote
/// manifest order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    entries: Vec<PlanEntry>,
    /// Remote records left out of the plan because they are not cacheable
    ignored: usize,
}

impl SyncPlan {
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Paths to download, in manifest order
    pub fn to_fetch(&self) -> Vec<&str> {
        self.paths_with(Decision::Fetch)
    }

    /// Paths whose cached copy is current, in manifest order
    pub fn to_skip(&self) -> Vec<&str> {
        self.paths_with(Decision::Skip)
    }

    /// Decision for a path, or `None` if the path is not part of the plan
    pub fn decision(&self, path: &str) -> Option<Decision> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.decision)
    }

    /// Number of remote records that are mutable or carry no hash
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    /// Check if nothing needs downloading
    pub fn is_up_to_date(&self) -> bool {
        self.entries.iter().all(|e| e.decision == Decision::Skip)
    }

    fn paths_with(&self, decision: Decision) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.decision == decision)
            .map(|e| e.path.as_str())
            .collect()
    }
}

/// Compute the sync plan for `remote` given the `cached` manifest
///
/// A cacheable remote record is skipped iff the cached manifest holds a
/// cacheable record with the same path and the same hash. When a path
/// repeats in the remote manifest, the entry keeps the position of the first
/// occurrence and the hash of the last; a repeated cached path resolves to
/// its last occurrence.
pub fn reconcile(remote: &Manifest, cached: &Manifest) -> SyncPlan {
    let cached_hashes: HashMap<&str, &str> = cached
        .records()
        .iter()
        .filter_map(|r| r.cache_key().map(|hash| (r.path.as_str(), hash)))
        .collect();

    let mut order: Vec<&str> = Vec::new();
    let mut remote_hashes: HashMap<&str, &str> = HashMap::new();
    let mut ignored = 0;

    for record in remote.records() {
        match record.cache_key() {
            Some(hash) => {
                if remote_hashes.insert(record.path.as_str(), hash).is_none() {
                    order.push(record.path.as_str());
                }
            }
            None => ignored += 1,
        }
    }

    let entries = order
        .into_iter()
        .map(|path| {
            let remote_hash = remote_hashes[path];
            let cached_hash = cached_hashes.get(path).copied();
            let decision = if cached_hash == Some(remote_hash) {
                Decision::Skip
            } else {
                Decision::Fetch
            };

            PlanEntry {
                path: path.to_string(),
                remote_hash: remote_hash.to_string(),
                cached_hash: cached_hash.map(str::to_string),
                decision,
            }
        })
        .collect();

    SyncPlan { entries, ignored }
}
