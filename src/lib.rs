// src/lib.rs

//! dbmirror
//!
//! Incrementally mirror the immutable SQLite databases published by a
//! Datasette instance into a local directory.
//!
//! # Architecture
//!
//! - Manifest-driven: the remote `-/databases.json` lists every database
//!   with its content hash; a copy of it in the mirror directory records
//!   what is already on disk
//! - Pure reconciliation: comparing the two manifests yields a fetch-or-skip
//!   plan without touching the network or filesystem
//! - Commit last: the local manifest is replaced only after every download
//!   and the metadata copy succeeded

pub mod cli;
pub mod client;
pub mod config;
mod error;
pub mod manifest;
pub mod progress;
pub mod reconcile;
pub mod sync;

pub use client::{FetchResponse, MirrorClient, Redirects, Transport, TransportError};
pub use config::{MirrorConfig, Remote};
pub use error::{Error, Result};
pub use manifest::{MANIFEST_FILE, METADATA_FILE, Manifest, ResourceRecord};
pub use progress::{
    BarProgress, CallbackProgress, LogProgress, ProgressEvent, ProgressTracker, SilentProgress,
};
pub use reconcile::{Decision, PlanEntry, SyncPlan, reconcile};
pub use sync::{RunState, SyncDriver, SyncReport, run};
