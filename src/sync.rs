// src/sync.rs

//! Incremental mirror run
//!
//! One run walks `START -> MANIFEST_FETCHED -> PLAN_COMPUTED -> FETCHING ->
//! METADATA_MIRRORED -> COMMITTED`. Any failure moves the driver to
//! `ABORTED` and returns the error.
//!
//! The local `databases.json` is rewritten only in the final step, after
//! every download has been written and synced. A run that stops earlier
//! leaves it exactly as it was, so the next run computes the same plan or a
//! superset of it.

use crate::client::{MirrorClient, Redirects, Transport, stream_to_file};
use crate::config::{MirrorConfig, Remote};
use crate::error::{Error, Result};
use crate::manifest::{self, MANIFEST_FILE, METADATA_FILE, Manifest};
use crate::progress::{self, ProgressTracker};
use crate::reconcile::{Decision, PlanEntry, SyncPlan, reconcile};
use fs2::FileExt;
use reqwest::header::HeaderMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    ManifestFetched,
    PlanComputed,
    /// `completed` of `total` downloads are on disk
    Fetching { completed: usize, total: usize },
    MetadataMirrored,
    Committed,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Start => write!(f, "START"),
            RunState::ManifestFetched => write!(f, "MANIFEST_FETCHED"),
            RunState::PlanComputed => write!(f, "PLAN_COMPUTED"),
            RunState::Fetching { completed, total } => {
                write!(f, "FETCHING({completed}/{total})")
            }
            RunState::MetadataMirrored => write!(f, "METADATA_MIRRORED"),
            RunState::Committed => write!(f, "COMMITTED"),
            RunState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Outcome of a committed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Downloaded paths, in manifest order
    pub fetched: Vec<String>,
    /// Paths whose cached copy was already current
    pub skipped: Vec<String>,
    /// Remote records that are mutable or carry no hash
    pub ignored: usize,
    pub bytes_written: u64,
}

/// Drives one mirror run against a [`Transport`]
pub struct SyncDriver<T: Transport> {
    transport: T,
    remote: Remote,
    destination: PathBuf,
    headers: HeaderMap,
    verbose: bool,
    progress: Box<dyn ProgressTracker>,
    state: RunState,
}

impl SyncDriver<MirrorClient> {
    /// Create a driver that talks HTTP
    pub fn from_config(config: MirrorConfig) -> Result<Self> {
        let client = MirrorClient::new(&config)?;
        Self::with_transport(config, client)
    }
}

impl<T: Transport> SyncDriver<T> {
    /// Create a driver over any transport
    pub fn with_transport(config: MirrorConfig, transport: T) -> Result<Self> {
        let remote = config.remote()?;
        let headers = config.auth_headers()?;

        Ok(Self {
            transport,
            remote,
            headers,
            verbose: config.verbose,
            progress: progress::for_verbosity(config.verbose),
            destination: config.destination_dir,
            state: RunState::Start,
        })
    }

    /// Replace the progress tracker used in verbose mode
    pub fn with_progress(mut self, progress: Box<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    /// Perform a full run
    pub fn run(&mut self) -> Result<SyncReport> {
        self.state = RunState::Start;
        match self.execute() {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!("Sync aborted in state {}: {}", self.state, e);
                self.state = RunState::Aborted;
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<SyncReport> {
        let remote_manifest = self.fetch_manifest()?;
        self.transition(RunState::ManifestFetched);

        self.prepare_destination()?;
        let cached = self.load_cached()?;
        let plan = reconcile(&remote_manifest, &cached);
        self.transition(RunState::PlanComputed);

        // Reject unsafe paths before the first byte is written
        let downloads = plan
            .entries()
            .iter()
            .filter(|e| e.decision == Decision::Fetch)
            .map(|e| manifest::relative_path(&e.path).map(|relative| (e, relative)))
            .collect::<Result<Vec<_>>>()?;

        for path in plan.to_skip() {
            info!("Skipping {}, hash has not changed", path);
        }

        let total = downloads.len();
        let mut bytes_written = 0;
        for (completed, (entry, relative)) in downloads.iter().enumerate() {
            self.transition(RunState::Fetching { completed, total });
            bytes_written += self.fetch_resource(entry, relative)?;
        }
        self.transition(RunState::Fetching {
            completed: total,
            total,
        });

        self.mirror_metadata()?;
        self.transition(RunState::MetadataMirrored);

        self.commit(&remote_manifest)?;
        self.transition(RunState::Committed);

        let report = build_report(&plan, bytes_written);
        info!(
            "Mirror complete: {} fetched, {} unchanged, {} ignored ({} bytes)",
            report.fetched.len(),
            report.skipped.len(),
            report.ignored,
            report.bytes_written
        );
        Ok(report)
    }

    fn transition(&mut self, next: RunState) {
        debug!("{} -> {}", self.state, next);
        self.state = next;
    }

    /// GET `-/databases.json` without following redirects
    fn fetch_manifest(&self) -> Result<Manifest> {
        let url = self.remote.manifest_url();
        info!("Fetching manifest from {}", url);

        let response = self
            .transport
            .get(&url, &self.headers, Redirects::Refuse)
            .map_err(|e| Error::ManifestUnavailable(format!("Could not access {url}: {e}")))?;

        if !response.is_ok() {
            let hint = if (300..400).contains(&response.status) {
                " (redirect refused, check the source URL)"
            } else {
                ""
            };
            return Err(Error::ManifestUnavailable(format!(
                "Could not access {url}: HTTP {}{hint}",
                response.status
            )));
        }

        let manifest = Manifest::from_reader(response.body, &url)?;
        debug!("Remote manifest lists {} databases", manifest.len());
        Ok(manifest)
    }

    fn prepare_destination(&self) -> Result<()> {
        fs::create_dir_all(&self.destination).map_err(|e| {
            Error::FilesystemError(format!(
                "Failed to create directory {}: {e}",
                self.destination.display()
            ))
        })
    }

    fn load_cached(&self) -> Result<Manifest> {
        match Manifest::load_local(&self.destination)? {
            Some(cached) => {
                info!(
                    "Found existing {}, {} cached databases",
                    MANIFEST_FILE,
                    cached.cacheable().count()
                );
                for record in cached.cacheable() {
                    debug!("  {} = {}", record.path, record.cache_key().unwrap_or_default());
                }
                Ok(cached)
            }
            None => {
                debug!("No {} in {}", MANIFEST_FILE, self.destination.display());
                Ok(Manifest::empty())
            }
        }
    }

    /// Download one resource into the mirror directory
    fn fetch_resource(&self, entry: &PlanEntry, relative: &Path) -> Result<u64> {
        let url = self.remote.resource_url(&entry.path);
        info!(
            "Fetching {}, current hash {} != {}",
            entry.path,
            entry.remote_hash,
            entry.cached_hash.as_deref().unwrap_or("None")
        );

        let mut response = self
            .transport
            .get(&url, &self.headers, Redirects::Follow)
            .map_err(|e| Error::FetchFailure(format!("Failed to fetch {url}: {e}")))?;

        if !response.is_ok() {
            return Err(Error::FetchFailure(format!(
                "HTTP {} from {url}",
                response.status
            )));
        }

        let dest_path = self.destination.join(relative);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::FilesystemError(format!("Failed to create directory {}: {e}", parent.display()))
            })?;
        }

        // Lock before truncating so a concurrent run cannot interleave writes
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&dest_path)
            .map_err(|e| {
                Error::FilesystemError(format!("Failed to create file {}: {e}", dest_path.display()))
            })?;
        file.try_lock_exclusive().map_err(|e| {
            Error::FilesystemError(format!(
                "{} is locked by another process: {e}",
                dest_path.display()
            ))
        })?;
        file.set_len(0).map_err(|e| {
            Error::FilesystemError(format!("Failed to truncate {}: {e}", dest_path.display()))
        })?;

        let progress = match response.content_length {
            Some(length) if self.verbose => {
                self.progress.start(&entry.path, length);
                Some(self.progress.as_ref())
            }
            _ => None,
        };

        let result = stream_to_file(&mut *response.body, &mut file, progress);
        if let Some(progress) = progress {
            match &result {
                Ok(_) => progress.finish_with_message(&format!("{} [done]", entry.path)),
                Err(e) => progress.finish_with_error(&format!("{} [FAILED: {e}]", entry.path)),
            }
        }

        let written = result?;
        debug!("Wrote {} bytes to {}", written, dest_path.display());
        Ok(written)
    }

    /// Copy `-/metadata.json` into the mirror directory
    fn mirror_metadata(&self) -> Result<()> {
        let url = self.remote.metadata_url();
        info!("Fetching metadata from {}", url);

        let response = self
            .transport
            .get(&url, &self.headers, Redirects::Follow)
            .map_err(|e| Error::FetchFailure(format!("Failed to fetch {url}: {e}")))?;

        if !response.is_ok() {
            return Err(Error::FetchFailure(format!(
                "HTTP {} from {url}",
                response.status
            )));
        }

        let metadata: serde_json::Value = serde_json::from_reader(response.body)
            .map_err(|e| Error::ManifestParseError(format!("{url}: {e}")))?;

        manifest::write_atomic(
            &self.destination.join(METADATA_FILE),
            &manifest::to_pretty_json(&metadata)?,
        )
    }

    /// Persist the remote manifest as the new local cache state
    fn commit(&self, remote_manifest: &Manifest) -> Result<()> {
        let path = self.destination.join(MANIFEST_FILE);
        manifest::write_atomic(&path, &remote_manifest.to_pretty_json()?)?;
        debug!("Committed {} records to {}", remote_manifest.len(), path.display());
        Ok(())
    }
}

fn build_report(plan: &SyncPlan, bytes_written: u64) -> SyncReport {
    SyncReport {
        fetched: plan.to_fetch().into_iter().map(str::to_string).collect(),
        skipped: plan.to_skip().into_iter().map(str::to_string).collect(),
        ignored: plan.ignored(),
        bytes_written,
    }
}

/// Mirror the instance described by `config` over HTTP
pub fn run(config: MirrorConfig) -> Result<SyncReport> {
    SyncDriver::from_config(config)?.run()
}
