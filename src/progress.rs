// src/progress.rs

//! Progress reporting for resource downloads
//!
//! A `ProgressTracker` is handed to the chunked copy and told the cumulative
//! number of bytes written after every chunk. Reporting is advisory: a
//! tracker only observes the transfer and never touches the bytes.
//!
//! Implementations:
//! - `SilentProgress`: no-op, used when verbose output is off
//! - `LogProgress`: logs percentages to tracing
//! - `BarProgress`: byte progress bar using indicatif
//! - `CallbackProgress`: forwards events to a closure
//!
//! # Example
//!
//! ```ignore
//! use dbmirror::progress::{ProgressTracker, LogProgress};
//!
//! let progress = LogProgress::new();
//! progress.start("fixtures.db", 4096);
//! progress.set_position(2048);
//! progress.finish_with_message("fixtures.db [done]");
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{info, warn};

/// Core trait for download progress
pub trait ProgressTracker: Send + Sync {
    /// Begin a transfer of `length` bytes
    fn start(&self, name: &str, length: u64);

    /// Record the cumulative number of bytes written so far
    fn set_position(&self, position: u64);

    /// Finish the current transfer successfully
    fn finish_with_message(&self, message: &str);

    /// Finish the current transfer after a failure
    fn finish_with_error(&self, message: &str);
}

/// Pick the tracker for a run
///
/// Verbose runs get a bar on an interactive terminal and log lines
/// otherwise; quiet runs report nothing.
pub fn for_verbosity(verbose: bool) -> Box<dyn ProgressTracker> {
    if !verbose {
        Box::new(SilentProgress)
    } else if std::io::stderr().is_terminal() {
        Box::new(BarProgress::new())
    } else {
        Box::new(LogProgress::new())
    }
}

/// Fraction of `total` covered by `current`, clamped to 1.0
pub fn fraction(current: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (current as f64 / total as f64).min(1.0)
}

/// Silent progress tracker (no-op)
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressTracker for SilentProgress {
    fn start(&self, _name: &str, _length: u64) {}
    fn set_position(&self, _position: u64) {}
    fn finish_with_message(&self, _message: &str) {}
    fn finish_with_error(&self, _message: &str) {}
}

/// Logging progress tracker
///
/// Logs at info level each time another tenth of the transfer completes.
#[derive(Debug, Default)]
pub struct LogProgress {
    name: Mutex<String>,
    position: AtomicU64,
    length: AtomicU64,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for LogProgress {
    fn start(&self, name: &str, length: u64) {
        if let Ok(mut current) = self.name.lock() {
            *current = name.to_string();
        }
        self.position.store(0, Ordering::Relaxed);
        self.length.store(length, Ordering::Relaxed);
    }

    fn set_position(&self, position: u64) {
        let old_pos = self.position.swap(position, Ordering::Relaxed);
        let length = self.length.load(Ordering::Relaxed);
        if length == 0 {
            return;
        }

        // Log at 10% steps
        let interval = std::cmp::max(1, length / 10);
        if position / interval > old_pos / interval {
            let percent = (fraction(position, length) * 100.0) as u64;
            let name = self.name.lock().map(|n| n.clone()).unwrap_or_default();
            info!("{}: {}% ({}/{})", name, percent, position, length);
        }
    }

    fn finish_with_message(&self, message: &str) {
        info!("{}", message);
    }

    fn finish_with_error(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Byte progress bar for interactive terminals
#[derive(Default)]
pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                f(bar);
            }
        }
    }
}

/// Create a styled progress bar for resource downloads
fn create_progress_bar(length: u64, name: &str) -> ProgressBar {
    let pb = ProgressBar::new(length);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(name.to_string());
    pb
}

impl ProgressTracker for BarProgress {
    fn start(&self, name: &str, length: u64) {
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(create_progress_bar(length, name));
        }
    }

    fn set_position(&self, position: u64) {
        self.with_bar(|bar| bar.set_position(position));
    }

    fn finish_with_message(&self, message: &str) {
        self.with_bar(|bar| bar.finish_with_message(message.to_string()));
    }

    fn finish_with_error(&self, message: &str) {
        self.with_bar(|bar| bar.abandon_with_message(message.to_string()));
    }
}

/// Events emitted by callback progress tracker
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A transfer started
    Started { name: String, total: u64 },
    /// Cumulative bytes written
    Position { current: u64, total: u64 },
    /// Transfer finished successfully
    Finished(String),
    /// Transfer finished with error
    Error(String),
}

impl ProgressEvent {
    /// Completed fraction for position events
    pub fn fraction(&self) -> Option<f64> {
        match self {
            ProgressEvent::Position { current, total } => Some(fraction(*current, *total)),
            _ => None,
        }
    }
}

/// Callback-based progress tracker
pub struct CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
    length: AtomicU64,
    finished: AtomicBool,
}

impl<F> CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            length: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    /// Check if the last transfer finished
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

impl<F> ProgressTracker for CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn start(&self, name: &str, length: u64) {
        self.length.store(length, Ordering::Relaxed);
        self.finished.store(false, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Started {
            name: name.to_string(),
            total: length,
        });
    }

    fn set_position(&self, position: u64) {
        (self.callback)(ProgressEvent::Position {
            current: position,
            total: self.length.load(Ordering::Relaxed),
        });
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Finished(message.to_string()));
    }

    fn finish_with_error(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Error(message.to_string()));
    }
}
