// src/client.rs

//! HTTP transport for mirror operations
//!
//! The sync driver talks to the network only through the [`Transport`]
//! trait, so the fetch loop can be exercised without a server. The
//! production implementation wraps a blocking reqwest client.

use crate::config::MirrorConfig;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use std::fs::File;
use std::io::{Read, Write};
use tracing::debug;

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Whether a request may follow HTTP redirects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    /// Follow redirects (resource and metadata downloads)
    Follow,
    /// Return 3xx responses as-is (manifest retrieval)
    Refuse,
}

/// A request that never produced a response
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Status, declared length and streamed body of a response
pub struct FetchResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl FetchResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Blocking GET with headers
pub trait Transport {
    fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        redirects: Redirects,
    ) -> std::result::Result<FetchResponse, TransportError>;
}

/// reqwest-backed transport
///
/// Holds two clients because reqwest fixes the redirect policy per client.
pub struct MirrorClient {
    client: Client,
    strict: Client,
}

impl MirrorClient {
    /// Create a client using the timeouts from `config`
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let build = |policy: Policy| {
            Client::builder()
                .user_agent(concat!("dbmirror/", env!("CARGO_PKG_VERSION")))
                .connect_timeout(config.connect_timeout)
                .timeout(config.timeout)
                .redirect(policy)
                .build()
                .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))
        };

        Ok(Self {
            client: build(Policy::default())?,
            strict: build(Policy::none())?,
        })
    }
}

impl Transport for MirrorClient {
    fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        redirects: Redirects,
    ) -> std::result::Result<FetchResponse, TransportError> {
        let client = match redirects {
            Redirects::Follow => &self.client,
            Redirects::Refuse => &self.strict,
        };

        debug!("GET {}", url);
        let response = client
            .get(url)
            .headers(headers.clone())
            .send()
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(FetchResponse {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}

/// Stream a response body to `file` in bounded chunks
///
/// Never buffers more than one chunk in memory. When `progress` is given it
/// is told the cumulative byte count after each chunk. Returns the number
/// of bytes written.
pub fn stream_to_file<R: Read + ?Sized>(
    body: &mut R,
    file: &mut File,
    progress: Option<&dyn ProgressTracker>,
) -> Result<u64> {
    let mut written: u64 = 0;
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];

    loop {
        let bytes_read = body
            .read(&mut buffer)
            .map_err(|e| Error::FetchFailure(format!("Failed to read response: {e}")))?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .map_err(|e| Error::FilesystemError(format!("Failed to write data: {e}")))?;

        written += bytes_read as u64;

        if let Some(progress) = progress {
            progress.set_position(written);
        }
    }

    file.flush()
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::FilesystemError(format!("Failed to flush data: {e}")))?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CallbackProgress, ProgressEvent};
    use std::io::{self, Cursor};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[test]
    fn test_stream_copies_all_bytes() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("big.db");
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();

        let mut file = File::create(&dest).unwrap();
        let written = stream_to_file(&mut Cursor::new(data.clone()), &mut file, None).unwrap();
        drop(file);

        assert_eq!(written, data.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn test_stream_reports_cumulative_positions() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("big.db");
        let data = vec![7u8; STREAM_BUFFER_SIZE * 2 + 100];

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let progress = CallbackProgress::new(move |event| sink.lock().unwrap().push(event));
        progress.start("big.db", data.len() as u64);

        let mut file = File::create(&dest).unwrap();
        stream_to_file(&mut Cursor::new(data.clone()), &mut file, Some(&progress)).unwrap();

        let positions: Vec<u64> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Position { current, .. } => Some(*current),
                _ => None,
            })
            .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(positions.last().copied(), Some(data.len() as u64));
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn test_progress_does_not_change_bytes() {
        let temp = TempDir::new().unwrap();
        let data = b"fixtures!".to_vec();

        let quiet = temp.path().join("quiet.db");
        let mut file = File::create(&quiet).unwrap();
        stream_to_file(&mut Cursor::new(data.clone()), &mut file, None).unwrap();

        let loud = temp.path().join("loud.db");
        let progress = CallbackProgress::new(|_| {});
        let mut file = File::create(&loud).unwrap();
        stream_to_file(&mut Cursor::new(data.clone()), &mut file, Some(&progress)).unwrap();

        assert_eq!(std::fs::read(quiet).unwrap(), std::fs::read(loud).unwrap());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"))
        }
    }

    #[test]
    fn test_stream_read_error_is_fetch_failure() {
        let temp = TempDir::new().unwrap();
        let mut file = File::create(temp.path().join("x.db")).unwrap();

        let err = stream_to_file(&mut FailingReader, &mut file, None).unwrap_err();
        assert!(matches!(err, Error::FetchFailure(ref m) if m.contains("reset by peer")));
    }

    #[test]
    fn test_client_builds_from_config() {
        let config = MirrorConfig::new("https://example.com", ".");
        assert!(MirrorClient::new(&config).is_ok());
    }
}
