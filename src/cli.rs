// src/cli.rs

//! Command-line interface definition

use crate::config::{DEFAULT_CONNECT_TIMEOUT, MirrorConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "dbmirror")]
#[command(author = "dbmirror Contributors")]
#[command(version)]
#[command(about = "Incrementally mirror the immutable database files of a Datasette instance", long_about = None)]
pub struct Cli {
    /// URL of the Datasette instance; only scheme and host are used
    pub source_url: String,

    /// Directory to mirror the databases into
    #[arg(default_value = ".")]
    pub destination_dir: PathBuf,

    /// API token sent as Authorization: Bearer
    #[arg(long, env = "DBMIRROR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Log each decision and show download progress
    #[arg(short, long)]
    pub verbose: bool,

    /// Seconds to wait for a connection
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    pub connect_timeout: u64,

    /// Total seconds allowed per request (unlimited if omitted)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

impl Cli {
    /// Turn parsed arguments into a run configuration
    pub fn into_config(self) -> MirrorConfig {
        let mut config = MirrorConfig::new(self.source_url, self.destination_dir)
            .with_verbose(self.verbose);
        if let Some(token) = self.token {
            config = config.with_token(token);
        }
        config.connect_timeout = Duration::from_secs(self.connect_timeout);
        config.timeout = self.timeout.map(Duration::from_secs);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["dbmirror", "https://latest.datasette.io/"]).unwrap();
        let config = cli.into_config();

        assert_eq!(config.source_url, "https://latest.datasette.io/");
        assert_eq!(config.destination_dir, PathBuf::from("."));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(config.timeout.is_none());
        assert!(!config.verbose);
    }

    #[test]
    fn test_all_options() {
        let cli = Cli::try_parse_from([
            "dbmirror",
            "latest.datasette.io",
            "mirror",
            "--token",
            "xyz",
            "-v",
            "--connect-timeout",
            "5",
            "--timeout",
            "600",
        ])
        .unwrap();
        let config = cli.into_config();

        assert_eq!(config.destination_dir, PathBuf::from("mirror"));
        assert_eq!(config.token.as_deref(), Some("xyz"));
        assert!(config.verbose);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_source_url_required() {
        assert!(Cli::try_parse_from(["dbmirror"]).is_err());
    }
}
