// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Mirrors the arguments of `src/cli.rs`
fn build_cli() -> Command {
    Command::new("dbmirror")
        .version(env!("CARGO_PKG_VERSION"))
        .author("dbmirror Contributors")
        .about("Incrementally mirror the immutable database files of a Datasette instance")
        .arg(
            Arg::new("source_url")
                .required(true)
                .value_name("SOURCE_URL")
                .help("URL of the Datasette instance; only scheme and host are used"),
        )
        .arg(
            Arg::new("destination_dir")
                .value_name("DESTINATION_DIR")
                .default_value(".")
                .help("Directory to mirror the databases into"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .value_name("TOKEN")
                .env("DBMIRROR_TOKEN")
                .help("API token sent as Authorization: Bearer"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log each decision and show download progress"),
        )
        .arg(
            Arg::new("connect_timeout")
                .long("connect-timeout")
                .value_name("SECONDS")
                .default_value("30")
                .help("Seconds to wait for a connection"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Total seconds allowed per request (unlimited if omitted)"),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("dbmirror.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
