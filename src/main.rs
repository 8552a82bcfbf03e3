#![forbid(unsafe_code)]

mod candidates;
mod error;
mod plan;
mod prelude;
mod resolve;
mod server;
mod setup;
mod store;
mod util;
mod validate;
mod vocab;

#[cfg(test)]
mod test_util;

use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use url::Url;

use crate::prelude::*;

const DEFAULT_DB_PATH: &str = "data/pypi-data.sqlite";
const DEFAULT_DB_URL: &str =
    "https://github.com/pypi-data/pypi-json-data/releases/download/latest/pypi-data.sqlite.gz";

#[derive(Parser)]
#[command(
    name = "depsolve",
    version,
    about = "Dependency resolution service over a PyPI metadata snapshot"
)]
struct Cli {
    /// Increase verbosity. (Can be repeated.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Reduce verbosity. (Can be repeated.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP resolution service
    Serve {
        /// Path to the metadata database
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db: PathBuf,
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:8000")]
        listen: SocketAddr,
        /// Admit pre-release versions as candidates everywhere
        #[arg(long)]
        allow_prereleases: bool,
        /// Per-request wall-clock budget, in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Download and trim the metadata database
    Setup {
        /// Where to put the database
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db: PathBuf,
        /// Where to fetch the gzipped snapshot from
        #[arg(long, default_value = DEFAULT_DB_URL)]
        url: Url,
        /// Re-fetch even if a healthy database is already present
        #[arg(long)]
        force: bool,
    },
    /// Resolve one request from a JSON file (or stdin) and print the response
    Resolve {
        /// Path to the metadata database
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db: PathBuf,
        /// Admit pre-release versions as candidates everywhere
        #[arg(long)]
        allow_prereleases: bool,
        /// Wall-clock budget, in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// The request JSON; stdin when omitted
        request: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8, quiet: u8) {
    use tracing_subscriber::filter::LevelFilter;

    let level = match 2 + verbose as i16 - quiet as i16 {
        i16::MIN..=-1 => LevelFilter::OFF,
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Serve {
            db,
            listen,
            allow_prereleases,
            timeout,
        } => {
            let config = server::ServiceConfig {
                db_path: db,
                allow_prereleases,
                timeout: timeout.map(Duration::from_secs),
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(config, listen))
        }
        Command::Setup { db, url, force } => setup::run(&db, &url, force),
        Command::Resolve {
            db,
            allow_prereleases,
            timeout,
            request,
        } => {
            let text = match &request {
                Some(path) => std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("reading request from {}", path.display()))?,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            let body: serde_json::Value =
                serde_json::from_str(&text).wrap_err("request is not valid JSON")?;
            let config = server::ServiceConfig {
                db_path: db,
                allow_prereleases,
                timeout: timeout.map(Duration::from_secs),
            };
            let (status, response) = server::execute(&config, &body);
            println!("{}", serde_json::to_string_pretty(&response)?);

            let ok = status == 200
                && response.get("status").and_then(|s| s.as_str()) == Some("ok");
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
