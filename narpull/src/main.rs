use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use narpull::{Config, Fetcher, HttpSubstituters, Resolver};

#[derive(Debug, Parser)]
#[command(
    name = "narpull",
    version,
    about = "Download store paths and their closures from signed binary caches"
)]
struct Cli {
    /// Store root directory
    #[arg(long, value_name = "DIR", default_value = "/nix/store")]
    store: PathBuf,

    /// Binary cache URL; may be repeated, tried in order
    #[arg(long = "substituter", value_name = "URL")]
    substituters: Vec<String>,

    /// Trusted cache public key as NAME:BASE64; may be repeated
    #[arg(long = "public-key", value_name = "NAME:B64")]
    public_keys: Vec<String>,

    /// Store paths to download, as /nix/store/HASH-NAME or bare HASH-NAME
    #[arg(required = true, value_name = "STORE_PATH")]
    paths: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries one line per manifested path; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = Arc::new(Config::new(&cli.store, cli.substituters, cli.public_keys)?);
    let source = HttpSubstituters::new(config.substituters.clone())
        .context("failed to build narinfo HTTP client")?;
    let fetcher = Fetcher::new(Arc::clone(&config)).context("failed to build NAR HTTP client")?;
    let resolver = Resolver::new(&config, &source);

    // requested paths are independent: keep going after a failure and
    // report it in the exit code
    let mut all_ok = true;
    for arg in &cli.paths {
        let base = match config.parse_store_arg(arg) {
            Ok(base) => base,
            Err(err) => {
                error!("skipping `{arg}`: {err}");
                all_ok = false;
                continue;
            }
        };

        let plan = match resolver.resolve(&base).await {
            Ok(plan) => plan,
            Err(err) => {
                error!("failed to resolve `{base}`: {err}");
                all_ok = false;
                continue;
            }
        };

        if let Err(err) = fetcher.run(plan).await {
            error!("failed to download `{base}`: {err}");
            all_ok = false;
        }
    }
    Ok(all_ok)
}
