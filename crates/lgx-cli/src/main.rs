//! 🚀 lgx-cli — the front door, the bouncer, the maitre d' of lgx.
//!
//! 🎬 *[narrator voice]* "It all started with a pipe..."
//! 📦 Thin wrapper: parse args, set up logging, load config, then let the library do
//! the heavy lifting. stdout belongs to the fallback sink, so everything we say goes
//! to stderr. Like a manager who only communicates in side channels. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncRead;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🪵 Ship NDJSON logs into a search index, with a local fallback.
#[derive(Debug, Parser)]
#[command(name = "lgx-cli", version, about)]
struct Args {
    /// 🔧 TOML config file. Defaults to `lgx.toml` when it exists, env vars (LGX_*) otherwise.
    config: Option<PathBuf>,

    /// 📥 Read NDJSON from this file instead of stdin.
    #[arg(long, short)]
    input: Option<PathBuf>,
}

/// 🚀 main() — where it all begins.
///
/// 🔧 Steps:
/// 1. Init tracing, on stderr
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Run the thing
/// 5. Print the report, or handle errors (cry)
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(err) = ship(args).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like the index isn't reachable. \
                Double-check that Elasticsearch is actually running at the configured url. \
                If you're using Docker, try `docker ps` to see what's up, \
                or `docker compose up -d` to resurrect it. ☕"
            );
        }

        std::process::exit(1);
    }
    Ok(())
}

async fn ship(args: Args) -> Result<()> {
    // 🔒 explicit path must exist; the implicit default is optional
    let config_file = match args.config {
        Some(path) => {
            let exists = path.try_exists().context(format!(
                "💀 Couldn't check whether the config file exists. Was checking here: '{}'",
                path.display()
            ))?;
            anyhow::ensure!(
                exists,
                "💀 Configuration file '{}' doesn't exist. Maybe it's a pwd/cwd thing with relative paths. \
                 Use an absolute path to be absolutely certain.",
                path.display()
            );
            Some(path)
        }
        None => {
            let default_path = PathBuf::from("lgx.toml");
            default_path.is_file().then_some(default_path)
        }
    };

    let app_config = lgx::app_config::load_config(config_file.as_deref()).context(
        "💀 In lgx-cli we couldn't load the config. Take a look at the file and the LGX_* \
         environment, make sure you didn't forget something obvious.",
    )?;

    let input: Box<dyn AsyncRead + Unpin + Send> = match &args.input {
        Some(path) => Box::new(tokio::fs::File::open(path).await.context(format!(
            "💀 The input file '{}' could not be opened. It was supposed to be full of logs. \
             It is, at best, full of mystery.",
            path.display()
        ))?),
        None => Box::new(tokio::io::stdin()),
    };

    let report = lgx::run(app_config, input).await?;
    eprintln!("{}", report.render_table());
    Ok(())
}
