//! 🚀 scrollmeter-cli — the front door, the bouncer, the maitre d' of scrollmeter.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config, sets up logging,
//! wires Ctrl-C to the cancel token, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use scrollmeter::{FinalReport, ScanError};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// 📏 Add up the UTF-8 byte size of one field across every matching document in an index.
#[derive(Debug, Parser)]
#[command(name = "scrollmeter", version, about)]
struct Args {
    /// 🔧 TOML config file. Defaults to ./scrollmeter.toml when that exists; otherwise
    /// configuration comes from SCROLLMETER_* environment variables alone.
    config: Option<PathBuf>,

    /// 📝 Print a starter config (with the usual filters) to stdout and exit.
    #[arg(long)]
    sample_config: bool,
}

/// 🚀 main() — where it all begins. The genesis. The big bang.
/// The "I pressed F5 and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args, load config (the moment of truth)
/// 3. Run the scan (send it and pray 🙏)
/// 4. Print the report, or the cause chain and exit 1 (cry)
#[tokio::main]
async fn main() -> Result<()> {
    let started_at = Instant::now();

    // 📡 Set up tracing — because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if args.sample_config {
        print!("{}", scrollmeter::app_config::SAMPLE_CONFIG);
        return Ok(());
    }

    // 🔒 An explicit path has to exist; the default path is allowed to be missing.
    let config_file = match args.config {
        Some(path) => {
            let exists = path.try_exists().with_context(|| {
                format!(
                    "💀 Couldn't check whether the configuration file exists. If it's a relative path, \
                    try an absolute one to rule out a pwd/cwd mixup. Was checking here: '{}'",
                    path.display()
                )
            })?;
            anyhow::ensure!(exists, "💀 Configuration file '{}' does not exist.", path.display());
            Some(path)
        }
        None => {
            let default_path = PathBuf::from("scrollmeter.toml");
            default_path.try_exists().unwrap_or(false).then_some(default_path)
        }
    };

    // 🔧 Load the config — this is the moment where we find out if the TOML is valid
    // or if someone put a tab where a space should be (looking at you, Kevin)
    let app_config = scrollmeter::app_config::load_config(config_file.as_deref())
        .context("💀 In scrollmeter-cli, main, we couldn't load the configuration. Check the TOML file and any SCROLLMETER_* env vars.")?;

    // 🛑 Ctrl-C flips the token; the paginator notices at its next fetch or send.
    // A second Ctrl-C means "no, really": exit on the spot with the SIGINT status.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if trigger.is_cancelled() {
                error!("🛑 Second Ctrl-C. Leaving without saying goodbye to the cluster.");
                std::process::exit(130);
            }
            warn!("🛑 Ctrl-C received, stopping the scan... (press again to force quit)");
            trigger.cancel();
        }
    });

    // 🚀 SEND IT. No take-backs. This is not a drill.
    let result = scrollmeter::run(app_config, cancel, started_at).await;

    match result {
        Ok(stats) => {
            // ✅ If we got here, everything worked. Pop the champagne. 🍾
            println!("{}", FinalReport::from(&stats));
            Ok(())
        }
        Err(err) => {
            report_failure(&err);
            // 🗑️ Exit with prejudice. Process exitus maximus.
            std::process::exit(1);
        }
    }
}

/// 💀 Print the error and every cause under it, plus a hint when it smells like the
/// cluster simply isn't there.
fn report_failure(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        // -- 🕵️ sniff the cause like a truffle pig hunting for connection problems
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

    if let Some(scan_error) = err.downcast_ref::<ScanError>() {
        error!("🏷️  kind: {}", scan_error.kind());
    }

    // -- 📡 if it smells like a connection problem, it's probably a connection problem
    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: looks like Elasticsearch isn't reachable. \
            Double-check the url in source_config, and that the cluster is actually running. \
            If you're using Docker, try `docker ps` to see what's up. \
            Even servers need a nudge sometimes. ☕"
        );
    }
}
