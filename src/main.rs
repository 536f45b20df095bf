use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use setlist_export_lib::config::Settings;
use setlist_export_lib::report::Outcome;
use setlist_export_lib::setlistfm::HttpTransport;
use setlist_export_lib::utils;

/// Export the concerts a setlist.fm user attended as JSON files.
#[derive(Parser, Debug)]
#[command(name = "setlist-export")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to ./configuration.json)
    #[arg(short, long, env = "SETLIST_CONFIG")]
    config: Option<PathBuf>,

    /// Write into this directory instead of the configured outputPath
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Exit non-zero unless every page and file succeeded
    #[arg(long)]
    strict: bool,
}

fn load_settings(args: &Args) -> Result<Settings> {
    let path = utils::resolve_config_path(args.config.as_deref());
    let mut settings = Settings::load(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    if let Some(output) = &args.output {
        settings.output_path = output.clone();
    }
    Ok(settings)
}

fn exit_code(outcome: &Outcome, strict: bool) -> ExitCode {
    if strict && !outcome.is_success() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "setlist_export=info,setlist_export_lib=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(err) => {
            error!("{err:#}");
            return exit_code(&Outcome::Fatal(err.to_string()), args.strict);
        }
    };
    info!(
        "exporting attended setlists for {} into {}",
        settings.user,
        settings.output_path.display()
    );

    let report = setlist_export_lib::run(&settings, &HttpTransport::new());
    let outcome = report.outcome();
    match outcome {
        Outcome::Success => info!("{}", report.summary()),
        Outcome::Partial { .. } => warn!("{}", report.summary()),
        Outcome::Fatal(_) => error!("{}", report.summary()),
    }

    exit_code(&outcome, args.strict)
}
