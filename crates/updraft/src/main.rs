use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio::sync::mpsc;
use updraft::core::{AuthHeader, ConfigError, Connectivity};
use updraft::{
    AlwaysConnected, AppPaths, AppPathsError, CoordinatorError, DownloadError, DownloadProgress,
    DownloadReport, Downloader, JsonFileStore, RunOutcome, SettingsError, SkipReason, StateError,
    StateStore, TcpReachability, UpdateCoordinator, UpdateHandler, UpdateOffer, UpdaterSettings,
    cleanup_previous_downloads, file_name_from_url, logging, unique_download_path,
};

const APP_NAME: &str = "updraft";

#[derive(Parser)]
#[command(
    name = "updraft",
    version,
    about = "Check release hosts for a newer build and download it"
)]
struct Cli {
    /// Settings file; defaults to settings.json in the config directory
    #[arg(long, global = true, env = "UPDRAFT_CONFIG")]
    config: Option<PathBuf>,

    /// Keep settings, state, logs and downloads under one directory
    #[arg(long, global = true, env = "UPDRAFT_HOME")]
    home: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask the configured endpoints for a newer release
    Check {
        /// Ignore the minimum interval between checks
        #[arg(long)]
        force: bool,
        /// Download the release when one is found
        #[arg(long)]
        download: bool,
    },
    /// Download a file with the configured retry policy
    Download {
        url: String,
        /// Destination file; defaults to a free name in the download directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Extra request header, `Name: value`
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<AuthHeader>,
    },
    /// Delete artifacts left behind by earlier downloads
    Cleanup,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

fn parse_header(raw: &str) -> Result<AuthHeader, String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name must not be empty".to_string());
    }
    Ok(AuthHeader::new(name, value.trim()))
}

struct PrintHandler;

#[async_trait]
impl UpdateHandler for PrintHandler {
    async fn on_update(&self, offer: &UpdateOffer) {
        println!(
            "Update available: {} -> {} (via {})",
            offer.current_version, offer.new_version, offer.endpoint
        );
        println!("  download: {}", offer.download_url);
        if let Some(url) = &offer.learn_more_url {
            println!("  details:  {url}");
        }
        if let Some(notes) = &offer.release_notes {
            println!();
            println!("{}", notes.trim());
        }
    }
}

fn destination_for(dir: &Path, url: &str) -> PathBuf {
    let name = file_name_from_url(url).unwrap_or_default();
    let name = Path::new(&name);
    let stem = name
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("update");
    let extension = name.extension().and_then(OsStr::to_str).unwrap_or("");
    unique_download_path(dir, stem, extension)
}

async fn fetch(
    settings: &UpdaterSettings,
    store: Arc<dyn StateStore>,
    url: &str,
    headers: &[AuthHeader],
    destination: &Path,
) -> Result<DownloadReport, CliError> {
    let (sender, mut receiver) = mpsc::channel(32);
    let downloader = Downloader::new(settings.http_client()?, store)
        .with_retry_policy(settings.retry_policy())
        .with_progress(sender);

    let printer = tokio::spawn(async move {
        let mut last_percent = None;
        while let Some(event) = receiver.recv().await {
            match event {
                DownloadProgress::Downloading { downloaded, total } if total > 0 => {
                    let percent = downloaded * 100 / total;
                    if last_percent != Some(percent) && percent % 10 == 0 {
                        eprintln!("  {percent}%");
                        last_percent = Some(percent);
                    }
                }
                DownloadProgress::Retrying {
                    next_attempt,
                    delay,
                    reason,
                } => {
                    eprintln!(
                        "  attempt failed ({reason}); retrying in {}s (attempt {next_attempt})",
                        delay.as_secs()
                    );
                }
                _ => {}
            }
        }
    });

    let result = downloader.download(url, headers, destination).await;
    drop(downloader);
    let _ = printer.await;

    let report = result?;
    println!(
        "Saved {} ({} bytes, {} attempt(s))",
        report.path.display(),
        report.bytes,
        report.attempts
    );
    Ok(report)
}

async fn check(
    settings: &UpdaterSettings,
    store: Arc<dyn StateStore>,
    download_dir: &Path,
    force: bool,
    download: bool,
) -> Result<ExitCode, CliError> {
    let client = settings.http_client()?;
    let connectivity: Arc<dyn Connectivity> = if settings.skip_connectivity_check {
        Arc::new(AlwaysConnected)
    } else {
        Arc::new(TcpReachability::default())
    };

    let coordinator = UpdateCoordinator::builder()
        .parsed_current_version(settings.current()?)
        .chain(settings.build_chain(&client)?)
        .check_interval(settings.check_interval())
        .connectivity(connectivity)
        .state_store(Arc::clone(&store))
        .handler(Arc::new(PrintHandler))
        .build()?;

    let outcome = if force {
        coordinator.force_run().await?
    } else {
        coordinator.run().await?
    };

    match outcome {
        RunOutcome::Skipped(SkipReason::Offline) => {
            println!("No network connection; skipped the update check");
        }
        RunOutcome::Skipped(SkipReason::IntervalNotElapsed { next_check }) => {
            println!("Checked recently; next check due at {next_check} (use --force to check now)");
        }
        RunOutcome::UpToDate { endpoint, latest } => {
            println!(
                "Up to date: {} (latest {latest} via {endpoint})",
                coordinator.current_version()
            );
        }
        RunOutcome::UpdateOffered(offer) => {
            if download {
                let destination = destination_for(download_dir, &offer.download_url);
                let headers: Vec<AuthHeader> = offer.auth_header.into_iter().collect();
                fetch(settings, store, &offer.download_url, &headers, &destination).await?;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let paths = match &cli.home {
        Some(home) => AppPaths::rooted(home),
        None => AppPaths::new(APP_NAME)?,
    };
    paths.ensure_dirs().map_err(|source| CliError::Io {
        context: "failed to create application directories",
        source,
    })?;

    let settings_path = cli.config.unwrap_or_else(|| paths.settings_file());
    let settings = UpdaterSettings::load_from(&settings_path)?;
    logging::init_logging(&logging::LogOptions {
        path: paths.log_file(),
        debug: cli.verbose || settings.debug_logging,
        max_bytes: settings.max_log_size_bytes,
    });

    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(paths.state_file()));
    let download_dir = settings
        .download_dir
        .clone()
        .unwrap_or_else(|| paths.download_dir.clone());

    match cli.command {
        Command::Check { force, download } => {
            check(&settings, store, &download_dir, force, download).await
        }
        Command::Download {
            url,
            output,
            headers,
        } => {
            let destination = output.unwrap_or_else(|| destination_for(&download_dir, &url));
            fetch(&settings, store, &url, &headers, &destination).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Cleanup => {
            let report = cleanup_previous_downloads(store.as_ref())?;
            println!(
                "Removed {} file(s); {} kept for a later attempt",
                report.removed.len(),
                report.kept.len()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            log::error!("{error}");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
