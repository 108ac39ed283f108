//! Release helper for HXMP Space.
//!
//! Provides commands for:
//! - Bumping the application version
//! - Stamping the build timestamp and writing deployment metadata
//! - Rewriting HTML pages to load the cache buster
//!
//! ## Usage
//!
//! ```bash
//! # Start a new patch release
//! hxmp-deploy bump patch
//!
//! # Right before building the site
//! hxmp-deploy pre-deploy --environment staging
//!
//! # Migrate pages off the legacy no-cache meta tags
//! hxmp-deploy update-html xrhome.html auth-gateway.html
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hxmp_core::{init_logging, now_millis, AppConfig, DeployInfo, LogConfig, LogFormat};
use tracing::{debug, info, Level};

mod html;
mod version;

use version::{bump_version, Bump};

#[derive(Parser)]
#[command(name = "hxmp-deploy")]
#[command(about = "Release helper for HXMP Space")]
struct Cli {
    /// Project configuration file
    #[arg(short, long, default_value = "hxmp.json", global = true)]
    config: PathBuf,

    /// Log what is being done
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format: pretty, compact or json
    #[arg(long, default_value = "compact", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Increment the application version
    Bump {
        #[arg(value_enum, default_value = "patch")]
        part: Bump,
    },

    /// Stamp the build timestamp and write deployment metadata
    PreDeploy {
        /// Deployment metadata output path
        #[arg(short, long, default_value = "deploy-info.json")]
        output: PathBuf,
        /// Target environment
        #[arg(short, long, env = "HXMP_ENV", default_value = "production")]
        environment: String,
    },

    /// Remove legacy no-cache meta tags and inject the cache-buster script
    UpdateHtml {
        /// HTML files to rewrite
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    init_logging(LogConfig {
        level,
        format: cli.log_format,
        ..LogConfig::default()
    })?;

    match cli.command {
        Commands::Bump { part } => {
            let (old, new) = bump(&cli.config, part)?;
            println!("Version bumped: {old} -> {new}");
            println!("Next: run `hxmp-deploy pre-deploy`, then build and deploy.");
        }

        Commands::PreDeploy {
            output,
            environment,
        } => {
            let (config, info) = pre_deploy(&cli.config, &output, &environment, now_millis())?;
            println!("Deployment info written to: {}", output.display());
            println!("  Version:     {}", info.version);
            println!("  Timestamp:   {}", info.timestamp);
            println!("  Date:        {}", info.date);
            println!("  Environment: {}", info.environment);
            println!("  Cache:       {}", config.cache_name());
        }

        Commands::UpdateHtml { files } => {
            for file in &files {
                match update_html_file(file)? {
                    HtmlOutcome::Missing => println!("Skipping {} - not found", file.display()),
                    HtmlOutcome::Updated => println!("Updated {}", file.display()),
                    HtmlOutcome::Unchanged => println!("No changes needed for {}", file.display()),
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Bump the version in the config file. Returns the old and new versions.
fn bump(config_path: &Path, part: Bump) -> Result<(String, String)> {
    let mut config = load_config(config_path)?;
    let old = config.release.app_version.clone();
    let new = bump_version(&old, part)?;

    config.release.app_version = new.clone();
    config
        .save(config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;
    info!(from = %old, to = %new, "Version bumped");
    Ok((old, new))
}

/// Stamp the build timestamp into the config file and write `output`.
///
/// The worker's cache name is derived from the same config, so it follows
/// the version without further edits.
fn pre_deploy(
    config_path: &Path,
    output: &Path,
    environment: &str,
    timestamp: i64,
) -> Result<(AppConfig, DeployInfo)> {
    let mut config = load_config(config_path)?;
    config.release.build_timestamp = timestamp;
    config
        .save(config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;
    info!(timestamp, "Updated build timestamp");

    let info = DeployInfo::new(&config.current_version(), environment);
    let json = serde_json::to_string_pretty(&info)?;
    fs::write(output, json).with_context(|| format!("writing {}", output.display()))?;
    info!(path = %output.display(), version = %info.version, "Created deployment info file");

    Ok((config, info))
}

#[derive(Debug, PartialEq, Eq)]
enum HtmlOutcome {
    Missing,
    Updated,
    Unchanged,
}

fn update_html_file(path: &Path) -> Result<HtmlOutcome> {
    if !path.exists() {
        return Ok(HtmlOutcome::Missing);
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    match html::update_html(&content) {
        Some(updated) => {
            fs::write(path, updated).with_context(|| format!("writing {}", path.display()))?;
            debug!(path = %path.display(), "Rewrote page");
            Ok(HtmlOutcome::Updated)
        }
        None => Ok(HtmlOutcome::Unchanged),
    }
}
