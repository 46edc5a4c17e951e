//! sealdrop: share encrypted files through a remote object store
//!
//! Commands:
//!   seal <file>                     - encrypt, publish, print the share link
//!   unseal <link> [--dest DIR]      - fetch, decrypt, print the placed path
//!   retry <staged> <link>           - unseal a kept ciphertext with a new passphrase
//!   staging ls | purge              - inspect or clear leftover staged files
//!   config show                     - display the active configuration
//!   status                          - show storage reachability and staging state

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use zeroize::Zeroize;

use sealdrop_core::config::expand_tilde;
use sealdrop_core::{SealConfig, SealError};
use sealdrop_pipeline::{Sealer, StagingArea, Unsealer};
use sealdrop_storage::{OpendalRemote, StorageCredentials};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealdrop",
    version,
    about = "Seal files with a passphrase and share them by link"
)]
struct Cli {
    /// Path to sealdrop.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SEALDROP_CONFIG",
        default_value = "~/.sealdrop/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "SEALDROP_LOG", global = true)]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "SEALDROP_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file and publish it; prints the share link
    Seal {
        file: PathBuf,
        /// Read the passphrase from this environment variable instead of prompting
        #[arg(long)]
        passphrase_env: Option<String>,
    },

    /// Fetch and decrypt a shared file; prints the path it was written to
    Unseal {
        /// Share link (https://<share_base>/file/<id>)
        link: String,
        /// Destination directory
        #[arg(long, short = 'd', default_value = ".")]
        dest: PathBuf,
        #[arg(long)]
        passphrase_env: Option<String>,
    },

    /// Retry an unseal that failed on a wrong passphrase, reusing the kept ciphertext
    Retry {
        /// Staged ciphertext path printed by the failed unseal
        staged: PathBuf,
        link: String,
        #[arg(long, short = 'd', default_value = ".")]
        dest: PathBuf,
        #[arg(long)]
        passphrase_env: Option<String>,
    },

    /// Staged file maintenance
    Staging {
        #[command(subcommand)]
        action: StagingAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show storage reachability and staging state
    Status,
}

#[derive(Subcommand, Debug)]
enum StagingAction {
    /// List staged files left behind by failed or interrupted runs
    Ls,
    /// Delete every staged file
    Purge,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = SealConfig::load(&config_path)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| parse_log_format(&config.log.format));
    init_logging(&level, &format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "sealdrop starting"
    );

    match cli.command {
        Commands::Seal { file, passphrase_env } => {
            cmd_seal(&config, &file, passphrase_env.as_deref()).await
        }
        Commands::Unseal { link, dest, passphrase_env } => {
            cmd_unseal(&config, &link, &dest, passphrase_env.as_deref()).await
        }
        Commands::Retry { staged, link, dest, passphrase_env } => {
            cmd_retry(&config, &staged, &link, &dest, passphrase_env.as_deref()).await
        }
        Commands::Staging { action: StagingAction::Ls } => cmd_staging_ls(&config).await,
        Commands::Staging { action: StagingAction::Purge } => cmd_staging_purge(&config).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
        Commands::Status => cmd_status(&config).await,
    }
}

fn parse_log_format(s: &str) -> LogFormat {
    match s {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

/// Logs go to stderr so stdout carries only links and paths.
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Remote service from environment credentials ───────────────────────────────

/// Build the remote using S3 credentials from the environment.
///
/// Reads SEALDROP_ACCESS_KEY_ID/SEALDROP_SECRET_ACCESS_KEY, falling back to
/// the standard AWS_* variables.
fn build_remote(config: &SealConfig) -> Result<OpendalRemote> {
    let creds = StorageCredentials::from_env().context(
        "S3 credentials not set\n\
         Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY (or SEALDROP_*) environment variables.",
    )?;
    let op = sealdrop_storage::build_from_core_config(&config.storage, &creds)
        .context("building storage operator")?;
    Ok(OpendalRemote::new(op, &config.storage.prefix))
}

// ── Passphrase input ──────────────────────────────────────────────────────────

/// Read a passphrase from `env_var`, or prompt on the terminal. Sealing
/// prompts twice.
fn read_passphrase(env_var: Option<&str>, confirm: bool) -> Result<SecretString> {
    if let Some(var) = env_var {
        let value = std::env::var(var)
            .with_context(|| format!("passphrase variable {var} is not set"))?;
        if value.is_empty() {
            anyhow::bail!("passphrase variable {var} is empty");
        }
        return Ok(SecretString::from(value));
    }

    let first = rpassword::prompt_password("Passphrase: ").context("reading passphrase")?;
    if first.is_empty() {
        anyhow::bail!("empty passphrase");
    }
    if confirm {
        let mut second =
            rpassword::prompt_password("Confirm passphrase: ").context("reading passphrase")?;
        let matches = first == second;
        second.zeroize();
        if !matches {
            let mut first = first;
            first.zeroize();
            anyhow::bail!("passphrases do not match");
        }
    }
    Ok(SecretString::from(first))
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `sealdrop seal` ───────────────────────────────────────────────────────────

async fn cmd_seal(config: &SealConfig, file: &Path, passphrase_env: Option<&str>) -> Result<()> {
    let passphrase = read_passphrase(passphrase_env, true)?;
    let sealer = Sealer::from_config(build_remote(config)?, config);

    let pb = make_spinner("seal");
    pb.set_message(format!("{}", file.display()));
    let result = sealer.seal(file, &passphrase).await;
    pb.finish_and_clear();

    let outcome = result.with_context(|| format!("sealing {}", file.display()))?;
    eprintln!(
        "sealed {} ({} bytes, checksum {})",
        file.display(),
        outcome.bytes,
        &outcome.checksum[..16.min(outcome.checksum.len())]
    );
    println!("{}", outcome.link);
    Ok(())
}

// ── `sealdrop unseal` / `sealdrop retry` ──────────────────────────────────────

async fn cmd_unseal(
    config: &SealConfig,
    link: &str,
    dest: &Path,
    passphrase_env: Option<&str>,
) -> Result<()> {
    let passphrase = read_passphrase(passphrase_env, false)?;
    let unsealer = Unsealer::from_config(build_remote(config)?, config);

    let pb = make_spinner("unseal");
    pb.set_message(link.to_string());
    let result = unsealer.unseal(link, &passphrase, dest).await;
    pb.finish_and_clear();

    report_unseal(result, link, dest)
}

async fn cmd_retry(
    config: &SealConfig,
    staged: &Path,
    link: &str,
    dest: &Path,
    passphrase_env: Option<&str>,
) -> Result<()> {
    let passphrase = read_passphrase(passphrase_env, false)?;
    let unsealer = Unsealer::from_config(build_remote(config)?, config);

    let pb = make_spinner("retry");
    pb.set_message(staged.display().to_string());
    let result = unsealer.retry(staged, link, &passphrase, dest).await;
    pb.finish_and_clear();

    report_unseal(result, link, dest)
}

fn report_unseal(
    result: sealdrop_core::SealResult<sealdrop_pipeline::UnsealOutcome>,
    link: &str,
    dest: &Path,
) -> Result<()> {
    match result {
        Ok(outcome) => {
            println!("{}", outcome.path.display());
            Ok(())
        }
        Err(SealError::Authentication { staged }) => {
            eprintln!("wrong passphrase (or the file was tampered with).");
            eprintln!("the downloaded ciphertext was kept at {}", staged.display());
            eprintln!(
                "retry with: sealdrop retry {} '{link}' --dest {}",
                staged.display(),
                dest.display()
            );
            anyhow::bail!("authentication failed")
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("unsealing {link}"))),
    }
}

// ── `sealdrop staging` ────────────────────────────────────────────────────────

async fn cmd_staging_ls(config: &SealConfig) -> Result<()> {
    let area = StagingArea::new(config.staging_dir());
    let entries = area.list().await?;

    if entries.is_empty() {
        println!("no staged files in {}", area.dir().display());
        return Ok(());
    }
    for entry in &entries {
        let age = entry
            .modified
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .map(format_age)
            .unwrap_or_else(|| "?".into());
        println!("{:>10}  {:>8}  {}", entry.size, age, entry.path.display());
    }
    println!("{} staged file(s)", entries.len());
    Ok(())
}

async fn cmd_staging_purge(config: &SealConfig) -> Result<()> {
    let area = StagingArea::new(config.staging_dir());
    let removed = area.purge().await?;
    println!("removed {removed} staged file(s) from {}", area.dir().display());
    Ok(())
}

fn format_age(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

// ── `sealdrop config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &SealConfig, path: &Path) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("serializing config")?;
    println!("# config: {}", path.display());
    print!("{rendered}");
    Ok(())
}

// ── `sealdrop status` ─────────────────────────────────────────────────────────

async fn cmd_status(config: &SealConfig) -> Result<()> {
    let area = StagingArea::new(config.staging_dir());
    let staged = area.list().await?;

    println!("sealdrop v{}", env!("CARGO_PKG_VERSION"));
    println!("  share base:  {}", config.service.share_base);
    println!("  api base:    {}", config.service.api_base);
    println!(
        "  staging:     {} ({} staged file(s))",
        area.dir().display(),
        staged.len()
    );
    println!(
        "  size limit:  {} MB",
        config.limits.max_file_size_mb
    );

    let storage = format!(
        "{} bucket={} prefix={}",
        config.storage.endpoint, config.storage.bucket, config.storage.prefix
    );
    match build_remote(config) {
        Ok(remote) => {
            match sealdrop_storage::check_health(remote.operator(), remote.prefix()).await {
                Ok(rtt) => println!("  storage:     {storage} [ok, {} ms]", rtt.as_millis()),
                Err(e) => println!("  storage:     {storage} [UNREACHABLE: {e}]"),
            }
        }
        Err(e) => println!("  storage:     {storage} [NOT CONFIGURED: {e:#}]"),
    }
    Ok(())
}
