//! rpenc: content pack encryption CLI
//!
//! Commands:
//!   encrypt <pack> [-o out]  - encrypt one pack (zip archive or unpacked directory)
//!   batch <dir>              - encrypt every pack archive in a directory
//!   inspect <archive>        - report whether an archive is already encrypted
//!   keygen [--random]        - print the machine-derived or a random master key
//!   config show              - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use rpenc_core::config::RpencConfig;
use rpenc_core::RpencError;
use rpenc_crypto::{machine_master_key, random_master_key, ContentHashDeriver, MasterKey};
use rpenc_pack::archive::read_contents_header;
use rpenc_pack::PackEncrypter;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "rpenc",
    version,
    about = "Content pack encryption",
    long_about = "rpenc: encrypt content packs so only a runtime holding the master key can read them"
)]
struct Cli {
    /// Path to rpenc.toml configuration file
    #[arg(long, short = 'c', env = "RPENC_CONFIG", default_value = "/etc/rpenc/config.toml")]
    config: PathBuf,

    /// Log level (overrides config; RUST_LOG wins over both)
    #[arg(long, env = "RPENC_LOG")]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long, env = "RPENC_LOG_FORMAT")]
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
    /// Encrypt a single pack
    ///
    /// PACK may be a zip archive or an unpacked pack directory. The pack root
    /// is the first directory (depth-first) holding a manifest.json.
    Encrypt {
        /// Pack archive or directory
        pack: PathBuf,
        /// Output archive (default: <output_dir>/<pack file name>)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Encrypt every pack archive in a directory
    ///
    /// Entries that are not archives are skipped with a warning. A failing
    /// pack is reported and the batch moves on.
    Batch {
        /// Directory holding pack archives
        dir: PathBuf,
        /// Output directory (overrides config)
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
        /// Concurrent encryptions (overrides config; 0 = available parallelism)
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
    },

    /// Show whether an archive already carries an encrypted contents.json
    Inspect {
        /// Pack archive
        archive: PathBuf,
    },

    /// Print a master key
    ///
    /// Without --random, prints the key derived from this machine's identifier,
    /// which is what `encrypt` and `batch` use when no key is configured.
    Keygen {
        /// Generate a random 32-character alphanumeric key instead
        #[arg(long)]
        random: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current configuration (merged with defaults)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, from_file) = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| log_format_from_config(&config.logging.format));
    init_logging(&level, &format);

    if !from_file {
        warn!(path = %cli.config.display(), "config file not found, using defaults");
    } else if config.config_file_mode_check {
        check_config_mode(&cli.config);
    }

    match cli.command {
        Commands::Encrypt { pack, output } => cmd_encrypt(&config, &pack, output.as_deref()).await,
        Commands::Batch { dir, output_dir, jobs } => {
            cmd_batch(&config, &dir, output_dir.as_deref(), jobs).await
        }
        Commands::Inspect { archive } => cmd_inspect(&archive),
        Commands::Keygen { random } => cmd_keygen(random),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

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

fn log_format_from_config(format: &str) -> LogFormat {
    if format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

// ── Config ────────────────────────────────────────────────────────────────────

/// Load the config file, or defaults when it does not exist.
/// The flag reports whether the file was found.
async fn load_config(path: &Path) -> Result<(RpencConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config: RpencConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((RpencConfig::default(), false))
    }
}

/// The config may hold the master key; warn when others can read it.
#[cfg(unix)]
fn check_config_mode(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) if meta.permissions().mode() & 0o004 != 0 => {
            warn!(
                path = %path.display(),
                mode = %format!("{:o}", meta.permissions().mode() & 0o777),
                "config file is world-readable"
            );
        }
        Ok(_) => {}
        Err(e) => debug!(path = %path.display(), "cannot stat config: {e}"),
    }
}

#[cfg(not(unix))]
fn check_config_mode(_path: &Path) {}

fn expand_tilde(path: &Path) -> PathBuf {
    expand_tilde_with(path, &std::env::var("HOME").unwrap_or_default())
}

fn expand_tilde_with(path: &Path, home: &str) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        PathBuf::from(format!("{home}/{rest}"))
    } else {
        path.to_path_buf()
    }
}

/// Resolve the master key: config `key` > `key_file` > machine-derived.
fn resolve_master_key(config: &RpencConfig) -> Result<String> {
    let key = if let Some(key) = &config.encryption.key {
        debug!("master key from config");
        key.clone()
    } else if let Some(file) = &config.encryption.key_file {
        let file = expand_tilde(file);
        debug!(path = %file.display(), "master key from key file");
        std::fs::read_to_string(&file)
            .with_context(|| format!("reading key file: {}", file.display()))?
            .trim_end_matches(['\r', '\n'])
            .to_string()
    } else {
        debug!("master key derived from machine id");
        machine_master_key().context("deriving machine master key")?
    };

    MasterKey::from_slice(key.as_bytes()).context("invalid master key")?;
    Ok(key)
}

fn encrypter(config: &RpencConfig) -> PackEncrypter {
    PackEncrypter::new(expand_tilde(&config.packs.working_dir))
}

/// `<archive>.key`, read by the serving runtime to unlock the pack.
fn key_file_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".key");
    PathBuf::from(name)
}

/// Write the master key next to `archive`, readable by the owner only.
fn write_key_file(archive: &Path, master_key: &str) -> Result<PathBuf> {
    use std::io::Write;

    let path = key_file_path(archive);
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(&path)
        .with_context(|| format!("creating key file: {}", path.display()))?;
    // mode() only applies on creation; tighten a pre-existing file too
    set_permission_0600(&path)
        .with_context(|| format!("restricting key file: {}", path.display()))?;
    file.write_all(master_key.as_bytes())
        .with_context(|| format!("writing key file: {}", path.display()))?;
    Ok(path)
}

#[cfg(unix)]
fn set_permission_0600(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_permission_0600(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `rpenc encrypt` ───────────────────────────────────────────────────────────

async fn cmd_encrypt(config: &RpencConfig, pack: &Path, output: Option<&Path>) -> Result<()> {
    let master_key = resolve_master_key(config)?;

    let dest = match output {
        Some(p) => p.to_path_buf(),
        None => {
            let name = pack
                .file_name()
                .with_context(|| format!("no file name in {}", pack.display()))?;
            let dest = expand_tilde(&config.packs.output_dir);
            if pack.is_dir() {
                dest.join(format!("{}.zip", name.to_string_lossy()))
            } else {
                dest.join(name)
            }
        }
    };
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating output dir: {}", parent.display()))?;
    }

    let spinner = make_spinner("encrypt");
    spinner.set_message(pack.display().to_string());

    let encrypter = encrypter(config);
    let input = pack.to_path_buf();
    let key = master_key.clone();
    let result = tokio::task::spawn_blocking(move || {
        if input.is_dir() {
            encrypter.encrypt_dir(&input, key.as_bytes(), &ContentHashDeriver)
        } else {
            encrypter.encrypt_archive(&input, key.as_bytes(), &ContentHashDeriver)
        }
    })
    .await
    .context("encryption task panicked")?;

    let pack_out = match result {
        Ok(p) => p,
        Err(e) => {
            spinner.finish_with_message("failed".to_string());
            return Err(e).with_context(|| format!("encrypting {}", pack.display()));
        }
    };
    spinner.finish_with_message("done".to_string());

    let uuid = pack_out.uuid().to_string();
    let name = pack_out.name().map(str::to_owned);
    let (encrypted, passthrough) = (pack_out.encrypted_files(), pack_out.passthrough_files());
    let dest = pack_out
        .persist(&dest)
        .with_context(|| format!("writing {}", dest.display()))?;

    println!();
    println!("Encrypted:");
    println!("  pack:        {}", name.as_deref().unwrap_or("(unnamed)"));
    println!("  uuid:        {uuid}");
    println!("  output:      {}", dest.display());
    println!("  encrypted:   {encrypted}");
    println!("  passthrough: {passthrough}");
    if config.packs.write_key_files {
        let key_path = write_key_file(&dest, &master_key)?;
        println!("  key file:    {}", key_path.display());
    }
    Ok(())
}

// ── `rpenc batch` ─────────────────────────────────────────────────────────────

#[derive(Debug)]
enum BatchOutcome {
    Encrypted { dest: PathBuf, files: usize },
    AlreadyEncrypted { uuid: String },
}

/// Everything one batch worker needs, cloned into each blocking task.
#[derive(Clone)]
struct BatchJob {
    encrypter: PackEncrypter,
    master_key: Arc<str>,
    output_dir: PathBuf,
    skip_encrypted: bool,
    write_key_files: bool,
}

impl BatchJob {
    fn run(&self, archive: &Path) -> Result<BatchOutcome> {
        if self.skip_encrypted {
            if let Some(header) = read_contents_header(archive)? {
                return Ok(BatchOutcome::AlreadyEncrypted {
                    uuid: header.uuid.to_string(),
                });
            }
        }

        let pack = self
            .encrypter
            .encrypt_archive(archive, self.master_key.as_bytes(), &ContentHashDeriver)?;
        let files = pack.encrypted_files();

        let name = archive
            .file_name()
            .with_context(|| format!("no file name in {}", archive.display()))?;
        let dest = pack.persist(self.output_dir.join(name))?;
        if self.write_key_files {
            write_key_file(&dest, &self.master_key)?;
        }
        Ok(BatchOutcome::Encrypted { dest, files })
    }
}

/// Split the entries of `dir` into pack archives and skipped paths.
///
/// `exclude` (the output directory) is left out silently.
fn scan_batch_dir(
    config: &RpencConfig,
    dir: &Path,
    exclude: &Path,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory: {}", dir.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("reading directory: {}", dir.display()))?;
    entries.sort();

    let exclude = exclude.canonicalize().unwrap_or_else(|_| exclude.to_path_buf());
    let mut archives = Vec::new();
    let mut skipped = Vec::new();
    for path in entries {
        if path.canonicalize().map(|p| p == exclude).unwrap_or(false) {
            continue;
        }
        let is_archive = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| config.packs.is_pack_extension(e));
        if is_archive {
            archives.push(path);
        } else {
            skipped.push(path);
        }
    }
    Ok((archives, skipped))
}

fn resolve_jobs(jobs: usize) -> usize {
    if jobs > 0 {
        jobs
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

async fn cmd_batch(
    config: &RpencConfig,
    dir: &Path,
    output_dir: Option<&Path>,
    jobs: Option<usize>,
) -> Result<()> {
    let master_key = resolve_master_key(config)?;
    let output_dir = expand_tilde(output_dir.unwrap_or(&config.packs.output_dir));
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("creating output dir: {}", output_dir.display()))?;

    let (archives, skipped) = scan_batch_dir(config, dir, &output_dir)?;
    for path in &skipped {
        warn!(path = %path.display(), "not a pack archive, skipping");
    }
    if archives.is_empty() {
        println!("No pack archives found in {}", dir.display());
        return Ok(());
    }

    let concurrency = resolve_jobs(jobs.unwrap_or(config.packs.jobs));
    info!(packs = archives.len(), concurrency, "starting batch");

    let job = BatchJob {
        encrypter: encrypter(config),
        master_key: Arc::from(master_key),
        output_dir: output_dir.clone(),
        skip_encrypted: config.packs.skip_encrypted,
        write_key_files: config.packs.write_key_files,
    };
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let pb = make_progress_bar(archives.len() as u64, "batch");

    let mut tasks = JoinSet::new();
    for archive in archives {
        let semaphore = semaphore.clone();
        let job = job.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            let path = archive.clone();
            let outcome = tokio::task::spawn_blocking(move || job.run(&path)).await?;
            anyhow::Ok((archive, outcome))
        });
    }

    let (mut encrypted, mut already, mut failed) = (0usize, 0usize, 0usize);
    while let Some(joined) = tasks.join_next().await {
        pb.inc(1);
        let (archive, outcome) = match joined {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                error!("batch task failed: {e:#}");
                failed += 1;
                continue;
            }
            Err(e) => {
                error!("batch task panicked: {e}");
                failed += 1;
                continue;
            }
        };
        let name = archive.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        match outcome {
            Ok(BatchOutcome::Encrypted { dest, files }) => {
                info!(archive = %archive.display(), dest = %dest.display(), files, "encrypted");
                pb.set_message(name);
                encrypted += 1;
            }
            Ok(BatchOutcome::AlreadyEncrypted { uuid }) => {
                info!(archive = %archive.display(), %uuid, "already encrypted, skipping");
                already += 1;
            }
            Err(e) => {
                let pack_fault = e.downcast_ref::<RpencError>().is_some_and(RpencError::is_pack_error);
                if pack_fault {
                    warn!(archive = %archive.display(), "skipping pack: {e:#}");
                } else {
                    error!(archive = %archive.display(), "encryption failed: {e:#}");
                }
                failed += 1;
            }
        }
    }
    pb.finish_with_message("done".to_string());

    println!();
    println!("Batch complete:");
    println!("  encrypted:         {encrypted}");
    println!("  already encrypted: {already}");
    println!("  not archives:      {}", skipped.len());
    println!("  failed:            {failed}");
    println!("  output:            {}", output_dir.display());

    if failed > 0 {
        anyhow::bail!("{failed} pack(s) failed to encrypt");
    }
    Ok(())
}

// ── `rpenc inspect` ───────────────────────────────────────────────────────────

fn cmd_inspect(archive: &Path) -> Result<()> {
    let header = read_contents_header(archive)
        .with_context(|| format!("inspecting {}", archive.display()))?;

    println!("Archive: {}", archive.display());
    match header {
        Some(header) => {
            println!("  encrypted: yes");
            println!("  uuid:      {}", header.uuid);
            let key_path = key_file_path(archive);
            if key_path.exists() {
                println!("  key file:  {}", key_path.display());
            }
        }
        None => println!("  encrypted: no"),
    }
    Ok(())
}

// ── `rpenc keygen` ────────────────────────────────────────────────────────────

fn cmd_keygen(random: bool) -> Result<()> {
    let key = if random {
        random_master_key()
    } else {
        machine_master_key().context("deriving machine master key")?
    };
    println!("{key}");
    Ok(())
}

// ── `rpenc config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &RpencConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
