use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use fetchq::config::{Config, Profile, Site};
use fetchq::parser::ParserKind;
use fetchq::queue::Queue;
use fetchq::template::base_name;
use fetchq::transport::{FsDirLister, LftpClient, RemoteEntry, Transport};
use std::fs::OpenOptions;
use std::io::BufReader;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "fetchq", version, about = "Build and run transfer queues for remote listing services", long_about = None)]
struct Cli {
    /// Path to config
    #[arg(short = 'f', long = "config", default_value = "~/.fetchq.yaml")]
    config: String,

    /// Print queue and exit
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,

    /// Format to use in dry-run mode
    #[arg(short = 'F', long = "format", value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Validate config, print it as JSON and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Do not print output from the transfer client
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Build queues from stdin instead of remote listings
    #[arg(short = 'i', long = "import")]
    import: bool,

    /// Override local destination template for this run
    #[arg(short = 'l', long = "local-dir")]
    local_dir: Option<String>,

    /// Path to the lftp program
    #[arg(short = 'p', long = "lftp", default_value = "lftp")]
    lftp: String,

    /// Classify a release name, print its local destination and exit
    #[arg(short = 'c', long = "classify", value_name = "NAME")]
    classify: Option<String>,

    /// Directory to write daily-rotated log files to
    #[arg(long = "log-dir")]
    log_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Exclusive lockfile preventing concurrent listing runs. Removed on drop;
/// import and dry-run paths do not take it.
struct Lockfile {
    path: std::path::PathBuf,
}

impl Lockfile {
    fn acquire() -> Result<Self> {
        let path = std::env::temp_dir().join(".fetchqlock");
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("already running: {}", path.display()))?;
        Ok(Self { path })
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!("failed to remove lockfile {}: {}", self.path.display(), err);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _guard = match fetchq::logging::setup_logging(cli.log_dir.as_deref(), cli.quiet) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("fetchq: {err:#}");
            std::process::exit(1);
        }
    };
    if let Err(err) = run(&cli) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load(expand_home(&cli.config)?)?;
    if let Some(template) = &cli.local_dir {
        config.override_template(template)?;
    }
    if cli.test {
        println!("{}", config.to_json()?);
        return Ok(());
    }
    if let Some(name) = &cli.classify {
        return classify(&config, name);
    }
    let client = LftpClient::new(&cli.lftp, !cli.quiet);
    let (queues, _lock) = if cli.import {
        let stdin = std::io::stdin();
        let queues = Queue::read(&config.sites, BufReader::new(stdin.lock()))?;
        (queues, None)
    } else {
        // Listing runs are exclusive; imports are not.
        let lock = Lockfile::acquire()?;
        (queues_for(&config.sites, &client), Some(lock))
    };
    for queue in &queues {
        if let Err(err) = transfer(cli, queue, &client) {
            error!("transfer failed for {}: {:#}", queue.site.name, err);
        }
    }
    Ok(())
}

/// Build one queue per non-skipped site; a failed directory listing skips
/// that directory, never the whole run.
fn queues_for(sites: &[Site], client: &dyn Transport) -> Vec<Queue> {
    let now = Utc::now();
    let mut queues = Vec::with_capacity(sites.len());
    for site in sites {
        if site.skip {
            info!("skipping site {}", site.name);
            continue;
        }
        let mut entries: Vec<RemoteEntry> = Vec::new();
        for dir in &site.dirs {
            match client.list(&site.name, dir) {
                Ok(listed) => entries.extend(listed),
                Err(err) => error!("failed to list {} on {}: {}", dir, site.name, err),
            }
        }
        queues.push(Queue::build(site.clone(), &entries, &FsDirLister, now));
    }
    queues
}

fn transfer(cli: &Cli, queue: &Queue, client: &dyn Transport) -> Result<()> {
    if cli.dry_run {
        match cli.format {
            Format::Json => println!("{}", queue.to_json()?),
            Format::Text => print!("{}", queue.to_script()),
        }
        return Ok(());
    }
    if queue.transferable().is_empty() {
        info!("{} queue is empty", queue.site.name);
        return Ok(());
    }
    queue.dispatch(client)?;
    queue.post_process(!cli.quiet)
}

fn classify(config: &Config, name: &str) -> Result<()> {
    println!("{}", classify_path(config, name)?);
    Ok(())
}

/// Try each configured profile against a bare release name, most specific
/// parser first, and return the full destination path of the first one that
/// parses it (the release leaf included, as for a queued item).
fn classify_path(config: &Config, name: &str) -> Result<String> {
    let base = base_name(name);
    let mut profiles: Vec<&Profile> = config.profiles.values().map(|p| p.as_ref()).collect();
    profiles.sort_by_key(|p| match p.parser.kind() {
        ParserKind::Show => 0,
        ParserKind::Movie => 1,
        ParserKind::Default => 2,
    });
    for profile in profiles {
        let Ok(mut media) = profile.parser.parse(base) else {
            continue;
        };
        for rule in &profile.replacements {
            media.replace_name(&rule.pattern, &rule.replacement);
        }
        return Ok(profile.template.resolve(base, &media)?);
    }
    bail!("parsing failed: {base:?}")
}

fn expand_home(path: &str) -> Result<Utf8PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").context("HOME is not set")?;
        return Ok(Utf8Path::new(&home).join(rest));
    }
    Ok(Utf8PathBuf::from(path))
}
