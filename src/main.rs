//! CLI entry point for `mailsnap`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailsnap::archive::{ArchiveRequest, Archiver, DateWindow};
use mailsnap::config::{ArchiveConfig, Config};
use mailsnap::mailbox::{Mailbox, MboxMailbox};
use mailsnap::model::outcome::{ArtifactStatus, RunReport};
use mailsnap::pdf::{CommandPdfConverter, PdfConverter};
use mailsnap::store::{ContainerId, DirectoryStore, DocumentStore, MemoryStore};

#[derive(Parser)]
#[command(
    name = "mailsnap",
    version,
    about = "Archive a sender's email threads as source, HTML, and PDF snapshots"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive every message a sender wrote inside a date window
    Archive {
        /// MBOX file, .eml file, or directory of them
        #[arg(long, value_name = "PATH")]
        mailbox: PathBuf,
        /// Directory holding the destination containers
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
        #[command(flatten)]
        window: WindowArgs,
        /// Existing container to write into (default: "<sender> Email Archive")
        #[arg(long, value_name = "ID")]
        container: Option<String>,
        /// Do not produce PDF snapshots
        #[arg(long)]
        no_pdf: bool,
        /// Run the pipeline against an in-memory store; nothing is written
        #[arg(long)]
        dry_run: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a request and print the search it would run
    Plan {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Show the configuration, or write the defaults with --init
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Sender, date window, and subject filter shared by `archive` and `plan`.
#[derive(Args)]
#[command(group(ArgGroup::new("date_window").required(true).args(["start", "year"])))]
struct WindowArgs {
    /// Sender address to archive
    #[arg(long, value_name = "ADDR", env = "MAILSNAP_SENDER")]
    sender: Option<String>,
    /// First day included (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "end", conflicts_with = "year")]
    start: Option<String>,
    /// First day excluded (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "start")]
    end: Option<String>,
    /// Whole calendar year
    #[arg(long, value_name = "YEAR")]
    year: Option<i64>,
    /// Only messages whose subject contains this keyword
    #[arg(long, value_name = "KEYWORD")]
    subject: Option<String>,
}

impl WindowArgs {
    fn request(&self, container_id: Option<String>) -> ArchiveRequest {
        let window = match (self.year, &self.start, &self.end) {
            (Some(year), _, _) => DateWindow::Year(year),
            (None, start, end) => DateWindow::Range {
                start: start.clone().unwrap_or_default(),
                end: end.clone().unwrap_or_default(),
            },
        };
        ArchiveRequest {
            sender: self.sender.clone(),
            window,
            subject_keyword: self.subject.clone(),
            container_id,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = mailsnap::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Archive {
            mailbox,
            out,
            window,
            container,
            no_pdf,
            dry_run,
            json,
        } => {
            let request = window.request(container);
            let options = ArchiveOptions {
                no_pdf,
                dry_run,
                json,
            };
            cmd_archive(&config, &mailbox, &out, &request, options)
        }
        Commands::Plan { window } => cmd_plan(&config, &window.request(None)),
        Commands::Config { init } => cmd_config(&config, init),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailsnap::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailsnap.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

#[derive(Clone, Copy)]
struct ArchiveOptions {
    no_pdf: bool,
    dry_run: bool,
    json: bool,
}

/// Archive the selected messages into a container under `out`.
fn cmd_archive(
    config: &Config,
    mailbox_path: &Path,
    out: &Path,
    request: &ArchiveRequest,
    options: ArchiveOptions,
) -> anyhow::Result<()> {
    // Reject bad arguments before reading the mailbox
    let spec = request.plan()?;
    let offset = config.archive.offset();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Reading mailbox [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .expect("valid template")
            .progress_chars("#>-"),
    );
    let start = Instant::now();
    let mut mailbox = MboxMailbox::open_with_progress(
        mailbox_path,
        &config.mailbox,
        offset,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();

    let converter = if options.no_pdf || !config.pdf.enabled {
        None
    } else {
        Some(CommandPdfConverter::from_config(&config.pdf)?)
    };
    let converter = converter.as_ref().map(|c| c as &dyn PdfConverter);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Archiving [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    let progress = |done: usize, total: usize| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    };

    let (report, stored_bytes) = if options.dry_run {
        let mut store = MemoryStore::new();
        let report = run_archive(
            &mut mailbox,
            &mut store,
            converter,
            &config.archive,
            request,
            &progress,
        )?;
        let container = container_ref(&report);
        let bytes = store
            .files(&container)
            .iter()
            .map(|f| f.data.len() as u64)
            .sum();
        (report, bytes)
    } else {
        let mut store = DirectoryStore::open(out)?;
        let report = run_archive(
            &mut mailbox,
            &mut store,
            converter,
            &config.archive,
            request,
            &progress,
        )?;
        let bytes = dir_size(&store.container_dir(&container_ref(&report)));
        (report, bytes)
    };
    pb.finish_and_clear();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(
            &report,
            &spec.container_name(&config.archive.container_suffix),
            stored_bytes,
            start.elapsed(),
            options.dry_run,
        );
    }

    let incomplete = report.incomplete();
    if incomplete > 0 {
        anyhow::bail!("{incomplete} message(s) were archived incompletely");
    }
    Ok(())
}

fn run_archive(
    mailbox: &mut dyn Mailbox,
    store: &mut dyn DocumentStore,
    converter: Option<&dyn PdfConverter>,
    config: &ArchiveConfig,
    request: &ArchiveRequest,
    progress: &dyn Fn(usize, usize),
) -> anyhow::Result<RunReport> {
    let mut archiver = Archiver::new(mailbox, store, config).with_progress(progress);
    if let Some(converter) = converter {
        archiver = archiver.with_pdf(converter);
    }
    Ok(archiver.run(request)?)
}

/// Validate a request and print the search it resolves to.
fn cmd_plan(config: &Config, request: &ArchiveRequest) -> anyhow::Result<()> {
    let spec = request.plan()?;
    println!();
    println!("  {:<12} {}", "Query", spec.expression());
    println!(
        "  {:<12} {} ..< {}",
        "Window",
        spec.start.format("%Y-%m-%d"),
        spec.end.format("%Y-%m-%d")
    );
    println!(
        "  {:<12} {}",
        "Container",
        spec.container_name(&config.archive.container_suffix)
    );
    println!("  {:<12} {}", "Max threads", config.archive.max_threads);
    println!();
    Ok(())
}

/// Print the active configuration, optionally writing the defaults first.
fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    let path = mailsnap::config::config_file_path();
    if init {
        match &path {
            Some(p) if p.exists() => {
                println!("  Config already exists at {}", p.display());
            }
            _ => {
                mailsnap::config::save_config(&Config::default())?;
                if let Some(p) = &path {
                    println!("  Wrote default config to {}", p.display());
                }
            }
        }
        return Ok(());
    }

    if let Some(p) = &path {
        println!("# {}", p.display());
    }
    println!("# log: {}", mailsnap::config::log_file_path(config).display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailsnap", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Container handle for looking up files after a run.
fn container_ref(report: &RunReport) -> ContainerId {
    ContainerId {
        id: report.container.clone(),
        name: report.container.clone(),
    }
}

/// Total size of the regular files directly inside `dir`.
fn dir_size(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}

fn status_label(status: &ArtifactStatus) -> &'static str {
    match status {
        ArtifactStatus::Stored { .. } => "stored",
        ArtifactStatus::AlreadyPresent { .. } => "present",
        ArtifactStatus::Failed { .. } => "FAILED",
        ArtifactStatus::Disabled => "-",
    }
}

/// Print a human-readable summary of a run.
fn print_report(
    report: &RunReport,
    container_name: &str,
    stored_bytes: u64,
    elapsed: std::time::Duration,
    dry_run: bool,
) {
    use humansize::{format_size, BINARY};

    println!();
    if !report.outcomes.is_empty() {
        println!(
            "  {:<60} {:<8} {:<8} {:<8} {:>5}",
            "Message", "Source", "HTML", "PDF", "Files"
        );
        println!("  {}", "-".repeat(93));
        for outcome in &report.outcomes {
            let stem: String = outcome.stem.chars().take(59).collect();
            println!(
                "  {:<60} {:<8} {:<8} {:<8} {:>5}",
                stem,
                status_label(&outcome.source),
                status_label(&outcome.html),
                status_label(&outcome.pdf),
                outcome.attachments.len()
            );
            if let Some(error) = &outcome.last_error {
                println!("      {error}");
            }
        }
        println!();
    }

    println!("  {:<20} {}", "Query", report.query);
    println!("  {:<20} {}", "Container", container_name);
    println!(
        "  {:<20} {}{}",
        "Threads",
        report.threads,
        if report.truncated { " (limit reached)" } else { "" }
    );
    println!("  {:<20} {}", "Archived", report.outcomes.len());
    println!("  {:<20} {}", "Skipped", report.skipped.len());
    println!("  {:<20} {}", "Incomplete", report.incomplete());
    println!(
        "  {:<20} {}{}",
        "Container size",
        format_size(stored_bytes, BINARY),
        if dry_run { " (dry run)" } else { "" }
    );
    println!("  {:<20} {:.2?}", "Elapsed", elapsed);
    println!();
}
