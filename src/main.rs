//! unpackd - resumable batch archive extraction

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use unpackd::archive::{Archiver, SevenZip};
use unpackd::batch::{self, BatchRunner};
use unpackd::disk::{bytes_to_gb, StatvfsProbe};
use unpackd::settings::Settings;

#[derive(Parser)]
#[command(name = "unpackd")]
#[command(version)]
#[command(about = "Extract a list of archives one by one, deleting each source once done")]
#[command(
    long_about = "Extract a list of archives one by one, deleting each source once done.\n\n\
    Progress is recorded in a completion ledger so an interrupted run resumes where it \
    stopped. Never run two instances against the same ledger or work list."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct Options {
    /// Settings file (default: ~/.config/unpackd/settings.json)
    #[arg(long, env = "UNPACKD_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    /// Work list: one archive path per line
    #[arg(long, env = "UNPACKD_WORK_LIST", global = true)]
    work_list: Option<PathBuf>,

    /// Directory archives are extracted into
    #[arg(long, env = "UNPACKD_DEST", global = true)]
    dest: Option<PathBuf>,

    /// Directory for the progress log and ledger (default: ~/.local/share/unpackd)
    #[arg(long, env = "UNPACKD_STATE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    /// Progress log file
    #[arg(long, env = "UNPACKD_LOG", global = true)]
    log: Option<PathBuf>,

    /// Completion ledger file
    #[arg(long, env = "UNPACKD_LEDGER", global = true)]
    ledger: Option<PathBuf>,

    /// Archiver binary (default: 7zz/7z/7za from bin/ or PATH)
    #[arg(long, env = "UNPACKD_ARCHIVER", global = true)]
    archiver: Option<PathBuf>,

    /// Abort when free space drops below this many GB (default: 50)
    #[arg(long, global = true)]
    min_free_gb: Option<f64>,

    /// GB that must stay free after an archive's predicted size (default: 20)
    #[arg(long, global = true)]
    reserve_gb: Option<f64>,

    /// Listing timeout in seconds (default: 120)
    #[arg(long, global = true)]
    list_timeout: Option<u64>,

    /// Per-archive extraction timeout in seconds (default: 7200)
    #[arg(long, global = true)]
    extract_timeout: Option<u64>,
}

impl Options {
    fn to_settings(&self) -> Settings {
        Settings {
            work_list: self.work_list.clone(),
            destination: self.dest.clone(),
            state_dir: self.state_dir.clone(),
            progress_log: self.log.clone(),
            ledger: self.ledger.clone(),
            archiver: self.archiver.clone(),
            min_free_gb: self.min_free_gb,
            reserve_gb: self.reserve_gb,
            list_timeout_secs: self.list_timeout,
            extract_timeout_secs: self.extract_timeout,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every remaining archive in the work list
    Run,

    /// Show how much of the work list is done
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show an archive's summary (file count, sizes, ratio)
    Inspect {
        /// Path to the archive
        archive: PathBuf,
    },

    /// Show the effective settings
    Settings {
        /// Write the effective settings to the settings file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(if cli.verbose { "unpackd=debug".parse()? } else { "unpackd=warn".parse()? }),
            )
            .init();
    }

    let settings_path = match &cli.options.settings {
        Some(path) => path.clone(),
        None => Settings::default_path()?,
    };
    let settings = Settings::load(&settings_path)?.merged(cli.options.to_settings());

    match cli.command {
        Commands::Run => {
            let config = settings.to_batch_config()?;
            config.validate()?;

            for file in [&config.progress_log, &config.ledger] {
                if let Some(parent) = file.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create state directory: {}", parent.display())
                    })?;
                }
            }

            let archiver = SevenZip::locate(settings.archiver.as_deref())?
                .with_timeouts(config.list_timeout, config.extract_timeout);

            println!("unpackd - batch archive extraction");
            println!("Archiver:    {}", archiver.binary().display());
            println!("Destination: {}", config.destination.display());
            println!("Ledger:      {}", config.ledger.display());
            println!();

            let runner = BatchRunner::new(config, archiver, StatvfsProbe);
            let stats = runner.run().await?;

            println!("\n=== Run Summary ===");
            println!(
                "Archives: {} extracted, {} skipped (missing), {} already done",
                stats.extracted, stats.skipped_missing, stats.already_done
            );
            println!("Processed: {:.2} GB", bytes_to_gb(stats.bytes_extracted));
        }

        Commands::Status { json } => {
            let config = settings.to_batch_config()?;
            let report = batch::status(&config, &StatvfsProbe)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("=== Batch Status ===");
                println!("In list:    {}", report.total);
                println!("Completed:  {}", report.completed);
                println!("Remaining:  {}", report.remaining);
                if report.missing > 0 {
                    println!("  missing on disk: {}", report.missing);
                }
                match report.free_gb {
                    Some(gb) => println!("Free space: {:.1} GB", gb),
                    None => println!("Free space: unknown"),
                }
            }
        }

        Commands::Inspect { archive } => {
            let (list_timeout, extract_timeout) = settings.timeouts();
            let archiver = SevenZip::locate(settings.archiver.as_deref())?
                .with_timeouts(list_timeout, extract_timeout);

            match archiver.inspect(&archive).await? {
                Some(summary) => {
                    println!("Archive:      {}", archive.display());
                    println!("Files:        {}", summary.file_count);
                    println!("Uncompressed: {:.2} GB", bytes_to_gb(summary.uncompressed_bytes));
                    println!("Compressed:   {:.2} GB", bytes_to_gb(summary.compressed_bytes));
                    println!("Ratio:        {:.1}x", summary.ratio());
                }
                None => println!("{}: metadata unavailable", archive.display()),
            }
        }

        Commands::Settings { save } => {
            println!("Settings file: {}", settings_path.display());
            println!("{}", serde_json::to_string_pretty(&settings)?);

            if save {
                settings.save(&settings_path)?;
                println!("Saved.");
            }
        }
    }

    Ok(())
}
