use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use console::{style, Term};

use douyin_sync::config::{self, ConfigError};
use douyin_sync::{logging, RecordStatus, SyncError, SyncRequest, SyncResult, SyncService};

const DEFAULT_MAX_VIDEOS: usize = 1000;
const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Parser)]
#[command(
    name = "douyin-sync",
    version,
    about = "Sync a Douyin profile's videos into a Feishu/Lark Bitable table"
)]
struct Cli {
    /// Douyin profile URL (long-form, /user/ path or v.douyin.com short link)
    #[arg(long)]
    url: String,

    /// Maximum number of videos to fetch
    #[arg(long, default_value_t = DEFAULT_MAX_VIDEOS)]
    max_videos: usize,

    /// Records written between longer pauses
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Bitable table to adopt or create
    #[arg(long)]
    table_name: Option<String>,

    /// Update records that already exist instead of skipping them
    #[arg(long)]
    update_existing: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Diagnostic log file
    #[arg(long, env = "DOUYIN_SYNC_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Do not write the diagnostic log file
    #[arg(long)]
    no_log_file: bool,
}

impl Cli {
    /// Defaults used by the interactive prompt.
    fn interactive(url: String, max_videos: usize) -> Self {
        Self {
            url,
            max_videos,
            batch_size: DEFAULT_BATCH_SIZE,
            table_name: None,
            update_existing: false,
            log_level: "info".to_string(),
            log_file: None,
            no_log_file: false,
        }
    }
}

/// Parse the max-videos answer; blank or invalid input means the default.
fn parse_max_videos(input: &str) -> Option<usize> {
    let input = input.trim();
    if input.is_empty() {
        return Some(DEFAULT_MAX_VIDEOS);
    }
    input.parse().ok()
}

/// Prompt for the profile URL and max videos.
fn prompt(term: &Term) -> std::io::Result<Option<Cli>> {
    term.write_line(&style("=== Douyin → Bitable sync ===").bold().to_string())?;
    term.write_str("Douyin profile URL: ")?;
    let url = term.read_line()?.trim().to_string();
    if url.is_empty() {
        term.write_line(&format!("{} profile URL cannot be empty", style("error:").red()))?;
        return Ok(None);
    }

    term.write_str(&format!("Maximum videos to fetch (default {}): ", DEFAULT_MAX_VIDEOS))?;
    let answer = term.read_line()?;
    let max_videos = parse_max_videos(&answer).unwrap_or_else(|| {
        let _ = term.write_line(&format!(
            "{} not a number, using {}",
            style("note:").yellow(),
            DEFAULT_MAX_VIDEOS
        ));
        DEFAULT_MAX_VIDEOS
    });

    Ok(Some(Cli::interactive(url, max_videos)))
}

fn print_summary(result: &SyncResult) {
    println!();
    println!("{}", style("Sync summary").bold());
    println!("  total:   {}", result.total);
    println!("  success: {}", style(result.success_count).green());
    if result.updated_count > 0 {
        println!("  updated: {}", style(result.updated_count).cyan());
    }
    println!("  skipped: {}", style(result.skipped_count).yellow());
    println!("  failed:  {}", style(result.failed_count).red());

    for detail in result
        .details
        .iter()
        .filter(|d| d.status == RecordStatus::Failed)
    {
        println!(
            "  {} {}: {}",
            style("✗").red(),
            detail.aweme_id,
            detail.reason.as_deref().unwrap_or("unknown error")
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Real environment variables win over .env entries.
    let _ = dotenvy::dotenv();

    let cli = if std::env::args_os().len() > 1 {
        Cli::parse()
    } else {
        match prompt(&Term::stdout()) {
            Ok(Some(cli)) => cli,
            Ok(None) => return ExitCode::FAILURE,
            Err(e) => {
                eprintln!("{} failed to read input: {}", style("error:").red(), e);
                return ExitCode::FAILURE;
            }
        }
    };

    let mut settings = match config::load_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", style("error:").red(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(table_name) = cli.table_name {
        settings.table_name = table_name;
    }
    if let Some(log_file) = cli.log_file {
        settings.log_file = Some(log_file);
    }
    if cli.no_log_file {
        settings.log_file = None;
    }

    if let Err(e) = logging::init(&cli.log_level, settings.log_file.as_deref()) {
        eprintln!("{} {:#}", style("warning:").yellow(), e);
    }

    let request = SyncRequest {
        url: cli.url,
        max_videos: cli.max_videos,
        batch_size: cli.batch_size,
        update_existing: cli.update_existing,
    };

    let service = SyncService::new(settings);
    match service.run(&request).await {
        Ok(result) => {
            print_summary(&result);
            if result.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("{} {}", style("error:").red(), e);
            if matches!(e, SyncError::Config(ConfigError::Missing(_))) {
                eprintln!("Set them in the environment or in a .env file.");
            }
            ExitCode::FAILURE
        }
    }
}
