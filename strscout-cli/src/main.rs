mod render;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use strscout::config::{split_extensions, EncodingMode};
use strscout::{
    search_with_progress, CancellationToken, MatchMode, ProgressSink, SearchOptions,
    SearchStatus,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Search a directory tree for a string or pattern", long_about = None)]
struct Cli {
    /// Directory to search
    directory: PathBuf,

    /// Term to search for; quote it if it contains shell characters such as '$'
    term: String,

    /// Maximum directory depth to descend into (-1 for unlimited)
    #[arg(long = "maxdepth", default_value_t = 1, allow_negative_numbers = true)]
    max_depth: i64,

    /// File extensions to search (e.g. txt,md,py)
    #[arg(short = 'e', long)]
    extensions: Option<String>,

    /// Truncate matching lines longer than this many characters
    #[arg(short = 'm', long = "maxline", default_value_t = 1000)]
    max_line: usize,

    /// Perform a case-sensitive search
    #[arg(short = 'c', long)]
    case_sensitive: bool,

    /// Treat the term as a regular expression
    #[arg(short = 'r', long, conflicts_with = "literal")]
    regex: bool,

    /// Treat the term as plain text even if it contains regex characters
    #[arg(short = 'l', long)]
    literal: bool,

    /// Match whole words only
    #[arg(short = 'w', long)]
    whole_word: bool,

    /// Only search files modified on or after this date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,

    /// Only search files modified on or before this date (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<String>,

    /// Maximum file size to consider, in kilobytes
    #[arg(long)]
    size_limit: Option<f64>,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Configuration file (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the results as JSON
    #[arg(long)]
    json: bool,

    /// Show only statistics, not matches
    #[arg(short, long)]
    stats: bool,

    /// Treat files with invalid UTF-8 as binary instead of replacing bad bytes
    #[arg(long, conflicts_with = "lossy")]
    strict: bool,

    /// Replace invalid UTF-8 with U+FFFD (default)
    #[arg(long)]
    lossy: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn to_options(&self) -> SearchOptions {
        let defaults = SearchOptions::default();

        let mode = if self.regex {
            MatchMode::Regex
        } else if self.literal {
            MatchMode::Literal
        } else {
            MatchMode::Auto
        };

        let encoding_mode = match (self.strict, self.lossy) {
            (true, false) => EncodingMode::FailFast,
            _ => EncodingMode::Lossy,
        };

        SearchOptions {
            root_path: self.directory.clone(),
            term: self.term.clone(),
            mode,
            case_sensitive: self.case_sensitive,
            whole_word: self.whole_word,
            max_depth: self.max_depth,
            extensions: self
                .extensions
                .as_deref()
                .map(split_extensions)
                .unwrap_or_default(),
            max_line_length: self.max_line,
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            size_limit_kb: self.size_limit,
            thread_count: self.threads.unwrap_or(defaults.thread_count),
            encoding_mode,
            log_level: self
                .log_level
                .clone()
                .unwrap_or_else(|| defaults.log_level.clone()),
            ..defaults
        }
    }
}

/// Spinner on stderr that counts finished files
struct Spinner {
    bar: ProgressBar,
    finished: AtomicUsize,
}

impl Spinner {
    fn new(enabled: bool) -> Self {
        let bar = if enabled {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("Searching...");
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            finished: AtomicUsize::new(0),
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for Spinner {
    fn file_finished(&self, _path: &Path) {
        let done = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        if done % 64 == 0 {
            self.bar.set_message(format!("Searching... {} files checked", done));
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn install_interrupt_handler(cancel: &CancellationToken) {
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag()) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }
}

fn run(cli: Cli) -> Result<SearchStatus> {
    let started = Instant::now();

    let options = SearchOptions::load_from(cli.config.as_deref())?
        .merge_with_cli(cli.to_options());
    init_logging(&options.log_level);

    let config = options.validate()?;

    let cancel = CancellationToken::new();
    install_interrupt_handler(&cancel);

    let spinner = Spinner::new(!cli.json);
    let outcome = search_with_progress(&config, &cancel, &spinner);
    spinner.finish();
    let outcome = outcome?;

    if cli.json {
        println!("{}", outcome.to_json()?);
    } else {
        if !cli.stats {
            render::print_matches(&outcome.report);
        }
        render::print_summary(&config, &outcome, started.elapsed());
    }

    Ok(outcome.status())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(SearchStatus::Matched) => ExitCode::SUCCESS,
        Ok(SearchStatus::NoMatches) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {:#}", "[ERROR]".red().bold(), e);
            ExitCode::from(2)
        }
    }
}
