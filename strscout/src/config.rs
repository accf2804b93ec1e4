use chrono::NaiveDate;
use ::config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{SearchError, SearchResult};
use crate::filters::{default_extensions, is_known_text_extension, suggest_extensions};
use crate::search::matcher::Matcher;

/// Characters that make `MatchMode::Auto` treat the term as a regular expression
const REGEX_METACHARACTERS: &[char] = &[
    '.', '*', '+', '?', '^', '$', '%', '{', '}', '(', ')', '|', '[', ']', '\\',
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// How the search term is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Plain substring, no special characters
    Literal,
    /// Regular expression, compiled once
    Regex,
    /// Regex if the term contains regex metacharacters, literal otherwise
    #[default]
    Auto,
}

impl MatchMode {
    /// Resolves `Auto` against the given term. `Literal` and `Regex` are returned unchanged.
    pub fn resolve(self, term: &str) -> MatchMode {
        match self {
            MatchMode::Auto if term.contains(REGEX_METACHARACTERS) => MatchMode::Regex,
            MatchMode::Auto => MatchMode::Literal,
            explicit => explicit,
        }
    }
}

/// How far below the root directory the walker descends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxDepth {
    /// Files at most this many directory levels below the root
    Limited(usize),
    Unbounded,
}

impl MaxDepth {
    /// Converts the command-line convention (`-1` = unbounded) into a `MaxDepth`.
    pub fn from_signed(depth: i64) -> SearchResult<Self> {
        match depth {
            -1 => Ok(MaxDepth::Unbounded),
            d if d >= 0 => Ok(MaxDepth::Limited(d as usize)),
            d => Err(SearchError::config_error(
                "max depth",
                format!("{d} is not allowed, use -1 for unlimited depth"),
            )),
        }
    }

    /// Whether a file `depth` directory levels below the root may be produced
    pub fn allows(self, depth: usize) -> bool {
        match self {
            MaxDepth::Limited(max) => depth <= max,
            MaxDepth::Unbounded => true,
        }
    }

    /// The limit, if any
    pub fn limit(self) -> Option<usize> {
        match self {
            MaxDepth::Limited(max) => Some(max),
            MaxDepth::Unbounded => None,
        }
    }
}

impl Default for MaxDepth {
    fn default() -> Self {
        MaxDepth::Limited(1)
    }
}

impl std::fmt::Display for MaxDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaxDepth::Limited(max) => write!(f, "{max}"),
            MaxDepth::Unbounded => write!(f, "all"),
        }
    }
}

/// How invalid UTF-8 inside a text file is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Treat the file as binary and skip it
    FailFast,
    /// Replace invalid sequences and keep scanning
    #[default]
    Lossy,
}

/// Inclusive range of calendar days a file's modification date must fall into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> SearchResult<Self> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(SearchError::config_error(
                    "date range",
                    format!("start date {start} is after end date {end}"),
                ));
            }
        }
        Ok(Self { start, end })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start.map_or(true, |start| start <= day) && self.end.map_or(true, |end| day <= end)
    }
}

/// Parses a `YYYY-MM-DD` date, rejecting anything that does not round-trip
/// through the same format (e.g. `2024-1-5`).
pub fn parse_date(field: &'static str, value: &str) -> SearchResult<NaiveDate> {
    let date = NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        SearchError::config_error(field, format!("'{value}' is not a YYYY-MM-DD date ({e})"))
    })?;
    if date.format(DATE_FORMAT).to_string() != value.trim() {
        return Err(SearchError::config_error(
            field,
            format!("date must be in YYYY-MM-DD format, but got '{value}'"),
        ));
    }
    Ok(date)
}

/// Normalizes one extension to lowercase with a leading dot. Returns `None` for blanks.
pub fn normalize_extension(ext: &str) -> Option<String> {
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        None
    } else {
        Some(format!(".{ext}"))
    }
}

/// Splits a comma-separated extension list such as `txt,.MD, py`.
pub fn split_extensions(list: &str) -> Vec<String> {
    list.split(',').filter_map(normalize_extension).collect()
}

/// Rejects an extension list that names no known text format, suggesting close
/// matches when there are any.
fn check_known_extensions(extensions: &BTreeSet<String>) -> SearchResult<()> {
    if extensions.iter().any(|e| is_known_text_extension(e)) {
        return Ok(());
    }
    let given = extensions.iter().cloned().collect::<Vec<_>>().join(", ");
    let suggestions = suggest_extensions(extensions.iter().map(String::as_str));
    let reason = if suggestions.is_empty() {
        format!("no known text file extension in {given}")
    } else {
        format!(
            "no known text file extension in {given}, did you mean one of {}?",
            suggestions.join(", ")
        )
    };
    Err(SearchError::config_error("extensions", reason))
}

/// Raw search options as they come from a configuration file or the command line.
///
/// The options are validated into an immutable [`SearchConfig`] by
/// [`SearchOptions::validate`]; nothing touches the filesystem before that succeeds.
///
/// # Configuration Locations
///
/// Options can be loaded from, in increasing order of precedence:
/// 1. Global `$CONFIG_DIR/strscout/config.yaml`
/// 2. Local `.strscout.yaml` in the current directory
/// 3. A file given explicitly (`--config`)
///
/// Command-line values are applied last with [`SearchOptions::merge_with_cli`].
///
/// ```yaml
/// root_path: "."
/// term: "TODO"
/// mode: literal
/// max_depth: -1
/// extensions: [".rs", ".md"]
/// max_line_length: 200
/// start_date: "2024-01-01"
/// size_limit_kb: 512
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Directory to search
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Term to search for
    #[serde(default)]
    pub term: String,

    #[serde(default)]
    pub mode: MatchMode,

    #[serde(default)]
    pub case_sensitive: bool,

    /// Only count hits that are not part of a larger word
    #[serde(default)]
    pub whole_word: bool,

    /// Maximum depth, `-1` for unlimited
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,

    /// Extensions to search; empty means the built-in text extensions
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Matching lines longer than this many characters are truncated
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Earliest modification date, `YYYY-MM-DD`
    #[serde(default)]
    pub start_date: Option<String>,

    /// Latest modification date, `YYYY-MM-DD`
    #[serde(default)]
    pub end_date: Option<String>,

    /// Largest file to scan, in kilobytes
    #[serde(default)]
    pub size_limit_kb: Option<f64>,

    /// Number of worker threads
    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Capacity of the queue between the walker and the workers
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: NonZeroUsize,

    #[serde(default)]
    pub encoding_mode: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_depth() -> i64 {
    1
}

fn default_max_line_length() -> usize {
    1000
}

pub fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_queue_capacity() -> NonZeroUsize {
    NonZeroUsize::new(256).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            term: String::new(),
            mode: MatchMode::default(),
            case_sensitive: false,
            whole_word: false,
            max_depth: default_max_depth(),
            extensions: Vec::new(),
            max_line_length: default_max_line_length(),
            start_date: None,
            end_date: None,
            size_limit_kb: None,
            thread_count: default_thread_count(),
            queue_capacity: default_queue_capacity(),
            encoding_mode: EncodingMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl SearchOptions {
    /// Creates options for `term` under `root_path` with every other field defaulted
    pub fn new(root_path: impl Into<PathBuf>, term: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            term: term.into(),
            ..Self::default()
        }
    }

    /// Loads options from the default locations plus an optional explicit file
    pub fn load_from(config_path: Option<&Path>) -> SearchResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("strscout/config.yaml")),
            Some(PathBuf::from(".strscout.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                debug!("Loading configuration from {}", path.display());
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicit file must exist
        if let Some(path) = config_path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Applies command-line values on top of file values.
    ///
    /// Root and term always come from the command line. Other CLI values win when
    /// they differ from the built-in default.
    pub fn merge_with_cli(mut self, cli: SearchOptions) -> Self {
        let defaults = SearchOptions::default();

        self.root_path = cli.root_path;
        self.term = cli.term;
        if cli.mode != defaults.mode {
            self.mode = cli.mode;
        }
        if cli.case_sensitive {
            self.case_sensitive = true;
        }
        if cli.whole_word {
            self.whole_word = true;
        }
        if cli.max_depth != defaults.max_depth {
            self.max_depth = cli.max_depth;
        }
        if !cli.extensions.is_empty() {
            self.extensions = cli.extensions;
        }
        if cli.max_line_length != defaults.max_line_length {
            self.max_line_length = cli.max_line_length;
        }
        if cli.start_date.is_some() {
            self.start_date = cli.start_date;
        }
        if cli.end_date.is_some() {
            self.end_date = cli.end_date;
        }
        if cli.size_limit_kb.is_some() {
            self.size_limit_kb = cli.size_limit_kb;
        }
        if cli.thread_count != defaults.thread_count {
            self.thread_count = cli.thread_count;
        }
        if cli.queue_capacity != defaults.queue_capacity {
            self.queue_capacity = cli.queue_capacity;
        }
        if cli.encoding_mode != defaults.encoding_mode {
            self.encoding_mode = cli.encoding_mode;
        }
        if cli.log_level != defaults.log_level {
            self.log_level = cli.log_level;
        }
        self
    }

    /// Validates the options and compiles the matcher.
    ///
    /// Fails with [`SearchError::ConfigError`] naming the offending field, or with
    /// [`SearchError::InvalidPattern`] for a malformed regular expression.
    pub fn validate(self) -> SearchResult<SearchConfig> {
        SearchConfig::from_options(self)
    }
}

/// Validated, immutable search configuration shared read-only by every worker
#[derive(Debug, Clone)]
pub struct SearchConfig {
    root_path: PathBuf,
    term: String,
    mode: MatchMode,
    case_sensitive: bool,
    whole_word: bool,
    max_depth: MaxDepth,
    extensions: BTreeSet<String>,
    max_line_length: NonZeroUsize,
    date_range: DateRange,
    size_limit: Option<u64>,
    thread_count: NonZeroUsize,
    queue_capacity: NonZeroUsize,
    encoding_mode: EncodingMode,
    matcher: Matcher,
}

impl SearchConfig {
    pub fn from_options(options: SearchOptions) -> SearchResult<Self> {
        if !options.root_path.exists() {
            return Err(SearchError::config_error(
                "root directory",
                format!("{} does not exist", options.root_path.display()),
            ));
        }
        if !options.root_path.is_dir() {
            return Err(SearchError::config_error(
                "root directory",
                format!("{} is not a directory", options.root_path.display()),
            ));
        }

        if options.term.is_empty() {
            return Err(SearchError::config_error(
                "search term",
                "must not be empty; quote terms that contain shell characters such as '$'",
            ));
        }

        let mode = options.mode.resolve(&options.term);
        let matcher = Matcher::new(
            &options.term,
            mode,
            options.case_sensitive,
            options.whole_word,
        )?;

        let max_depth = MaxDepth::from_signed(options.max_depth)?;

        let extensions: BTreeSet<String> = options
            .extensions
            .iter()
            .filter_map(|e| normalize_extension(e))
            .collect();
        let extensions = if extensions.is_empty() {
            default_extensions().clone()
        } else {
            check_known_extensions(&extensions)?;
            extensions
        };

        let max_line_length = NonZeroUsize::new(options.max_line_length).ok_or_else(|| {
            SearchError::config_error("max line length", "must be a positive integer")
        })?;

        let start = options
            .start_date
            .as_deref()
            .map(|d| parse_date("start date", d))
            .transpose()?;
        let end = options
            .end_date
            .as_deref()
            .map(|d| parse_date("end date", d))
            .transpose()?;
        let date_range = DateRange::new(start, end)?;

        let size_limit = match options.size_limit_kb {
            Some(kb) if !kb.is_finite() || kb <= 0.0 => {
                return Err(SearchError::config_error(
                    "size limit",
                    format!("{kb} is not a positive number of kilobytes"),
                ))
            }
            Some(kb) => Some((kb * 1024.0) as u64),
            None => None,
        };

        debug!(
            "Validated configuration: mode={:?}, depth={}, {} extensions",
            mode,
            max_depth,
            extensions.len()
        );

        Ok(Self {
            root_path: options.root_path,
            term: options.term,
            mode,
            case_sensitive: options.case_sensitive,
            whole_word: options.whole_word,
            max_depth,
            extensions,
            max_line_length,
            date_range,
            size_limit,
            thread_count: options.thread_count,
            queue_capacity: options.queue_capacity,
            encoding_mode: options.encoding_mode,
            matcher,
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// The resolved mode, never `Auto`
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn whole_word(&self) -> bool {
        self.whole_word
    }

    pub fn max_depth(&self) -> MaxDepth {
        self.max_depth
    }

    /// Normalized (`.ext`, lowercase) extensions that are searched
    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length.get()
    }

    pub fn date_range(&self) -> &DateRange {
        &self.date_range
    }

    /// Size ceiling in bytes
    pub fn size_limit(&self) -> Option<u64> {
        self.size_limit
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count.get()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.get()
    }

    pub fn encoding_mode(&self) -> EncodingMode {
        self.encoding_mode
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }
}
