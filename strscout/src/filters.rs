/// File eligibility rules.
///
/// Like the rest of the search pipeline these are plain functions of the
/// [`SearchConfig`] and a [`CandidateFile`]; they never touch the filesystem.
/// A candidate is checked against the extension set first, then the size ceiling,
/// then the modification-date range, and the first rule that rejects it decides
/// the [`SkipReason`] recorded in the run summary.
use chrono::{DateTime, Local, NaiveDate};
use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use std::time::SystemTime;
use tracing::warn;

use crate::config::{DateRange, SearchConfig};
use crate::results::SkipReason;
use crate::search::walker::CandidateFile;

/// Extensions searched when none are configured
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".bat", ".cfg", ".conf", ".csv", ".css", ".html", ".ini", ".js", ".json", ".log", ".md",
    ".ps1", ".py", ".rst", ".sh", ".toml", ".txt", ".xml", ".yaml", ".yml",
];

/// Text file extensions a user-supplied extension list is checked against.
/// A superset of [`DEFAULT_EXTENSIONS`].
pub const KNOWN_TEXT_EXTENSIONS: &[&str] = &[
    ".adoc", ".bat", ".c", ".cc", ".cfg", ".conf", ".cpp", ".cs", ".css", ".csv", ".env",
    ".go", ".gradle", ".graphql", ".h", ".hpp", ".htm", ".html", ".ini", ".java", ".js",
    ".json", ".jsx", ".kt", ".less", ".log", ".lua", ".md", ".org", ".php", ".pl", ".properties",
    ".proto", ".ps1", ".py", ".r", ".rb", ".rs", ".rst", ".sass", ".scala", ".scss", ".sh",
    ".sql", ".svelte", ".swift", ".tex", ".toml", ".ts", ".tsv", ".tsx", ".txt", ".vue", ".xml",
    ".yaml", ".yml", ".zsh",
];

/// Number of leading bytes inspected for a NUL byte
pub const BINARY_SNIFF_LEN: usize = 8192;

static DEFAULT_EXTENSION_SET: Lazy<BTreeSet<String>> =
    Lazy::new(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect());

/// The built-in extension set
pub fn default_extensions() -> &'static BTreeSet<String> {
    &DEFAULT_EXTENSION_SET
}

/// Whether a normalized extension names a known text format
pub fn is_known_text_extension(ext: &str) -> bool {
    KNOWN_TEXT_EXTENSIONS.contains(&ext)
}

/// Up to three known text extensions resembling any of `unknown`, closest first
pub fn suggest_extensions<'a>(unknown: impl IntoIterator<Item = &'a str>) -> Vec<&'static str> {
    let mut suggestions: Vec<&'static str> = Vec::new();
    for ext in unknown {
        for candidate in similar::get_close_matches(ext, KNOWN_TEXT_EXTENSIONS, 3, 0.6) {
            if !suggestions.contains(&candidate) {
                suggestions.push(candidate);
            }
        }
    }
    suggestions.truncate(3);
    suggestions
}

/// Checks the candidate's extension against the configured set
pub fn has_valid_extension(candidate: &CandidateFile, extensions: &BTreeSet<String>) -> bool {
    candidate
        .extension
        .as_ref()
        .is_some_and(|ext| extensions.contains(ext))
}

/// Checks the candidate's size against an optional ceiling in bytes.
///
/// Returns `None` when a limit is set but the size is unknown.
pub fn within_size_limit(candidate: &CandidateFile, limit: Option<u64>) -> Option<bool> {
    match limit {
        None => Some(true),
        Some(limit) => candidate.size.map(|size| size <= limit),
    }
}

/// The local calendar day of a timestamp
pub fn local_day(time: SystemTime) -> NaiveDate {
    DateTime::<Local>::from(time).date_naive()
}

/// Checks the candidate's modification day against the configured range.
///
/// Returns `None` when a range is set but the modification time is unknown.
pub fn within_date_range(candidate: &CandidateFile, range: &DateRange) -> Option<bool> {
    if range.is_unbounded() {
        return Some(true);
    }
    candidate
        .modified
        .map(|modified| range.contains(local_day(modified)))
}

/// Decides whether a candidate may be scanned
pub fn check_eligibility(
    candidate: &CandidateFile,
    config: &SearchConfig,
) -> Result<(), SkipReason> {
    if !has_valid_extension(candidate, config.extensions()) {
        return Err(SkipReason::WrongExtension);
    }

    match within_size_limit(candidate, config.size_limit()) {
        Some(true) => {}
        Some(false) => return Err(SkipReason::TooLarge),
        None => {
            warn!(
                "Skipping {}: size could not be read",
                candidate.path.display()
            );
            return Err(SkipReason::Unreadable);
        }
    }

    match within_date_range(candidate, config.date_range()) {
        Some(true) => Ok(()),
        Some(false) => Err(SkipReason::OutOfDateRange),
        None => {
            warn!(
                "Skipping {}: modification time could not be read",
                candidate.path.display()
            );
            Err(SkipReason::Unreadable)
        }
    }
}

/// Whether the leading bytes of a file look binary (contain a NUL byte)
pub fn is_binary_prefix(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchOptions;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::tempdir;

    fn candidate(name: &str, size: Option<u64>, modified: Option<SystemTime>) -> CandidateFile {
        let path = PathBuf::from(name);
        CandidateFile {
            extension: CandidateFile::extension_of(&path),
            path,
            depth: 0,
            size,
            modified,
        }
    }

    fn config_with(dir: &Path, edit: impl FnOnce(&mut SearchOptions)) -> SearchConfig {
        let mut options = SearchOptions::new(dir, "needle");
        edit(&mut options);
        options.validate().unwrap()
    }

    #[test]
    fn test_has_valid_extension() {
        let extensions: BTreeSet<String> = [".rs".to_string()].into_iter().collect();
        assert!(has_valid_extension(&candidate("test.rs", None, None), &extensions));
        assert!(has_valid_extension(&candidate("test.RS", None, None), &extensions)); // Case insensitive
        assert!(!has_valid_extension(&candidate("test.py", None, None), &extensions));
        assert!(!has_valid_extension(&candidate("test", None, None), &extensions)); // No extension
    }

    #[test]
    fn test_default_extensions_used_when_unset() {
        let dir = tempdir().unwrap();
        let config = config_with(dir.path(), |_| {});
        assert!(check_eligibility(&candidate("notes.md", Some(1), None), &config).is_ok());
        assert!(check_eligibility(&candidate("run.PS1", Some(1), None), &config).is_ok());
        assert_eq!(
            check_eligibility(&candidate("image.png", Some(1), None), &config),
            Err(SkipReason::WrongExtension)
        );
    }

    #[test]
    fn test_size_limit() {
        let dir = tempdir().unwrap();
        let config = config_with(dir.path(), |o| o.size_limit_kb = Some(1.0));

        assert!(check_eligibility(&candidate("a.txt", Some(1024), None), &config).is_ok());
        assert_eq!(
            check_eligibility(&candidate("a.txt", Some(1025), None), &config),
            Err(SkipReason::TooLarge)
        );
        assert_eq!(
            check_eligibility(&candidate("a.txt", None, None), &config),
            Err(SkipReason::Unreadable)
        );
    }

    #[test]
    fn test_date_range() {
        let dir = tempdir().unwrap();
        let now = SystemTime::now();
        let today = local_day(now);
        let config = config_with(dir.path(), |o| {
            o.start_date = Some(today.format("%Y-%m-%d").to_string());
            o.end_date = Some(today.format("%Y-%m-%d").to_string());
        });

        assert!(check_eligibility(&candidate("a.txt", Some(1), Some(now)), &config).is_ok());

        let long_ago = now - Duration::from_secs(60 * 60 * 24 * 400);
        assert_eq!(
            check_eligibility(&candidate("a.txt", Some(1), Some(long_ago)), &config),
            Err(SkipReason::OutOfDateRange)
        );
        assert_eq!(
            check_eligibility(&candidate("a.txt", Some(1), None), &config),
            Err(SkipReason::Unreadable)
        );
    }

    #[test]
    fn test_extension_checked_before_size() {
        let dir = tempdir().unwrap();
        let config = config_with(dir.path(), |o| o.size_limit_kb = Some(1.0));
        assert_eq!(
            check_eligibility(&candidate("big.bin", Some(1 << 20), None), &config),
            Err(SkipReason::WrongExtension)
        );
    }

    #[test]
    fn test_extension_suggestions() {
        assert_eq!(suggest_extensions([".yamll"]).first(), Some(&".yaml"));
        assert!(suggest_extensions([".qqqqqq"]).is_empty());
        assert!(suggest_extensions([".tx", ".txtt", ".pyy"]).len() <= 3);

        assert!(is_known_text_extension(".rs"));
        assert!(!is_known_text_extension(".png"));
        assert!(DEFAULT_EXTENSIONS.iter().all(|e| is_known_text_extension(e)));
    }

    #[test]
    fn test_is_binary_prefix() {
        assert!(!is_binary_prefix(b"plain text\nmore text"));
        assert!(is_binary_prefix(b"PK\x03\x04\x00\x00"));
        assert!(!is_binary_prefix(b""));

        let mut late_nul = vec![b'a'; BINARY_SNIFF_LEN];
        late_nul.push(0);
        assert!(!is_binary_prefix(&late_nul));
    }
}
