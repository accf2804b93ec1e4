/// Search result types.
///
/// Workers build [`FileMatches`] groups privately and hand them over at the join
/// barrier as part of a [`WorkerOutput`]. [`ReportSet::collect`] then orders the
/// groups by path and the records of each group by line number, so the final
/// report depends only on what is on disk, never on which worker scanned what.
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::search::walker::WalkWarning;

/// One matching line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    /// The file containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line_number: usize,
    /// The line, truncated and suffixed with the truncation marker when too long
    pub line_content: String,
    /// Byte ranges of the hits inside `line_content`
    pub spans: Vec<(usize, usize)>,
    /// Whether `line_content` was truncated
    pub truncated: bool,
}

/// All matching lines of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMatches {
    pub path: PathBuf,
    /// Last modification time, shown next to each hit
    pub modified: Option<DateTime<Local>>,
    pub records: Vec<MatchRecord>,
}

/// Why a candidate file was not scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Binary,
    TooLarge,
    OutOfDateRange,
    WrongExtension,
    Unreadable,
}

impl SkipReason {
    pub const ALL: [SkipReason; 5] = [
        SkipReason::Binary,
        SkipReason::TooLarge,
        SkipReason::OutOfDateRange,
        SkipReason::WrongExtension,
        SkipReason::Unreadable,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SkipReason::Binary => "binary",
            SkipReason::TooLarge => "too-large",
            SkipReason::OutOfDateRange => "out-of-date-range",
            SkipReason::WrongExtension => "wrong-extension",
            SkipReason::Unreadable => "unreadable",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-reason count of skipped files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipTally {
    pub binary: usize,
    pub too_large: usize,
    pub out_of_date_range: usize,
    pub wrong_extension: usize,
    pub unreadable: usize,
}

impl SkipTally {
    pub fn record(&mut self, reason: SkipReason) {
        *self.slot(reason) += 1;
    }

    pub fn get(&self, reason: SkipReason) -> usize {
        match reason {
            SkipReason::Binary => self.binary,
            SkipReason::TooLarge => self.too_large,
            SkipReason::OutOfDateRange => self.out_of_date_range,
            SkipReason::WrongExtension => self.wrong_extension,
            SkipReason::Unreadable => self.unreadable,
        }
    }

    pub fn total(&self) -> usize {
        SkipReason::ALL.iter().map(|&r| self.get(r)).sum()
    }

    pub fn merge(&mut self, other: &SkipTally) {
        for reason in SkipReason::ALL {
            *self.slot(reason) += other.get(reason);
        }
    }

    /// Non-zero counts, in a fixed order
    pub fn iter(&self) -> impl Iterator<Item = (SkipReason, usize)> + '_ {
        SkipReason::ALL
            .into_iter()
            .map(|r| (r, self.get(r)))
            .filter(|&(_, n)| n > 0)
    }

    fn slot(&mut self, reason: SkipReason) -> &mut usize {
        match reason {
            SkipReason::Binary => &mut self.binary,
            SkipReason::TooLarge => &mut self.too_large,
            SkipReason::OutOfDateRange => &mut self.out_of_date_range,
            SkipReason::WrongExtension => &mut self.wrong_extension,
            SkipReason::Unreadable => &mut self.unreadable,
        }
    }
}

/// What one worker produced before the join barrier
#[derive(Debug, Clone, Default)]
pub struct WorkerOutput {
    /// Files with at least one match
    pub files: Vec<FileMatches>,
    pub files_scanned: usize,
    pub skipped: SkipTally,
}

/// Matches grouped by file, in lexicographic path order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSet {
    files: Vec<FileMatches>,
}

impl ReportSet {
    /// Orders file groups by path and each group's records by line number.
    /// Groups that share a path are merged.
    pub fn collect(groups: impl IntoIterator<Item = FileMatches>) -> Self {
        let mut by_path: BTreeMap<PathBuf, FileMatches> = BTreeMap::new();
        for group in groups {
            match by_path.get_mut(&group.path) {
                Some(existing) => {
                    existing.records.extend(group.records);
                    existing.modified = existing.modified.or(group.modified);
                }
                None => {
                    by_path.insert(group.path.clone(), group);
                }
            }
        }

        let files = by_path
            .into_values()
            .filter(|group| !group.records.is_empty())
            .map(|mut group| {
                group.records.sort_by_key(|r| r.line_number);
                group
            })
            .collect();
        Self { files }
    }

    pub fn files(&self) -> &[FileMatches] {
        &self.files
    }

    /// Every record, in report order
    pub fn records(&self) -> impl Iterator<Item = &MatchRecord> {
        self.files.iter().flat_map(|f| f.records.iter())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_matches(&self) -> usize {
        self.files.iter().map(|f| f.records.len()).sum()
    }
}

/// Counters describing a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Files that passed the filters and were read to the end
    pub files_scanned: usize,
    pub files_with_matches: usize,
    pub total_matches: usize,
    pub skipped: SkipTally,
    pub directories_visited: usize,
    pub walk_warnings: usize,
    /// The run stopped early; the report holds only fully scanned files
    pub cancelled: bool,
}

/// Whether a completed run found anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchStatus {
    Matched,
    NoMatches,
}

/// Everything a completed run hands to the reporter
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub report: ReportSet,
    pub summary: ScanSummary,
    pub warnings: Vec<WalkWarning>,
}

impl SearchOutcome {
    /// Builds the outcome from the worker outputs gathered at the join barrier
    pub fn assemble(
        outputs: Vec<WorkerOutput>,
        directories_visited: usize,
        warnings: Vec<WalkWarning>,
        cancelled: bool,
    ) -> Self {
        let mut summary = ScanSummary {
            directories_visited,
            walk_warnings: warnings.len(),
            cancelled,
            ..ScanSummary::default()
        };

        let mut groups = Vec::new();
        for output in outputs {
            summary.files_scanned += output.files_scanned;
            summary.skipped.merge(&output.skipped);
            groups.extend(output.files);
        }

        let report = ReportSet::collect(groups);
        summary.files_with_matches = report.len();
        summary.total_matches = report.total_matches();

        Self {
            report,
            summary,
            warnings,
        }
    }

    pub fn status(&self) -> SearchStatus {
        if self.report.is_empty() {
            SearchStatus::NoMatches
        } else {
            SearchStatus::Matched
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, line_number: usize) -> MatchRecord {
        MatchRecord {
            path: PathBuf::from(path),
            line_number,
            line_content: "Hello".to_string(),
            spans: vec![(0, 5)],
            truncated: false,
        }
    }

    fn group(path: &str, lines: &[usize]) -> FileMatches {
        FileMatches {
            path: PathBuf::from(path),
            modified: None,
            records: lines.iter().map(|&l| record(path, l)).collect(),
        }
    }

    #[test]
    fn test_collect_orders_paths_and_lines() {
        let report = ReportSet::collect(vec![
            group("z.txt", &[3, 1]),
            group("a.txt", &[10, 2, 7]),
            group("m/b.txt", &[1]),
        ]);

        let paths: Vec<_> = report.files().iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("m/b.txt"),
                PathBuf::from("z.txt")
            ]
        );
        let lines: Vec<_> = report.files()[0]
            .records
            .iter()
            .map(|r| r.line_number)
            .collect();
        assert_eq!(lines, vec![2, 7, 10]);
        assert_eq!(report.total_matches(), 6);
    }

    #[test]
    fn test_collect_is_independent_of_input_order() {
        let forward = ReportSet::collect(vec![group("a.txt", &[1]), group("b.txt", &[1, 2])]);
        let backward = ReportSet::collect(vec![group("b.txt", &[2, 1]), group("a.txt", &[1])]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_collect_merges_same_path_and_drops_empty() {
        let report = ReportSet::collect(vec![
            group("a.txt", &[5]),
            group("a.txt", &[1]),
            group("empty.txt", &[]),
        ]);
        assert_eq!(report.len(), 1);
        let lines: Vec<_> = report.records().map(|r| r.line_number).collect();
        assert_eq!(lines, vec![1, 5]);
    }

    #[test]
    fn test_skip_tally() {
        let mut tally = SkipTally::default();
        tally.record(SkipReason::Binary);
        tally.record(SkipReason::TooLarge);
        tally.record(SkipReason::TooLarge);
        assert_eq!(tally.get(SkipReason::TooLarge), 2);
        assert_eq!(tally.total(), 3);

        let mut other = SkipTally::default();
        other.record(SkipReason::Unreadable);
        tally.merge(&other);
        assert_eq!(tally.total(), 4);

        let listed: Vec<_> = tally.iter().collect();
        assert_eq!(
            listed,
            vec![
                (SkipReason::Binary, 1),
                (SkipReason::TooLarge, 2),
                (SkipReason::Unreadable, 1)
            ]
        );
    }

    #[test]
    fn test_assemble_outcome() {
        let mut first = WorkerOutput {
            files: vec![group("b.txt", &[1])],
            files_scanned: 2,
            ..WorkerOutput::default()
        };
        first.skipped.record(SkipReason::WrongExtension);
        let second = WorkerOutput {
            files: vec![group("a.txt", &[3, 4])],
            files_scanned: 1,
            ..WorkerOutput::default()
        };

        let outcome = SearchOutcome::assemble(vec![first, second], 3, Vec::new(), false);
        assert_eq!(outcome.summary.files_scanned, 3);
        assert_eq!(outcome.summary.files_with_matches, 2);
        assert_eq!(outcome.summary.total_matches, 3);
        assert_eq!(outcome.summary.skipped.wrong_extension, 1);
        assert_eq!(outcome.summary.directories_visited, 3);
        assert_eq!(outcome.status(), SearchStatus::Matched);
        assert_eq!(outcome.report.files()[0].path, PathBuf::from("a.txt"));
    }

    #[test]
    fn test_empty_outcome_status() {
        let outcome = SearchOutcome::assemble(Vec::new(), 1, Vec::new(), false);
        assert_eq!(outcome.status(), SearchStatus::NoMatches);
        assert!(outcome.to_json().unwrap().contains("\"files_scanned\": 0"));
    }
}
