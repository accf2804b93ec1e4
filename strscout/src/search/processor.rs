use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::Path;
use tracing::{debug, trace, warn};

use crate::config::{EncodingMode, SearchConfig};
use crate::errors::{SearchError, SearchResult};
use crate::filters::{check_eligibility, is_binary_prefix, BINARY_SNIFF_LEN};
use crate::results::{FileMatches, MatchRecord, SkipReason};
use crate::search::walker::CandidateFile;

const BUFFER_CAPACITY: usize = 65536;

/// Bytes of a single line kept for matching; the rest of a longer line is discarded
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Appended to lines cut at the maximum length
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Result of handing one candidate to the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The whole file was read; holds its matching lines (possibly none)
    Scanned(FileMatches),
    Skipped(SkipReason),
}

/// Cuts `line` to `max_chars` characters and appends [`TRUNCATION_MARKER`].
///
/// Returns the display text and, when truncated, the byte length of the kept prefix.
pub fn truncate_line(line: &str, max_chars: usize) -> (String, Option<usize>) {
    match line.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut text = String::with_capacity(cut + TRUNCATION_MARKER.len());
            text.push_str(&line[..cut]);
            text.push_str(TRUNCATION_MARKER);
            (text, Some(cut))
        }
        None => (line.to_string(), None),
    }
}

/// Clips hit spans to the first `visible` bytes, dropping those that start past it
fn clip_spans(spans: Vec<(usize, usize)>, visible: Option<usize>) -> Vec<(usize, usize)> {
    match visible {
        None => spans,
        Some(limit) => spans
            .into_iter()
            .filter(|&(start, _)| start < limit)
            .map(|(start, end)| (start, end.min(limit)))
            .collect(),
    }
}

fn strip_line_ending(bytes: &mut Vec<u8>) {
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
    }
}

/// Reads one line into `buf`, keeping at most `cap` bytes of it.
///
/// Returns the number of bytes consumed (0 at end of input) and whether part of
/// the line was dropped.
fn read_line_capped<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    cap: usize,
) -> io::Result<(usize, bool)> {
    let mut consumed = 0;
    let mut clipped = false;
    loop {
        let available = match reader.fill_buf() {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return Ok((consumed, clipped));
        }
        let (found, used) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (true, i + 1),
            None => (false, available.len()),
        };
        let room = cap.saturating_sub(buf.len());
        if used > room {
            clipped = true;
        }
        buf.extend_from_slice(&available[..used.min(room)]);
        reader.consume(used);
        consumed += used;
        if found {
            return Ok((consumed, clipped));
        }
    }
}

/// Drops a multi-byte character left incomplete by clipping
fn trim_partial_char(bytes: &mut Vec<u8>) {
    if let Err(e) = std::str::from_utf8(bytes) {
        if e.error_len().is_none() {
            bytes.truncate(e.valid_up_to());
        }
    }
}

enum Decoded<'a> {
    Text(std::borrow::Cow<'a, str>),
    Invalid,
}

fn decode_line<'a>(
    bytes: &'a [u8],
    path: &Path,
    line_number: usize,
    mode: EncodingMode,
) -> Decoded<'a> {
    match mode {
        EncodingMode::FailFast => match std::str::from_utf8(bytes) {
            Ok(text) => Decoded::Text(text.into()),
            Err(e) => {
                trace!(
                    "Invalid UTF-8 in {} at line {}: {}",
                    path.display(),
                    line_number,
                    e
                );
                Decoded::Invalid
            }
        },
        EncodingMode::Lossy => {
            let text = String::from_utf8_lossy(bytes);
            if let std::borrow::Cow::Owned(_) = text {
                trace!(
                    "Invalid UTF-8 replaced in {} at line {}",
                    path.display(),
                    line_number
                );
            }
            Decoded::Text(text)
        }
    }
}

/// Scans individual files. One processor is shared by every worker; it holds no
/// mutable state, and each call owns the file handle it opens.
#[derive(Debug, Clone, Copy)]
pub struct FileProcessor<'a> {
    config: &'a SearchConfig,
}

impl<'a> FileProcessor<'a> {
    pub fn new(config: &'a SearchConfig) -> Self {
        Self { config }
    }

    /// Filters, sniffs and scans one candidate.
    ///
    /// Never fails: I/O problems are logged and reported as [`SkipReason::Unreadable`].
    pub fn process(&self, candidate: &CandidateFile) -> FileOutcome {
        trace!("Processing file: {}", candidate.path.display());

        if let Err(reason) = check_eligibility(candidate, self.config) {
            trace!("Skipping {} ({})", candidate.path.display(), reason);
            return FileOutcome::Skipped(reason);
        }

        match self.scan(candidate) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Skipping {}: {}", candidate.path.display(), e);
                FileOutcome::Skipped(SkipReason::Unreadable)
            }
        }
    }

    fn scan(&self, candidate: &CandidateFile) -> SearchResult<FileOutcome> {
        let path = candidate.path.as_path();
        let mut file = File::open(path).map_err(|e| SearchError::from_io(path, e))?;

        let mut head = Vec::with_capacity(BINARY_SNIFF_LEN);
        (&mut file)
            .take(BINARY_SNIFF_LEN as u64)
            .read_to_end(&mut head)
            .map_err(|e| SearchError::from_io(path, e))?;
        if is_binary_prefix(&head) {
            trace!("Skipping binary file {}", path.display());
            return Ok(FileOutcome::Skipped(SkipReason::Binary));
        }

        let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, Cursor::new(head).chain(file));
        let matcher = self.config.matcher();
        let max_chars = self.config.max_line_length();

        let mut records = Vec::new();
        let mut buffer = Vec::with_capacity(256);
        let mut line_number = 0;

        loop {
            buffer.clear();
            let (read, clipped) = read_line_capped(&mut reader, &mut buffer, MAX_LINE_BYTES)
                .map_err(|e| SearchError::from_io(path, e))?;
            if read == 0 {
                break;
            }
            line_number += 1;
            if clipped {
                debug!(
                    "Line {} of {} is longer than {} bytes, only its start is searched",
                    line_number,
                    path.display(),
                    MAX_LINE_BYTES
                );
                trim_partial_char(&mut buffer);
            } else {
                strip_line_ending(&mut buffer);
            }

            let decoded = decode_line(&buffer, path, line_number, self.config.encoding_mode());
            let line = match decoded {
                Decoded::Text(line) => line,
                Decoded::Invalid => return Ok(FileOutcome::Skipped(SkipReason::Binary)),
            };

            if !matcher.is_match(&line) {
                continue;
            }

            let spans = matcher.find_spans(&line);
            let (line_content, visible) = truncate_line(&line, max_chars);
            trace!("Found match at line {}: {}", line_number, line_content);
            records.push(MatchRecord {
                path: candidate.path.clone(),
                line_number,
                line_content,
                spans: clip_spans(spans, visible),
                truncated: visible.is_some(),
            });
        }

        Ok(FileOutcome::Scanned(FileMatches {
            path: candidate.path.clone(),
            modified: candidate.modified.map(DateTime::<Local>::from),
            records,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatchMode, SearchOptions};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn setup(
        contents: &[u8],
        edit: impl FnOnce(&mut SearchOptions),
    ) -> (TempDir, SearchConfig, CandidateFile) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        fs::write(&path, contents).unwrap();
        let mut options = SearchOptions::new(dir.path(), "needle");
        edit(&mut options);
        let config = options.validate().unwrap();
        let candidate = CandidateFile::from_path(&path, 0);
        (dir, config, candidate)
    }

    fn scanned(outcome: FileOutcome) -> FileMatches {
        match outcome {
            FileOutcome::Scanned(file) => file,
            FileOutcome::Skipped(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn test_line_numbers_are_one_based() {
        let (_dir, config, candidate) = setup(b"first\nsecond needle\nthird\nneedle\n", |_| {});
        let file = scanned(FileProcessor::new(&config).process(&candidate));

        let lines: Vec<_> = file.records.iter().map(|r| r.line_number).collect();
        assert_eq!(lines, vec![2, 4]);
        assert_eq!(file.records[0].line_content, "second needle");
        assert_eq!(file.records[0].spans, vec![(7, 13)]);
        assert!(file.modified.is_some());
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        let (_dir, config, candidate) = setup(b"a needle\r\nb\r\nneedle c", |_| {});
        let file = scanned(FileProcessor::new(&config).process(&candidate));
        assert_eq!(file.records.len(), 2);
        assert_eq!(file.records[0].line_content, "a needle");
        assert_eq!(file.records[1].line_number, 3);
        assert_eq!(file.records[1].line_content, "needle c");
    }

    #[test]
    fn test_no_matches_is_still_scanned() {
        let (_dir, config, candidate) = setup(b"nothing here\n", |_| {});
        let file = scanned(FileProcessor::new(&config).process(&candidate));
        assert!(file.records.is_empty());
    }

    #[test]
    fn test_long_line_truncated() {
        let mut line = "x".repeat(50);
        line.push_str("needle");
        line.push_str(&"y".repeat(50));
        let (_dir, config, candidate) = setup(line.as_bytes(), |o| o.max_line_length = 20);

        let file = scanned(FileProcessor::new(&config).process(&candidate));
        let record = &file.records[0];
        assert!(record.truncated);
        assert_eq!(
            record.line_content.chars().count(),
            20 + TRUNCATION_MARKER.chars().count()
        );
        assert!(record.line_content.ends_with(TRUNCATION_MARKER));
        // The hit lies past the cut, so nothing is left to highlight
        assert!(record.spans.is_empty());
    }

    #[test]
    fn test_span_clipped_at_cut() {
        let (_dir, config, candidate) = setup(b"abc needle tail", |o| o.max_line_length = 7);
        let file = scanned(FileProcessor::new(&config).process(&candidate));
        let record = &file.records[0];
        assert_eq!(record.line_content, format!("abc nee{TRUNCATION_MARKER}"));
        assert_eq!(record.spans, vec![(4, 7)]);
    }

    #[test]
    fn test_truncate_line_respects_char_boundaries() {
        let (text, cut) = truncate_line("äöüß", 2);
        assert_eq!(text, format!("äö{TRUNCATION_MARKER}"));
        assert_eq!(cut, Some(4));

        let (text, cut) = truncate_line("short", 5);
        assert_eq!(text, "short");
        assert_eq!(cut, None);
    }

    #[test]
    fn test_binary_file_skipped() {
        let (_dir, config, candidate) = setup(b"needle\x00\x01\x02", |_| {});
        assert_eq!(
            FileProcessor::new(&config).process(&candidate),
            FileOutcome::Skipped(SkipReason::Binary)
        );
    }

    #[test]
    fn test_invalid_utf8_lossy_and_failfast() {
        let contents = b"caf\xe9 needle\n";
        let (_dir, config, candidate) = setup(contents, |_| {});
        let file = scanned(FileProcessor::new(&config).process(&candidate));
        assert_eq!(file.records.len(), 1);
        assert!(file.records[0].line_content.contains('\u{FFFD}'));

        let (_dir, config, candidate) = setup(contents, |o| {
            o.encoding_mode = EncodingMode::FailFast;
        });
        assert_eq!(
            FileProcessor::new(&config).process(&candidate),
            FileOutcome::Skipped(SkipReason::Binary)
        );
    }

    #[test]
    fn test_vanished_file_is_unreadable() {
        let (dir, config, candidate) = setup(b"needle", |_| {});
        fs::remove_file(dir.path().join("sample.txt")).unwrap();
        assert_eq!(
            FileProcessor::new(&config).process(&candidate),
            FileOutcome::Skipped(SkipReason::Unreadable)
        );
    }

    #[test]
    fn test_filters_applied_before_reading() {
        let (_dir, config, candidate) = setup(b"needle", |o| {
            o.extensions = vec![".md".to_string()];
        });
        assert_eq!(
            FileProcessor::new(&config).process(&candidate),
            FileOutcome::Skipped(SkipReason::WrongExtension)
        );
    }

    #[test]
    fn test_decode_line_borrows_valid_input() {
        let path = Path::new("sample.txt");
        match decode_line(b"plain", path, 1, EncodingMode::FailFast) {
            Decoded::Text(text) => {
                assert!(matches!(text, std::borrow::Cow::Borrowed("plain")));
            }
            Decoded::Invalid => panic!("valid UTF-8 rejected"),
        }
        assert!(matches!(
            decode_line(b"caf\xe9", path, 1, EncodingMode::FailFast),
            Decoded::Invalid
        ));
    }

    #[test]
    fn test_read_line_capped() {
        let mut reader = Cursor::new(b"abcdefgh\nxy\nz".to_vec());
        let mut buf = Vec::new();

        assert_eq!(read_line_capped(&mut reader, &mut buf, 4).unwrap(), (9, true));
        assert_eq!(buf, b"abcd");

        buf.clear();
        assert_eq!(read_line_capped(&mut reader, &mut buf, 4).unwrap(), (3, false));
        assert_eq!(buf, b"xy\n");

        buf.clear();
        assert_eq!(read_line_capped(&mut reader, &mut buf, 4).unwrap(), (1, false));
        assert_eq!(buf, b"z");

        buf.clear();
        assert_eq!(read_line_capped(&mut reader, &mut buf, 4).unwrap(), (0, false));
    }

    #[test]
    fn test_trim_partial_char() {
        let mut bytes = "aä".as_bytes()[..2].to_vec();
        trim_partial_char(&mut bytes);
        assert_eq!(bytes, b"a");

        let mut bytes = "aä".as_bytes().to_vec();
        trim_partial_char(&mut bytes);
        assert_eq!(bytes, "aä".as_bytes());
    }

    #[test]
    fn test_oversized_line_searched_up_to_limit() {
        let mut contents = b"needle ".to_vec();
        contents.extend(std::iter::repeat(b'x').take(MAX_LINE_BYTES + 10));
        contents.extend_from_slice(b" needle\n");
        contents.extend(std::iter::repeat(b'y').take(MAX_LINE_BYTES + 10));
        contents.extend_from_slice(b" needle\nneedle tail\n");
        let (_dir, config, candidate) = setup(&contents, |o| o.max_line_length = 20);

        let file = scanned(FileProcessor::new(&config).process(&candidate));
        let lines: Vec<_> = file.records.iter().map(|r| r.line_number).collect();
        // The hit past the limit on line 2 is not seen; line numbering is unaffected
        assert_eq!(lines, vec![1, 3]);
        assert!(file.records[0].truncated);
        assert_eq!(file.records[1].line_content, "needle tail");
    }

    #[test]
    fn test_regex_mode() {
        let (_dir, config, candidate) = setup(b"id=42\nid=x\nid=7\n", |o| {
            o.term = r"id=\d+".to_string();
            o.mode = MatchMode::Regex;
        });
        let file = scanned(FileProcessor::new(&config).process(&candidate));
        let lines: Vec<_> = file.records.iter().map(|r| r.line_number).collect();
        assert_eq!(lines, vec![1, 3]);
    }
}
