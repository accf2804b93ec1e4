use regex::{Regex, RegexBuilder};

use crate::config::MatchMode;
use crate::errors::{SearchError, SearchResult};

/// Line predicate for the search term, resolved once when the configuration is
/// validated. Spans are byte ranges into the line, in ascending order.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Substring search without special characters
    Literal(LiteralMatcher),
    /// Compiled regular expression
    Pattern(Regex),
}

/// Substring search with optional case folding and word boundaries
#[derive(Debug, Clone)]
pub struct LiteralMatcher {
    needle: String,
    /// Escaped, case-insensitive searcher; `None` for case-sensitive matching
    folded: Option<Regex>,
    whole_word: bool,
}

impl Matcher {
    /// Builds the matcher for `term`. `mode` must already be resolved.
    pub fn new(
        term: &str,
        mode: MatchMode,
        case_sensitive: bool,
        whole_word: bool,
    ) -> SearchResult<Self> {
        if term.is_empty() {
            return Err(SearchError::config_error("search term", "must not be empty"));
        }

        match mode.resolve(term) {
            MatchMode::Regex => {
                let pattern = if whole_word {
                    format!(r"\b(?:{term})\b")
                } else {
                    term.to_string()
                };
                let regex = RegexBuilder::new(&pattern)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map_err(|e| SearchError::invalid_pattern(e.to_string()))?;
                Ok(Matcher::Pattern(regex))
            }
            _ => {
                let folded = if case_sensitive {
                    None
                } else {
                    Some(
                        RegexBuilder::new(&regex::escape(term))
                            .case_insensitive(true)
                            .build()
                            .map_err(|e| SearchError::invalid_pattern(e.to_string()))?,
                    )
                };
                Ok(Matcher::Literal(LiteralMatcher {
                    needle: term.to_string(),
                    folded,
                    whole_word,
                }))
            }
        }
    }

    /// Whether the line contains at least one hit
    pub fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Literal(literal) => literal.is_match(line),
            Matcher::Pattern(regex) => regex.is_match(line),
        }
    }

    /// All hits in the line
    pub fn find_spans(&self, line: &str) -> Vec<(usize, usize)> {
        match self {
            Matcher::Literal(literal) => literal.find_spans(line),
            Matcher::Pattern(regex) => regex.find_iter(line).map(|m| (m.start(), m.end())).collect(),
        }
    }
}

impl LiteralMatcher {
    fn is_match(&self, line: &str) -> bool {
        if self.whole_word {
            return !self.find_spans(line).is_empty();
        }
        match &self.folded {
            Some(regex) => regex.is_match(line),
            None => line.contains(&self.needle),
        }
    }

    fn find_spans(&self, line: &str) -> Vec<(usize, usize)> {
        let spans: Vec<(usize, usize)> = match &self.folded {
            Some(regex) => regex.find_iter(line).map(|m| (m.start(), m.end())).collect(),
            None => line
                .match_indices(self.needle.as_str())
                .map(|(start, hit)| (start, start + hit.len()))
                .collect(),
        };

        if self.whole_word {
            spans
                .into_iter()
                .filter(|&(start, end)| is_word_bounded(line, start, end))
                .collect()
        } else {
            spans
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// No word character directly before `start` or directly after `end`
fn is_word_bounded(line: &str, start: usize, end: usize) -> bool {
    let before = line[..start].chars().next_back();
    let after = line[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}
