//! Concurrent search over a directory tree.
//!
//! A search runs in three stages:
//!
//! 1. **Walk**: a single [`Walker`] on its own thread produces [`CandidateFile`]s in
//!    file-name order and pushes them into a bounded queue. A full queue blocks the
//!    walker, so traversal never runs far ahead of the workers.
//! 2. **Scan**: a fixed number of workers on a dedicated rayon pool pull candidates,
//!    run the filters and scan each file line by line with the [`Matcher`]. Every
//!    worker keeps its own output; nothing is shared between workers while scanning.
//! 3. **Join**: once every worker has returned, the outputs are merged and ordered by
//!    path and line number.
//!
//! ```rust,no_run
//! use strscout::{search, SearchOptions};
//!
//! # fn main() -> Result<(), strscout::SearchError> {
//! let config = SearchOptions::new("./notes", "TODO").validate()?;
//! let outcome = search(&config)?;
//! for record in outcome.report.records() {
//!     println!("{}:{}: {}", record.path.display(), record.line_number, record.line_content);
//! }
//! # Ok(())
//! # }
//! ```
pub mod engine;
pub mod matcher;
pub mod processor;
pub mod walker;

pub use engine::{search, search_with_cancel, search_with_progress, NoProgress, ProgressSink};
pub use matcher::Matcher;
pub use processor::{FileOutcome, FileProcessor, TRUNCATION_MARKER};
pub use walker::{CandidateFile, WalkEvent, WalkWarning, Walker};
