pub mod cancel;
pub mod config;
pub mod errors;
pub mod filters;
pub mod results;
pub mod search;

pub use cancel::CancellationToken;
pub use config::{MatchMode, MaxDepth, SearchConfig, SearchOptions};
pub use errors::{SearchError, SearchResult};
pub use results::{
    FileMatches, MatchRecord, ReportSet, ScanSummary, SearchOutcome, SearchStatus, SkipReason,
    SkipTally,
};
pub use search::{search, search_with_cancel, search_with_progress, NoProgress, ProgressSink};
