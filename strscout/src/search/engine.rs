use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::ThreadPoolBuilder;
use std::path::Path;
use std::thread;
use tracing::{debug, info, warn};

use super::processor::{FileOutcome, FileProcessor};
use super::walker::{CandidateFile, WalkEvent, WalkWarning, Walker};
use crate::cancel::CancellationToken;
use crate::config::SearchConfig;
use crate::errors::{SearchError, SearchResult};
use crate::results::{SearchOutcome, WorkerOutput};

/// Observer for search progress. Called concurrently from the walker thread and
/// from every worker.
pub trait ProgressSink: Sync {
    /// A candidate was handed to the queue; `queued` counts candidates so far
    fn file_queued(&self, _path: &Path, _queued: usize) {}

    /// A worker is done with a candidate, scanned or skipped
    fn file_finished(&self, _path: &Path) {}
}

/// Progress sink that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// What the walker thread reports once traversal ends
#[derive(Debug, Default)]
struct WalkTotals {
    directories: usize,
    candidates: usize,
    warnings: Vec<WalkWarning>,
}

/// Searches every eligible file below the configured root
pub fn search(config: &SearchConfig) -> SearchResult<SearchOutcome> {
    search_with_cancel(config, &CancellationToken::new())
}

/// Like [`search`], stopping early once `cancel` fires.
///
/// A cancelled search still returns the files that were scanned to the end.
pub fn search_with_cancel(
    config: &SearchConfig,
    cancel: &CancellationToken,
) -> SearchResult<SearchOutcome> {
    search_with_progress(config, cancel, &NoProgress)
}

/// Runs the search with a walker thread feeding a bounded queue drained by a
/// fixed pool of workers. Results are merged only after every worker returned.
pub fn search_with_progress(
    config: &SearchConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
) -> SearchResult<SearchOutcome> {
    info!(
        "Starting search for {:?} in {} (depth {}, {} workers)",
        config.term(),
        config.root_path().display(),
        config.max_depth(),
        config.thread_count()
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.thread_count())
        .thread_name(|i| format!("strscout-worker-{i}"))
        .build()
        .map_err(|e| SearchError::pool(e.to_string()))?;

    let (tx, rx) = bounded::<CandidateFile>(config.queue_capacity());
    let processor = FileProcessor::new(config);

    let (outputs, walk) = thread::scope(|scope| {
        let producer = scope.spawn(move || produce(config, cancel, progress, tx));

        let outputs = pool.broadcast(|_| run_worker(&processor, &rx, cancel, progress));

        // Unblocks a walker still waiting on a full queue after cancellation
        drop(rx);
        (outputs, producer.join())
    });
    let walk = walk.map_err(|_| SearchError::pool("walker thread panicked"))?;

    let cancelled = cancel.is_cancelled();
    debug!(
        "Walk finished: {} directories, {} candidates, {} warnings",
        walk.directories,
        walk.candidates,
        walk.warnings.len()
    );

    let outcome = SearchOutcome::assemble(outputs, walk.directories, walk.warnings, cancelled);

    info!(
        "Search {}. Found {} matches in {} files ({} scanned, {} skipped)",
        if cancelled { "cancelled" } else { "complete" },
        outcome.summary.total_matches,
        outcome.summary.files_with_matches,
        outcome.summary.files_scanned,
        outcome.summary.skipped.total()
    );

    Ok(outcome)
}

fn produce(
    config: &SearchConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
    tx: Sender<CandidateFile>,
) -> WalkTotals {
    let mut totals = WalkTotals::default();

    for event in Walker::new(config.root_path(), config.max_depth(), cancel.clone()) {
        match event {
            WalkEvent::Directory(path) => {
                debug!("Entering directory {}", path.display());
                totals.directories += 1;
            }
            WalkEvent::Warning(warning) => {
                warn!("{}", warning);
                totals.warnings.push(warning);
            }
            WalkEvent::Candidate(candidate) => {
                totals.candidates += 1;
                progress.file_queued(&candidate.path, totals.candidates);
                if tx.send(candidate).is_err() {
                    debug!("Workers are gone, stopping walk");
                    break;
                }
            }
        }
    }

    totals
}

fn run_worker(
    processor: &FileProcessor<'_>,
    rx: &Receiver<CandidateFile>,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
) -> WorkerOutput {
    let mut output = WorkerOutput::default();

    while !cancel.is_cancelled() {
        let Ok(candidate) = rx.recv() else {
            break;
        };

        match processor.process(&candidate) {
            FileOutcome::Scanned(file) => {
                output.files_scanned += 1;
                if !file.records.is_empty() {
                    output.files.push(file);
                }
            }
            FileOutcome::Skipped(reason) => output.skipped.record(reason),
        }
        progress.file_finished(&candidate.path);
    }

    output
}
