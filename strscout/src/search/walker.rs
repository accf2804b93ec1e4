//! Depth-bounded, lazy directory traversal.
//!
//! The walker is a pull-based iterator over [`WalkEvent`]s. Entries are visited
//! depth-first with the entries of every directory sorted by file name, so two
//! walks over an unchanged tree produce the same sequence. Real directories are
//! always entered. A symlinked directory is followed only when it leads outside the
//! root and its canonical path was not visited yet; otherwise it is pruned and
//! reported as [`WalkWarning::Cycle`], so every directory below the root is walked
//! under its real path exactly once. Unreadable directories and broken links are
//! reported as [`WalkWarning::Unreadable`] and the walk carries on with their
//! siblings.
//!
//! Depth is counted in directory levels below the root: files directly inside the
//! root have depth 0.
use ignore::{DirEntry, Walk, WalkBuilder};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::config::MaxDepth;

/// A regular file discovered by the walker, not yet checked against the filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    /// Lowercase extension with a leading dot
    pub extension: Option<String>,
    /// Directory levels between the root and this file
    pub depth: usize,
    /// `None` when the metadata could not be read
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
}

impl CandidateFile {
    /// Reads the metadata of `path`. Metadata failures leave `size` and
    /// `modified` empty rather than failing.
    pub fn from_path(path: impl Into<PathBuf>, depth: usize) -> Self {
        let path = path.into();
        let metadata = std::fs::metadata(&path).ok();
        Self {
            extension: Self::extension_of(&path),
            size: metadata.as_ref().map(|m| m.len()),
            modified: metadata.and_then(|m| m.modified().ok()),
            depth,
            path,
        }
    }

    fn from_entry(entry: &DirEntry, depth: usize) -> Self {
        let metadata = entry.metadata().ok();
        let path = entry.path().to_path_buf();
        Self {
            extension: Self::extension_of(&path),
            size: metadata.as_ref().map(|m| m.len()),
            modified: metadata.and_then(|m| m.modified().ok()),
            depth,
            path,
        }
    }

    /// Normalized extension of `path`, e.g. `.txt`
    pub fn extension_of(path: &Path) -> Option<String> {
        path.extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
    }
}

/// A non-fatal problem met while walking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WalkWarning {
    /// A directory or entry that could not be read
    Unreadable {
        path: Option<PathBuf>,
        reason: String,
    },
    /// A directory that resolves to one already visited
    Cycle { path: PathBuf },
}

impl fmt::Display for WalkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkWarning::Unreadable {
                path: Some(path),
                reason,
            } => write!(f, "cannot read {}: {}", path.display(), reason),
            WalkWarning::Unreadable { path: None, reason } => write!(f, "walk error: {reason}"),
            WalkWarning::Cycle { path } => {
                write!(f, "skipping {}: directory already visited", path.display())
            }
        }
    }
}

/// One step of the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    /// A directory whose entries are being visited (the root included)
    Directory(PathBuf),
    Candidate(CandidateFile),
    Warning(WalkWarning),
}

type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(shared: &Shared<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lazy walk over the files below a root directory.
///
/// A walker cannot be resumed or rewound; walk again by constructing a new one.
pub struct Walker {
    inner: Walk,
    max_depth: MaxDepth,
    pruned: Shared<Vec<WalkWarning>>,
    cancel: CancellationToken,
}

impl Walker {
    pub fn new(root: &Path, max_depth: MaxDepth, cancel: CancellationToken) -> Self {
        let visited: Shared<HashSet<PathBuf>> = Arc::default();
        let pruned: Shared<Vec<WalkWarning>> = Arc::default();
        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .follow_links(true)
            .sort_by_file_name(|a, b| a.cmp(b));

        // The root is depth 0 for `ignore`, so its files sit one level deeper
        if let Some(limit) = max_depth.limit() {
            builder.max_depth(Some(limit + 1));
        }

        let filter_visited = Arc::clone(&visited);
        let filter_pruned = Arc::clone(&pruned);
        builder.filter_entry(move |entry| {
            if entry.depth() == 0 || !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                return true;
            }
            // Directories past the limit are never entered
            if max_depth.limit().is_some_and(|limit| entry.depth() > limit) {
                return true;
            }
            let Ok(canonical) = entry.path().canonicalize() else {
                return true;
            };
            // Directories inside the root are reached through their real path
            let aliased = entry.path_is_symlink() && canonical.starts_with(&canonical_root);
            if !aliased && lock(&filter_visited).insert(canonical) {
                true
            } else {
                debug!("Pruning already visited directory {}", entry.path().display());
                lock(&filter_pruned).push(WalkWarning::Cycle {
                    path: entry.path().to_path_buf(),
                });
                false
            }
        });

        Self {
            inner: builder.build(),
            max_depth,
            pruned,
            cancel,
        }
    }

    fn take_pruned(&self) -> Option<WalkWarning> {
        let mut pruned = lock(&self.pruned);
        if pruned.is_empty() {
            None
        } else {
            Some(pruned.remove(0))
        }
    }

    fn event_for(&self, entry: DirEntry) -> Option<WalkEvent> {
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let entered = self
                .max_depth
                .limit()
                .map_or(true, |limit| entry.depth() <= limit);
            return entered.then(|| WalkEvent::Directory(entry.into_path()));
        }
        if !file_type.is_file() {
            trace!("Ignoring special file {}", entry.path().display());
            return None;
        }
        let depth = entry.depth().saturating_sub(1);
        Some(WalkEvent::Candidate(CandidateFile::from_entry(&entry, depth)))
    }
}

impl Iterator for Walker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            if let Some(warning) = self.take_pruned() {
                return Some(WalkEvent::Warning(warning));
            }
            if self.cancel.is_cancelled() {
                debug!("Walk cancelled");
                return None;
            }
            match self.inner.next() {
                None => return self.take_pruned().map(WalkEvent::Warning),
                Some(Ok(entry)) => {
                    if let Some(event) = self.event_for(entry) {
                        return Some(event);
                    }
                }
                Some(Err(err)) => return Some(WalkEvent::Warning(classify(err))),
            }
        }
    }
}

/// Turns an `ignore` error into a walk warning, keeping the innermost path
fn classify(err: ignore::Error) -> WalkWarning {
    fn unwrap(err: ignore::Error, path: Option<PathBuf>) -> WalkWarning {
        match err {
            ignore::Error::WithPath { path, err } => unwrap(*err, Some(path)),
            ignore::Error::WithDepth { err, .. } => unwrap(*err, path),
            ignore::Error::Loop { child, .. } => WalkWarning::Cycle { path: child },
            other => WalkWarning::Unreadable {
                path,
                reason: other.to_string(),
            },
        }
    }
    unwrap(err, None)
}
