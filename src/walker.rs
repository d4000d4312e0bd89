//! Recursive filesystem search.
//!
//! Every walk is depth-first with siblings visited in file-name order, so
//! results are stable across runs over an unchanged tree. Symlinks are followed
//! by default; a link that leads back to one of its own ancestors is reported
//! as a [`Diagnostic::SymlinkCycle`] and not descended into.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{DatasetError, Result};
use crate::pattern::Pattern;

/// Outcome of [`FileWalker::find_one_each`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetMatch {
    /// A pattern matched more than once somewhere in the subtree.
    Ambiguous {
        pattern_index: usize,
        first: PathBuf,
        second: PathBuf,
    },
    /// One slot per pattern, `None` where the pattern never matched.
    Matched(Vec<Option<PathBuf>>),
}

impl SetMatch {
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, SetMatch::Ambiguous { .. })
    }

    /// True when every pattern matched exactly once.
    pub fn is_complete(&self) -> bool {
        match self {
            SetMatch::Matched(slots) => slots.iter().all(Option::is_some),
            SetMatch::Ambiguous { .. } => false,
        }
    }

    /// The matched paths, in pattern order, if every pattern matched exactly once.
    pub fn complete(self) -> Option<Vec<PathBuf>> {
        match self {
            SetMatch::Matched(slots) => slots.into_iter().collect(),
            SetMatch::Ambiguous { .. } => None,
        }
    }
}

pub struct FileWalker<'s> {
    sink: &'s dyn DiagnosticSink,
    follow_links: bool,
}

impl<'s> FileWalker<'s> {
    pub fn new(sink: &'s dyn DiagnosticSink) -> Self {
        Self {
            sink,
            follow_links: true,
        }
    }

    pub fn follow_links(mut self, yes: bool) -> Self {
        self.follow_links = yes;
        self
    }

    pub fn sink(&self) -> &'s dyn DiagnosticSink {
        self.sink
    }

    /// First file under `root` whose name matches `pattern`.
    pub fn find_first(&self, root: impl AsRef<Path>, pattern: &Pattern) -> Option<PathBuf> {
        self.entries(root.as_ref())
            .find(|entry| entry.file_type().is_file() && pattern.matches_path(entry.path()))
            .map(DirEntry::into_path)
    }

    /// Every file under `root` whose name matches `pattern`.
    pub fn find_all(&self, root: impl AsRef<Path>, pattern: &Pattern) -> Vec<PathBuf> {
        self.entries(root.as_ref())
            .filter(|entry| entry.file_type().is_file() && pattern.matches_path(entry.path()))
            .map(DirEntry::into_path)
            .collect()
    }

    /// The one file under `root` matching `pattern`.
    pub fn find_unique(&self, root: impl AsRef<Path>, pattern: &Pattern) -> Result<PathBuf> {
        let root = root.as_ref();
        let mut found = self.find_all(root, pattern);
        match found.len() {
            0 => Err(DatasetError::NoMatch {
                dir: root.to_path_buf(),
            }),
            1 => Ok(found.swap_remove(0)),
            count => Err(DatasetError::AmbiguousMatch {
                dir: root.to_path_buf(),
                count,
            }),
        }
    }

    /// Every directory below `root` whose name matches `pattern`.
    ///
    /// A directory that does not match is still searched, and so is one that
    /// does: nested matches are returned too.
    pub fn find_dirs(&self, root: impl AsRef<Path>, pattern: &Pattern) -> Vec<PathBuf> {
        let root = root.as_ref();
        let dirs: Vec<_> = self
            .entries(root)
            .filter(|entry| entry.file_type().is_dir() && pattern.matches_path(entry.path()))
            .map(DirEntry::into_path)
            .collect();
        debug!(
            root = %root.display(),
            pattern = %pattern,
            found = dirs.len(),
            "Directory search finished"
        );
        dirs
    }

    /// Look for exactly one file per pattern anywhere under `root`.
    ///
    /// A single file may fill several slots if it matches several patterns.
    /// The search stops at the first pattern that matches a second file.
    pub fn find_one_each(&self, root: impl AsRef<Path>, patterns: &[Pattern]) -> SetMatch {
        let mut slots: Vec<Option<PathBuf>> = vec![None; patterns.len()];

        for entry in self.entries(root.as_ref()) {
            if !entry.file_type().is_file() {
                continue;
            }
            for (pattern_index, pattern) in patterns.iter().enumerate() {
                if !pattern.matches_path(entry.path()) {
                    continue;
                }
                match &slots[pattern_index] {
                    None => slots[pattern_index] = Some(entry.path().to_path_buf()),
                    Some(first) => {
                        return SetMatch::Ambiguous {
                            pattern_index,
                            first: first.clone(),
                            second: entry.path().to_path_buf(),
                        };
                    }
                }
            }
        }

        SetMatch::Matched(slots)
    }

    /// Files directly inside `root`, without descending.
    pub fn list_files(&self, root: impl AsRef<Path>) -> Vec<PathBuf> {
        self.walk(root.as_ref(), 1)
            .filter(|entry| entry.file_type().is_file())
            .map(DirEntry::into_path)
            .collect()
    }

    fn entries<'a>(&'a self, root: &Path) -> impl Iterator<Item = DirEntry> + 'a {
        self.walk(root, usize::MAX)
    }

    /// Walk everything below `root` (not `root` itself), reporting unreadable
    /// entries and cycles to the sink and skipping them.
    fn walk<'a>(&'a self, root: &Path, max_depth: usize) -> impl Iterator<Item = DirEntry> + 'a {
        WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    let diagnostic = match err.loop_ancestor() {
                        Some(ancestor) => Diagnostic::SymlinkCycle {
                            path: err.path().map(Path::to_path_buf).unwrap_or_default(),
                            ancestor: ancestor.to_path_buf(),
                        },
                        None => Diagnostic::WalkError {
                            path: err.path().map(Path::to_path_buf),
                            error: err.to_string(),
                        },
                    };
                    self.sink.report(diagnostic);
                    None
                }
            })
    }
}
