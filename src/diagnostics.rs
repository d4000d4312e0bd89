//! Caller-supplied channel for the warnings a discovery walk produces.
//!
//! Discovery over a large, inconsistently organized tree skips directories it
//! cannot make sense of instead of failing. Every skip is reported here so the
//! caller decides whether it is logged, collected, or dropped.

use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;

use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// More than one candidate scan was found where exactly one was expected.
    AmbiguousScan { dir: PathBuf, count: usize },

    /// No candidate scan was found in a directory.
    NoScan { dir: PathBuf },

    /// An annotation file matched but could not be parsed; it was dropped.
    AnnotationParseFailed { path: PathBuf, error: String },

    /// A symlink pointed back at one of its ancestors and was not followed.
    SymlinkCycle { path: PathBuf, ancestor: PathBuf },

    /// An entry could not be read during a walk.
    WalkError { path: Option<PathBuf>, error: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::AmbiguousScan { dir, count } => write!(
                f,
                "Multiple ({count}) unannotated tomograms found in {}. The scan pattern may not be specific enough, or the directory is unusual.",
                dir.display()
            ),
            Diagnostic::NoScan { dir } => write!(f, "No tomograms found in {}.", dir.display()),
            Diagnostic::AnnotationParseFailed { path, error } => {
                write!(f, "Failed to load annotation {}: {error}", path.display())
            }
            Diagnostic::SymlinkCycle { path, ancestor } => write!(
                f,
                "Symlink cycle at {} (points back to {})",
                path.display(),
                ancestor.display()
            ),
            Diagnostic::WalkError { path: Some(path), error } => {
                write!(f, "Could not read {}: {error}", path.display())
            }
            Diagnostic::WalkError { path: None, error } => write!(f, "Walk error: {error}"),
        }
    }
}

pub trait DiagnosticSink {
    fn report(&self, diagnostic: Diagnostic);
}

impl<F> DiagnosticSink for F
where
    F: Fn(Diagnostic),
{
    fn report(&self, diagnostic: Diagnostic) {
        self(diagnostic)
    }
}

/// Forwards every diagnostic to `tracing` at WARN level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl DiagnosticSink for SilentSink {
    fn report(&self, _diagnostic: Diagnostic) {}
}

/// Keeps diagnostics in memory for later inspection.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.borrow().is_empty()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.report(Diagnostic::NoScan {
            dir: PathBuf::from("a"),
        });
        sink.report(Diagnostic::AmbiguousScan {
            dir: PathBuf::from("b"),
            count: 3,
        });

        let collected = sink.take();
        assert_eq!(collected.len(), 2);
        assert!(matches!(collected[0], Diagnostic::NoScan { .. }));
        assert!(matches!(collected[1], Diagnostic::AmbiguousScan { count: 3, .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_closure_sink() {
        let seen = RefCell::new(0);
        let sink = |_d: Diagnostic| *seen.borrow_mut() += 1;
        sink.report(Diagnostic::NoScan {
            dir: PathBuf::from("x"),
        });
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn test_display_counts_candidates() {
        let message = Diagnostic::AmbiguousScan {
            dir: PathBuf::from("run1"),
            count: 4,
        }
        .to_string();
        assert!(message.contains("Multiple (4)"));
        assert!(message.contains("run1"));
    }
}
