//! Pairing scans with their annotation files, one run directory at a time.
//!
//! Each candidate directory is expected to hold one scan. Directories that do
//! not fit that expectation are skipped rather than failing the batch.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::annotation::Annotation;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::pattern::Pattern;
use crate::scan::ScanHandle;
use crate::walker::{FileWalker, SetMatch};

pub struct PairFinder<'s> {
    walker: FileWalker<'s>,
}

impl<'s> PairFinder<'s> {
    pub fn new(sink: &'s dyn DiagnosticSink) -> Self {
        Self {
            walker: FileWalker::new(sink),
        }
    }

    pub fn with_walker(walker: FileWalker<'s>) -> Self {
        Self { walker }
    }

    pub fn walker(&self) -> &FileWalker<'s> {
        &self.walker
    }

    /// Unloaded handles for every directory where the scan pattern and each
    /// annotation pattern match exactly once.
    ///
    /// Annotation `i` is named `annotation_names[i]`, falling back to an empty
    /// name when fewer names than patterns are given. An annotation file that
    /// fails to parse is reported and left out; its scan is still returned.
    pub fn find_paired(
        &self,
        directories: &[PathBuf],
        scan_pattern: &Pattern,
        annotation_patterns: &[Pattern],
        annotation_names: &[String],
    ) -> Vec<ScanHandle> {
        let patterns = Self::all_patterns(scan_pattern, annotation_patterns);
        let mut handles = Vec::new();

        for dir in directories {
            let Some(matches) = self.complete_match(dir, &patterns) else {
                continue;
            };
            let mut matches = matches.into_iter();
            let Some(scan_path) = matches.next() else {
                continue;
            };

            let annotations = matches
                .enumerate()
                .filter_map(|(i, path)| {
                    let name = annotation_names.get(i).map(String::as_str).unwrap_or("");
                    self.parse_annotation(path, name)
                })
                .collect();
            handles.push(ScanHandle::with_annotations(scan_path, annotations));
        }

        info!(
            directories = directories.len(),
            found = handles.len(),
            "Paired scans with annotations"
        );
        handles
    }

    /// Unloaded, annotation-free handles for every directory that is not fully
    /// annotated and holds exactly one scan.
    ///
    /// Directories with no scan or several candidate scans are reported to the
    /// sink and skipped.
    pub fn find_unpaired(
        &self,
        directories: &[PathBuf],
        scan_pattern: &Pattern,
        annotation_patterns: &[Pattern],
    ) -> Vec<ScanHandle> {
        let patterns = Self::all_patterns(scan_pattern, annotation_patterns);
        let mut handles = Vec::new();

        for dir in directories {
            if self.walker.find_one_each(dir, &patterns).is_complete() {
                debug!(dir = %dir.display(), "Directory is annotated");
                continue;
            }

            let mut candidates = self.walker.find_all(dir, scan_pattern);
            match candidates.len() {
                0 => self.walker.sink().report(Diagnostic::NoScan { dir: dir.clone() }),
                1 => handles.extend(candidates.pop().map(ScanHandle::new)),
                count => self.walker.sink().report(Diagnostic::AmbiguousScan {
                    dir: dir.clone(),
                    count,
                }),
            }
        }

        info!(
            directories = directories.len(),
            found = handles.len(),
            "Collected unannotated scans"
        );
        handles
    }

    fn all_patterns(scan_pattern: &Pattern, annotation_patterns: &[Pattern]) -> Vec<Pattern> {
        std::iter::once(scan_pattern)
            .chain(annotation_patterns)
            .cloned()
            .collect()
    }

    fn complete_match(&self, dir: &Path, patterns: &[Pattern]) -> Option<Vec<PathBuf>> {
        match self.walker.find_one_each(dir, patterns) {
            SetMatch::Ambiguous {
                pattern_index,
                first,
                second,
            } => {
                debug!(
                    dir = %dir.display(),
                    pattern = %patterns[pattern_index],
                    first = %first.display(),
                    second = %second.display(),
                    "Skipping directory with ambiguous matches"
                );
                None
            }
            matched => {
                let complete = matched.complete();
                if complete.is_none() {
                    debug!(dir = %dir.display(), "Skipping directory with missing matches");
                }
                complete
            }
        }
    }

    fn parse_annotation(&self, path: PathBuf, name: &str) -> Option<Annotation> {
        match Annotation::from_file(&path, name) {
            Ok(annotation) => Some(annotation),
            Err(err) => {
                self.walker.sink().report(Diagnostic::AnnotationParseFailed {
                    path,
                    error: err.to_string(),
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::imod::fixtures::ModelBuilder;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    fn model() -> Vec<u8> {
        ModelBuilder::new(10, 10, 10)
            .object()
            .contour(&[[1.0, 2.0, 3.0]])
            .finish()
    }

    fn patterns() -> (Pattern, Vec<Pattern>, Vec<String>) {
        (
            Pattern::new(r".*\.rec$").unwrap(),
            vec![Pattern::case_insensitive(r"^fm\.mod$").unwrap()],
            vec!["Flagellar Motor".to_string()],
        )
    }

    #[test]
    fn test_find_paired() {
        let root = TempDir::new().unwrap();
        let run1 = root.path().join("run1");
        let run2 = root.path().join("run2");
        let run3 = root.path().join("run3");
        write(&run1, "tomo1.rec", b"");
        write(&run1, "sub/FM.mod", &model());
        write(&run2, "tomo2.rec", b"");
        write(&run3, "tomo3.rec", b"");
        write(&run3, "other.rec", b"");
        write(&run3, "fm.mod", &model());

        let sink = CollectingSink::new();
        let finder = PairFinder::new(&sink);
        let (scan, annotations, names) = patterns();
        let handles = finder.find_paired(&[run1.clone(), run2, run3], &scan, &annotations, &names);

        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].location(), run1.join("tomo1.rec"));
        assert_eq!(handles[0].annotations().len(), 1);
        assert_eq!(handles[0].annotations()[0].name(), "Flagellar Motor");
        assert!(!handles[0].is_loaded());
        // Ambiguity and missing annotations are silent here.
        assert!(sink.is_empty());
    }

    #[test]
    fn test_find_paired_drops_broken_annotation_only() {
        let root = TempDir::new().unwrap();
        let run = root.path().join("run");
        write(&run, "tomo.rec", b"");
        write(&run, "FM.mod", b"garbage");

        let sink = CollectingSink::new();
        let finder = PairFinder::new(&sink);
        let (scan, annotations, names) = patterns();
        let handles = finder.find_paired(&[run], &scan, &annotations, &names);

        assert_eq!(handles.len(), 1);
        assert!(handles[0].annotations().is_empty());
        assert!(matches!(
            sink.take()[0],
            Diagnostic::AnnotationParseFailed { .. }
        ));
    }

    #[test]
    fn test_find_unpaired() {
        let root = TempDir::new().unwrap();
        let annotated = root.path().join("annotated");
        let clean = root.path().join("clean");
        let stray = root.path().join("stray");
        let empty = root.path().join("empty");
        let crowded = root.path().join("crowded");
        write(&annotated, "a.rec", b"");
        write(&annotated, "FM.mod", &model());
        write(&clean, "b.rec", b"");
        // Two annotation files: fails the strict check, falls back to one scan.
        write(&stray, "c.rec", b"");
        write(&stray, "FM.mod", &model());
        write(&stray, "old/fm.mod", &model());
        write(&empty, "notes.txt", b"");
        write(&crowded, "d.rec", b"");
        write(&crowded, "e.rec", b"");

        let sink = CollectingSink::new();
        let finder = PairFinder::new(&sink);
        let (scan, annotations, _) = patterns();
        let handles = finder.find_unpaired(
            &[annotated, clean.clone(), stray.clone(), empty.clone(), crowded.clone()],
            &scan,
            &annotations,
        );

        let locations: Vec<_> = handles.iter().map(|h| h.location().to_path_buf()).collect();
        assert_eq!(locations, vec![clean.join("b.rec"), stray.join("c.rec")]);
        assert!(handles.iter().all(|h| h.annotations().is_empty()));

        let diagnostics = sink.take();
        assert_eq!(
            diagnostics,
            vec![
                Diagnostic::NoScan { dir: empty },
                Diagnostic::AmbiguousScan {
                    dir: crowded,
                    count: 2
                },
            ]
        );
    }
}
