//! JSON description of where tomograms live and how to recognize them.
//!
//! ```json
//! {
//!   "sources": [{
//!     "name": "legionella",
//!     "root": "/data/legionella",
//!     "directory_pattern": "dg\\d{4}.*",
//!     "scan_pattern": ".*SIRT_1k\\.rec$",
//!     "annotations": [{ "pattern": "^FM\\.mod$", "name": "Flagellar Motor" }],
//!     "private": false
//!   }],
//!   "negative_dirs": ["/data/negatives"]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::diagnostics::DiagnosticSink;
use crate::enums::MatchMode;
use crate::error::{DatasetError, Result};
use crate::pairing::PairFinder;
use crate::pattern::Pattern;
use crate::registry::DatasetRegistry;
use crate::scan::ScanHandle;
use crate::walker::FileWalker;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    /// Directories whose files are all known to be free of the target.
    #[serde(default)]
    pub negative_dirs: Vec<PathBuf>,
}

/// One search root and the patterns that pick runs, scans and annotations
/// out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub root: PathBuf,
    pub directory_pattern: PatternSpec,
    pub scan_pattern: PatternSpec,
    #[serde(default)]
    pub annotations: Vec<AnnotationSpec>,
    #[serde(default)]
    pub private: bool,
}

/// A bare regex string, or a regex with explicit options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSpec {
    Plain(String),
    Detailed {
        pattern: String,
        #[serde(default)]
        case_insensitive: bool,
        #[serde(default)]
        mode: MatchMode,
    },
}

impl PatternSpec {
    pub fn compile(&self) -> Result<Pattern> {
        match self {
            PatternSpec::Plain(source) => Pattern::new(source),
            PatternSpec::Detailed {
                pattern,
                case_insensitive,
                mode,
            } => Pattern::with_options(pattern, *mode, *case_insensitive),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSpec {
    pub pattern: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub mode: MatchMode,
}

impl AnnotationSpec {
    pub fn compile(&self) -> Result<Pattern> {
        Pattern::with_options(&self.pattern, self.mode, self.case_insensitive)
    }
}

/// A source with its patterns compiled.
struct CompiledSource<'m> {
    spec: &'m SourceSpec,
    directory_pattern: Pattern,
    scan_pattern: Pattern,
    annotation_patterns: Vec<Pattern>,
    annotation_names: Vec<String>,
}

impl<'m> CompiledSource<'m> {
    fn new(spec: &'m SourceSpec) -> Result<Self> {
        Ok(Self {
            spec,
            directory_pattern: spec.directory_pattern.compile()?,
            scan_pattern: spec.scan_pattern.compile()?,
            annotation_patterns: spec
                .annotations
                .iter()
                .map(AnnotationSpec::compile)
                .collect::<Result<_>>()?,
            annotation_names: spec.annotations.iter().map(|a| a.name.clone()).collect(),
        })
    }

    fn directories(&self, walker: &FileWalker<'_>) -> Vec<PathBuf> {
        walker.find_dirs(&self.spec.root, &self.directory_pattern)
    }
}

impl FromStr for Manifest {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        fs::read_to_string(path)?.parse()
    }

    /// Check every pattern without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        self.sources
            .iter()
            .try_for_each(|spec| CompiledSource::new(spec).map(drop))
    }

    /// Every scan paired with all of its source's annotation files, deduplicated
    /// by label. Private sources are skipped unless `include_private`.
    pub fn discover_annotated(
        &self,
        include_private: bool,
        sink: &dyn DiagnosticSink,
    ) -> Result<DatasetRegistry> {
        let finder = PairFinder::new(sink);
        let mut registry = DatasetRegistry::new();

        for source in self.sources(include_private)? {
            let directories = source.directories(finder.walker());
            let handles = finder.find_paired(
                &directories,
                &source.scan_pattern,
                &source.annotation_patterns,
                &source.annotation_names,
            );
            info!(source = %source.spec.name, found = handles.len(), "Annotated source searched");
            registry.extend(handles, source.spec.private);
        }

        Ok(registry)
    }

    /// Scans without a complete annotation set, plus every file directly inside
    /// the negative directories, deduplicated by label.
    pub fn discover_unannotated(
        &self,
        include_private: bool,
        sink: &dyn DiagnosticSink,
    ) -> Result<DatasetRegistry> {
        let finder = PairFinder::new(sink);
        let mut registry = DatasetRegistry::new();

        for source in self.sources(include_private)? {
            let directories = source.directories(finder.walker());
            let handles = finder.find_unpaired(
                &directories,
                &source.scan_pattern,
                &source.annotation_patterns,
            );
            info!(source = %source.spec.name, found = handles.len(), "Unannotated source searched");
            registry.extend(handles, source.spec.private);
        }

        for dir in &self.negative_dirs {
            let files = finder.walker().list_files(dir);
            info!(dir = %dir.display(), found = files.len(), "Negative directory listed");
            registry.extend(files.into_iter().map(ScanHandle::new), false);
        }

        Ok(registry)
    }

    fn sources(&self, include_private: bool) -> Result<Vec<CompiledSource<'_>>> {
        self.sources
            .iter()
            .filter(|spec| include_private || !spec.private)
            .map(CompiledSource::new)
            .collect()
    }
}
