//! Name matching for files and directories.
//!
//! A [`Pattern`] is matched against a single basename, never a full path.
//! Anchoring is explicit through [`MatchMode`]; the default, `Prefix`, anchors
//! only at the start of the name.

use std::fmt;
use std::path::Path;

use regex::{Regex, RegexBuilder};

use crate::enums::MatchMode;
use crate::error::Result;

#[derive(Clone)]
pub struct Pattern {
    source: String,
    mode: MatchMode,
    case_insensitive: bool,
    regex: Regex,
}

impl Pattern {
    /// Compile a case-sensitive pattern anchored at the start of the name.
    pub fn new(source: &str) -> Result<Self> {
        Self::with_options(source, MatchMode::Prefix, false)
    }

    pub fn case_insensitive(source: &str) -> Result<Self> {
        Self::with_options(source, MatchMode::Prefix, true)
    }

    pub fn with_options(source: &str, mode: MatchMode, case_insensitive: bool) -> Result<Self> {
        let anchored = match mode {
            MatchMode::Prefix => format!("^(?:{source})"),
            MatchMode::Full => format!("^(?:{source})$"),
            MatchMode::Search => source.to_string(),
        };
        let regex = RegexBuilder::new(&anchored)
            .case_insensitive(case_insensitive)
            .build()?;

        Ok(Self {
            source: source.to_string(),
            mode,
            case_insensitive,
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    #[inline]
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// Match against the final component of `path`. Non UTF-8 names never match.
    pub fn matches_path(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.is_match(name))
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("source", &self.source)
            .field("mode", &self.mode)
            .field("case_insensitive", &self.case_insensitive)
            .finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
