use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// Container formats a scan can be decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanFormat {
    /// MRC2014 volume (`.mrc`)
    Mrc,
    /// Reconstructed tomogram, MRC layout with a different suffix (`.rec`)
    Rec,
    /// Pre-decoded NumPy array (`.npy`)
    Npy,
}

impl ScanFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "mrc" => Some(ScanFormat::Mrc),
            "rec" => Some(ScanFormat::Rec),
            "npy" => Some(ScanFormat::Npy),
            _ => None,
        }
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            ScanFormat::Mrc => ".mrc",
            ScanFormat::Rec => ".rec",
            ScanFormat::Npy => ".npy",
        }
    }

    /// Whether the file carries an MRC header (mode, voxel spacing).
    pub const fn is_mrc(&self) -> bool {
        matches!(self, ScanFormat::Mrc | ScanFormat::Rec)
    }
}

/// Point-list formats an annotation can be parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationFormat {
    /// IMOD binary model (`.mod`)
    Mod,
    /// Newline-delimited JSON as published by the CryoET Data Portal (`.ndjson`)
    Ndjson,
}

impl AnnotationFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "mod" => Some(AnnotationFormat::Mod),
            "ndjson" => Some(AnnotationFormat::Ndjson),
            _ => None,
        }
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            AnnotationFormat::Mod => ".mod",
            AnnotationFormat::Ndjson => ".ndjson",
        }
    }
}

/// How a [`Pattern`](crate::pattern::Pattern) is anchored against a name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Anchored at the start of the name only
    #[default]
    Prefix,
    /// Anchored at both ends
    Full,
    /// Anywhere in the name
    Search,
}
