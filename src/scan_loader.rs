use crate::enums::ScanFormat;
use crate::error::{DatasetError, Result};
use crate::mrc::{self, VoxelSpacing};
use crate::npy;
use crate::volume::Volume;

use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Metadata available without decoding the voxel data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanHeader {
    pub format: ScanFormat,
    /// (z, y, x)
    pub shape: [usize; 3],
    /// MRC data mode; `None` for formats without one.
    pub mode: Option<i32>,
    pub voxel_spacing: Option<VoxelSpacing>,
}

pub struct ScanLoader;

impl ScanLoader {
    /// Resolve the container format from the file extension.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::UnsupportedFormat`] for anything other than
    /// `.mrc`, `.rec` or `.npy`
    pub fn format_of(path: &Path) -> Result<ScanFormat> {
        ScanFormat::from_path(path).ok_or_else(|| {
            DatasetError::unsupported(path, "tomogram file must be of type .mrc, .rec, or .npy")
        })
    }

    /// Read only the header of a scan
    pub fn read_header(path: impl AsRef<Path>) -> Result<ScanHeader> {
        let path = path.as_ref();
        let format = Self::format_of(path)?;
        match format {
            ScanFormat::Mrc | ScanFormat::Rec => {
                let header = mrc::read_header(path)?;
                Ok(Self::mrc_scan_header(format, &header))
            }
            ScanFormat::Npy => {
                let header = npy::read_header(path)?;
                Ok(ScanHeader {
                    format,
                    shape: header.shape,
                    mode: None,
                    voxel_spacing: None,
                })
            }
        }
    }

    /// Decode the whole scan
    ///
    /// # Errors
    ///
    /// Returns error if the extension is not recognized or the file cannot be
    /// decoded
    pub fn read_volume(path: impl AsRef<Path>) -> Result<(ScanHeader, Volume)> {
        let path = path.as_ref();
        let format = Self::format_of(path)?;
        let started = Instant::now();

        let (header, data) = match format {
            ScanFormat::Mrc | ScanFormat::Rec => {
                let (header, data) = mrc::read_volume(path)?;
                (Self::mrc_scan_header(format, &header), data)
            }
            ScanFormat::Npy => {
                let (header, data) = npy::read_volume(path)?;
                let header = ScanHeader {
                    format,
                    shape: header.shape,
                    mode: None,
                    voxel_spacing: None,
                };
                (header, data)
            }
        };

        debug!(
            path = %path.display(),
            shape = ?header.shape,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Decoded scan"
        );
        Ok((header, Volume::new(data, header.voxel_spacing)))
    }

    fn mrc_scan_header(format: ScanFormat, header: &mrc::MrcHeader) -> ScanHeader {
        ScanHeader {
            format,
            shape: header.shape(),
            mode: Some(header.mode),
            voxel_spacing: header.voxel_spacing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrc::fixtures::mrc_bytes;
    use crate::npy::fixtures::npy_bytes;
    use tempfile::TempDir;

    #[test]
    fn test_header_matches_full_decode() {
        let dir = TempDir::new().unwrap();
        for name in ["a.mrc", "b.rec"] {
            let path = dir.path().join(name);
            std::fs::write(&path, mrc_bytes([3, 4, 5], &[1.0; 60], 2.5)).unwrap();

            let header = ScanLoader::read_header(&path).unwrap();
            let (full_header, volume) = ScanLoader::read_volume(&path).unwrap();
            assert_eq!(header, full_header);
            assert_eq!(volume.shape(), header.shape);
            assert_eq!(header.mode, Some(2));
            assert_eq!(volume.voxel_spacing.unwrap().isotropic(), Some(2.5));
        }
    }

    #[test]
    fn test_npy_has_no_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.npy");
        std::fs::write(&path, npy_bytes([1, 2, 2], &[0.0, 1.0, 2.0, 3.0])).unwrap();

        let header = ScanLoader::read_header(&path).unwrap();
        assert_eq!(header.format, ScanFormat::Npy);
        assert_eq!(header.mode, None);
        assert_eq!(header.shape, [1, 2, 2]);
    }

    #[test]
    fn test_unknown_extension() {
        let err = ScanLoader::read_header("scan.tif").unwrap_err();
        assert!(matches!(err, DatasetError::UnsupportedFormat { .. }));
    }
}
