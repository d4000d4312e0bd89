//! Lazy, file-backed tomogram handles.
//!
//! A [`ScanHandle`] starts `Unloaded`: it knows its path and annotations and
//! nothing else. The voxel data is decoded only by an explicit [`load`],
//! [`get_data`], [`process`] or [`reload`]. Header metadata (shape, mode,
//! voxel spacing) is read on demand from the file header, which is far cheaper
//! than a full decode, and cached.
//!
//! Arrays returned by the accessors borrow the handle, so a later `process`
//! or `reload` cannot silently invalidate a reference the caller still holds.
//!
//! [`load`]: ScanHandle::load
//! [`get_data`]: ScanHandle::get_data
//! [`process`]: ScanHandle::process
//! [`reload`]: ScanHandle::reload

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use ndarray::Array3;
use tracing::debug;

use crate::annotation::{self, Annotation, Point};
use crate::contrast::Contrast;
use crate::enums::{Orientation, ScanFormat};
use crate::error::{DatasetError, Result};
use crate::mrc::VoxelSpacing;
use crate::scan_loader::{ScanHeader, ScanLoader};
use crate::volume::Volume;

#[derive(Debug, Clone)]
pub struct ScanHandle {
    path: PathBuf,
    annotations: Vec<Annotation>,
    volume: Option<Volume>,
    header: OnceCell<ScanHeader>,
}

impl ScanHandle {
    /// An unloaded handle with no annotations. Does no I/O.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_annotations(path, Vec::new())
    }

    /// An unloaded handle. Does no I/O.
    pub fn with_annotations(path: impl Into<PathBuf>, annotations: Vec<Annotation>) -> Self {
        Self {
            path: path.into(),
            annotations,
            volume: None,
            header: OnceCell::new(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.path
    }

    /// Deduplication key: the file name without its extension.
    pub fn label(&self) -> String {
        label_of(&self.path)
    }

    pub fn format(&self) -> Result<ScanFormat> {
        ScanLoader::format_of(&self.path)
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn add_annotation(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    /// Swap in a new annotation list, returning the old one.
    pub(crate) fn replace_annotations(&mut self, annotations: Vec<Annotation>) -> Vec<Annotation> {
        std::mem::replace(&mut self.annotations, annotations)
    }

    /// Points of one annotation, or of all annotations concatenated in
    /// attachment order when `index` is `None`.
    pub fn annotation_points(&self, index: Option<usize>) -> Result<Vec<Point>> {
        match index {
            Some(index) => self
                .annotations
                .get(index)
                .map(|a| a.points().to_vec())
                .ok_or(DatasetError::AnnotationIndex {
                    index,
                    len: self.annotations.len(),
                }),
            None => Ok(annotation::concat_points(&self.annotations)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.volume.is_some()
    }

    /// Header metadata, read from the file once and cached.
    pub fn header(&self) -> Result<&ScanHeader> {
        if let Some(header) = self.header.get() {
            return Ok(header);
        }
        let header = ScanLoader::read_header(&self.path)?;
        Ok(self.header.get_or_init(|| header))
    }

    /// Dimensions in (z, y, x): from the array when loaded, from the header
    /// otherwise. When the header cannot be read, the attached annotations'
    /// declared parent shape is used instead if there is one.
    pub fn shape(&self) -> Result<[usize; 3]> {
        if let Some(volume) = &self.volume {
            return Ok(volume.shape());
        }
        match self.header() {
            Ok(header) => Ok(header.shape),
            Err(err) => self.shape_from_annotations().map_err(|_| err),
        }
    }

    pub fn voxel_spacing(&self) -> Result<Option<VoxelSpacing>> {
        Ok(self.header()?.voxel_spacing)
    }

    /// Decode and contrast-stretch the data. No-op when already loaded.
    pub fn load(&mut self) -> Result<&Array3<f32>> {
        self.load_with(true)
    }

    /// Decode the data, stretching contrast only if `process` is set. No-op
    /// when already loaded.
    pub fn load_with(&mut self, process: bool) -> Result<&Array3<f32>> {
        if self.volume.is_none() {
            self.decode()?;
            if process {
                self.stretch();
            }
        }
        self.loaded_data()
    }

    /// Same as [`load`](Self::load).
    pub fn get_data(&mut self) -> Result<&Array3<f32>> {
        self.load()
    }

    /// The data if loaded, without triggering a load.
    pub fn data(&self) -> Option<&Array3<f32>> {
        self.volume.as_ref().map(Volume::data)
    }

    pub fn volume(&self) -> Option<&Volume> {
        self.volume.as_ref()
    }

    /// Contrast-stretch the loaded data in place between its 2nd and 98th
    /// percentiles. Loads unprocessed data first if needed.
    ///
    /// Every call compresses the distribution further, so call it at most once
    /// per load.
    pub fn process(&mut self) -> Result<&Array3<f32>> {
        if self.volume.is_none() {
            self.decode()?;
        }
        self.stretch();
        self.loaded_data()
    }

    /// Decode again from disk, discarding any processing.
    pub fn reload(&mut self) -> Result<&Array3<f32>> {
        self.decode()?;
        self.loaded_data()
    }

    /// Write a PNG of the middle slice along `orientation`, loading raw data
    /// first if needed. The handle stays loaded afterwards.
    pub fn save_preview(&mut self, path: impl AsRef<Path>, orientation: Orientation) -> Result<()> {
        let path = path.as_ref();
        self.load_with(false)?;
        let image = self
            .volume
            .as_ref()
            .and_then(|volume| volume.center_image(orientation))
            .ok_or(DatasetError::UnsupportedOperation("scan has no voxels to preview"))?;
        image.save(path)?;
        debug!(scan = %self.path.display(), preview = %path.display(), "Saved preview");
        Ok(())
    }

    /// Drop the decoded data, going back to the unloaded state.
    pub fn invalidate(&mut self) {
        if self.volume.take().is_some() {
            debug!(path = %self.path.display(), "Dropped scan data");
        }
    }

    /// Infer the shape from attached annotations without touching the scan.
    pub fn shape_from_annotations(&self) -> Result<[usize; 3]> {
        let mut shapes = self
            .annotations
            .iter()
            .filter_map(|a| a.infer_parent_shape().ok());

        let first = shapes.next().ok_or(DatasetError::NoShapeSource)?;
        for other in shapes {
            if other != first {
                return Err(DatasetError::InconsistentShape {
                    first,
                    second: other,
                });
            }
        }
        Ok(first)
    }

    fn decode(&mut self) -> Result<()> {
        let (header, volume) = ScanLoader::read_volume(&self.path)?;
        self.header = OnceCell::from(header);
        self.volume = Some(volume);
        Ok(())
    }

    fn stretch(&mut self) {
        if let Some(volume) = self.volume.as_mut() {
            match Contrast::stretch(volume.data_mut()) {
                Some((low, high)) => {
                    debug!(path = %self.path.display(), low, high, "Stretched contrast")
                }
                None => debug!(
                    path = %self.path.display(),
                    "Scan is constant, contrast left unchanged"
                ),
            }
        }
    }

    fn loaded_data(&self) -> Result<&Array3<f32>> {
        self.data()
            .ok_or(DatasetError::UnsupportedOperation("scan data is not loaded"))
    }
}

pub(crate) fn label_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
