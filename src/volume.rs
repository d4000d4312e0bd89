use crate::enums::Orientation;
use crate::mrc::VoxelSpacing;

use image::GrayImage;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;
use rayon::prelude::*;

/// A decoded volume in (z, y, x) order.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub data: Array3<f32>,
    pub voxel_spacing: Option<VoxelSpacing>,
}

impl Volume {
    pub fn new(data: Array3<f32>, voxel_spacing: Option<VoxelSpacing>) -> Self {
        Self {
            data,
            voxel_spacing,
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn shape(&self) -> [usize; 3] {
        let (d, h, w) = self.dim();
        [d, h, w]
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    pub fn into_data(self) -> Array3<f32> {
        self.data
    }

    #[inline]
    fn normalize_to_u8(value: f32, min: f32, range: f32) -> u8 {
        if range <= 0.0 {
            return 0;
        }
        (((value - min) / range) * 255.0).clamp(0.0, 255.0) as u8
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(slice)
    }

    /// An 8-bit preview of one slice, stretched between the slice's own
    /// minimum and maximum.
    pub fn get_image_from_axis(&self, index: usize, orientation: Orientation) -> Option<GrayImage> {
        let slice = self.get_slice_from_axis(index, orientation)?;
        Self::slice_to_image(&slice)
    }

    /// Preview of the middle slice along `orientation`.
    pub fn center_image(&self, orientation: Orientation) -> Option<GrayImage> {
        let (d, h, w) = self.dim();
        let len = match orientation {
            Orientation::Axial => d,
            Orientation::Coronal => h,
            Orientation::Sagittal => w,
        };
        self.get_image_from_axis(len / 2, orientation)
    }

    fn slice_to_image(slice: &ArrayView2<'_, f32>) -> Option<GrayImage> {
        let (height, width) = slice.dim();
        let (min, max) = slice
            .iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v, min, range))
            .collect();
        GrayImage::from_raw(width as u32, height as u32, pixel_data)
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let dim = self.data.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }
}
