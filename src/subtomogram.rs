//! Fixed-size crops of a loaded tomogram, with annotations carried along.

use ndarray::s;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::annotation::{self, Annotation, Point};
use crate::error::{DatasetError, Result};
use crate::scan::ScanHandle;
use crate::volume::Volume;

pub const DEFAULT_SAMPLE_SHAPE: [usize; 3] = [64, 256, 256];
pub const DEFAULT_PADS: [usize; 3] = [8, 32, 32];
pub const NEGATIVE_SAMPLE_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone)]
pub struct Subtomogram {
    lower_bounds: [usize; 3],
    volume: Volume,
    annotations: Vec<Annotation>,
}

impl Subtomogram {
    /// Crop `[lower_bounds, lower_bounds + shape)` out of `parent`, clamped to
    /// the parent's extent.
    ///
    /// Annotation points are shifted into the crop's coordinates; points that
    /// fall outside it are dropped, and so are annotations left without points.
    pub fn extract(
        parent: &Volume,
        annotations: &[Annotation],
        lower_bounds: [usize; 3],
        shape: [usize; 3],
    ) -> Self {
        let dims = parent.shape();
        let lo: [usize; 3] = std::array::from_fn(|i| lower_bounds[i].min(dims[i]));
        let hi: [usize; 3] = std::array::from_fn(|i| (lo[i] + shape[i]).min(dims[i]));

        let data = parent
            .data()
            .slice(s![lo[0]..hi[0], lo[1]..hi[1], lo[2]..hi[2]])
            .to_owned();
        let cropped: [usize; 3] = std::array::from_fn(|i| hi[i] - lo[i]);

        let annotations = annotations
            .iter()
            .filter_map(|parent_annotation| {
                let points: Vec<Point> = parent_annotation
                    .points()
                    .iter()
                    .map(|p| offset(p, &lo))
                    .filter(|p| in_bounds(&cropped, p))
                    .collect();
                (!points.is_empty()).then(|| Annotation::new(points, parent_annotation.name()))
            })
            .collect();

        Self {
            lower_bounds: lo,
            volume: Volume::new(data, parent.voxel_spacing),
            annotations,
        }
    }

    /// Where this crop starts, in parent coordinates.
    pub fn lower_bounds(&self) -> [usize; 3] {
        self.lower_bounds
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn shape(&self) -> [usize; 3] {
        self.volume.shape()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn annotation_points(&self) -> Vec<Point> {
        annotation::concat_points(&self.annotations)
    }
}

/// Random positive and negative crops of one tomogram.
pub struct SubtomogramGenerator<'a> {
    volume: &'a Volume,
    annotations: &'a [Annotation],
    sample_shape: [usize; 3],
    pads: [usize; 3],
    rng: StdRng,
}

impl<'a> SubtomogramGenerator<'a> {
    /// Load `handle` (processed) and sample from it.
    pub fn new(handle: &'a mut ScanHandle) -> Result<Self> {
        handle.load()?;
        let handle: &'a ScanHandle = handle;
        let volume = handle
            .volume()
            .ok_or(DatasetError::UnsupportedOperation("scan data is not loaded"))?;
        Ok(Self::from_parts(volume, handle.annotations()))
    }

    pub fn from_parts(volume: &'a Volume, annotations: &'a [Annotation]) -> Self {
        Self {
            volume,
            annotations,
            sample_shape: DEFAULT_SAMPLE_SHAPE,
            pads: DEFAULT_PADS,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn set_sample_shape(&mut self, shape: [usize; 3]) {
        self.sample_shape = shape;
    }

    pub fn set_pads(&mut self, pads: [usize; 3]) {
        self.pads = pads;
    }

    pub fn sample_shape(&self) -> [usize; 3] {
        self.sample_shape
    }

    /// A random crop containing `point`, at least `pads` voxels from the crop
    /// border where the volume allows it. Without a point, one is picked at
    /// random from the annotations.
    pub fn positive_sample(&mut self, point: Option<Point>) -> Result<Subtomogram> {
        let dims = self.checked_dims()?;
        let point = match point {
            Some(point) => point,
            None => self.random_annotation_point()?,
        };

        let mut lower = [0usize; 3];
        for axis in 0..3 {
            let (total, size, pad) = (
                dims[axis] as i64,
                self.sample_shape[axis] as i64,
                self.pads[axis] as i64,
            );
            let pt = point[axis].floor() as i64;
            let max_start = total - size;
            let low = (pt - size + pad + 1).clamp(0, max_start);
            let high = (pt - pad).clamp(0, max_start);
            lower[axis] = if high > low {
                self.rng.gen_range(low..=high) as usize
            } else {
                low as usize
            };
        }

        Ok(Subtomogram::extract(
            self.volume,
            self.annotations,
            lower,
            self.sample_shape,
        ))
    }

    /// A random crop containing no annotation point.
    pub fn negative_sample(&mut self) -> Result<Subtomogram> {
        let dims = self.checked_dims()?;
        let points = annotation::concat_points(self.annotations);

        for _ in 0..NEGATIVE_SAMPLE_ATTEMPTS {
            let lower: [usize; 3] =
                std::array::from_fn(|i| self.rng.gen_range(0..=dims[i] - self.sample_shape[i]));
            let hit = points
                .iter()
                .any(|p| in_bounds(&self.sample_shape, &offset(p, &lower)));
            if !hit {
                return Ok(Subtomogram::extract(
                    self.volume,
                    self.annotations,
                    lower,
                    self.sample_shape,
                ));
            }
        }

        Err(DatasetError::NoNegativeSample {
            attempts: NEGATIVE_SAMPLE_ATTEMPTS,
        })
    }

    fn checked_dims(&self) -> Result<[usize; 3]> {
        let dims = self.volume.shape();
        if (0..3).any(|i| self.sample_shape[i] > dims[i] || self.sample_shape[i] == 0) {
            return Err(DatasetError::InvalidSampleShape {
                sample: self.sample_shape,
                volume: dims,
            });
        }
        Ok(dims)
    }

    fn random_annotation_point(&mut self) -> Result<Point> {
        let candidates: Vec<&Annotation> =
            self.annotations.iter().filter(|a| !a.is_empty()).collect();
        let annotation = candidates
            .choose(&mut self.rng)
            .ok_or(DatasetError::UnsupportedOperation("no annotation points to sample around"))?;
        annotation
            .points()
            .choose(&mut self.rng)
            .copied()
            .ok_or(DatasetError::UnsupportedOperation("no annotation points to sample around"))
    }
}

fn offset(point: &Point, lower: &[usize; 3]) -> Point {
    std::array::from_fn(|i| point[i] - lower[i] as f64)
}

fn in_bounds(shape: &[usize; 3], point: &Point) -> bool {
    point
        .iter()
        .zip(shape)
        .all(|(&p, &s)| p >= 0.0 && p < s as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn volume() -> Volume {
        Volume::new(
            Array3::from_shape_fn((20, 30, 40), |(z, y, x)| (z * 10000 + y * 100 + x) as f32),
            None,
        )
    }

    #[test]
    fn test_extract_offsets_and_filters_points() {
        let parent = volume();
        let annotations = vec![
            Annotation::new(vec![[5.0, 5.0, 5.0], [15.0, 25.0, 35.0]], "inside"),
            Annotation::new(vec![[0.0, 0.0, 0.0]], "outside"),
        ];

        let sub = Subtomogram::extract(&parent, &annotations, [2, 3, 4], [10, 10, 10]);
        assert_eq!(sub.shape(), [10, 10, 10]);
        assert_eq!(sub.volume().data()[[0, 0, 0]], parent.data()[[2, 3, 4]]);
        assert_eq!(sub.annotations().len(), 1);
        assert_eq!(sub.annotations()[0].name(), "inside");
        assert_eq!(sub.annotation_points(), vec![[3.0, 2.0, 1.0]]);
    }

    #[test]
    fn test_extract_clamps_to_parent() {
        let sub = Subtomogram::extract(&volume(), &[], [15, 25, 35], [10, 10, 10]);
        assert_eq!(sub.shape(), [5, 5, 5]);
        assert_eq!(sub.lower_bounds(), [15, 25, 35]);
    }

    #[test]
    fn test_positive_sample_contains_point() {
        let parent = volume();
        let annotations = vec![Annotation::new(vec![[10.0, 15.0, 20.0]], "motor")];
        let mut generator = SubtomogramGenerator::from_parts(&parent, &annotations).with_seed(7);
        generator.set_sample_shape([8, 12, 16]);
        generator.set_pads([2, 2, 2]);

        for _ in 0..20 {
            let sample = generator.positive_sample(None).unwrap();
            assert_eq!(sample.shape(), [8, 12, 16]);
            let points = sample.annotation_points();
            assert_eq!(points.len(), 1);
            let p = points[0];
            assert!(p[0] >= 2.0 && p[0] < 6.0 + 1.0);
        }
    }

    #[test]
    fn test_negative_sample_avoids_points() {
        let parent = volume();
        let annotations = vec![Annotation::new(vec![[1.0, 1.0, 1.0]], "corner")];
        let mut generator = SubtomogramGenerator::from_parts(&parent, &annotations).with_seed(1);
        generator.set_sample_shape([5, 5, 5]);

        for _ in 0..20 {
            let sample = generator.negative_sample().unwrap();
            assert!(sample.annotations().is_empty());
        }
    }

    #[test]
    fn test_negative_sample_impossible() {
        let parent = volume();
        let annotations = vec![Annotation::new(vec![[10.0, 15.0, 20.0]], "center")];
        let mut generator = SubtomogramGenerator::from_parts(&parent, &annotations).with_seed(3);
        generator.set_sample_shape([20, 30, 40]);

        assert!(matches!(
            generator.negative_sample(),
            Err(DatasetError::NoNegativeSample { .. })
        ));
    }

    #[test]
    fn test_sample_larger_than_volume() {
        let parent = volume();
        let mut generator = SubtomogramGenerator::from_parts(&parent, &[]);
        assert!(matches!(
            generator.negative_sample(),
            Err(DatasetError::InvalidSampleShape { .. })
        ));
    }
}
