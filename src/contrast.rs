use ndarray::Array3;
use rayon::prelude::*;

pub(crate) struct Contrast;

impl Contrast {
    /// Lower and upper percentiles used for contrast stretching.
    pub(crate) const STRETCH_PERCENTILES: (f64, f64) = (2.0, 98.0);

    /// Percentiles `qs` (0-100) of the non-NaN values, interpolating linearly
    /// between order statistics. `None` for an array with no finite values.
    pub(crate) fn percentiles<const N: usize>(
        data: &Array3<f32>,
        qs: [f64; N],
    ) -> Option<[f32; N]> {
        let mut values: Vec<f32> = data.par_iter().copied().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return None;
        }
        values.par_sort_unstable_by(f32::total_cmp);

        let last = (values.len() - 1) as f64;
        Some(qs.map(|q| {
            let rank = (q.clamp(0.0, 100.0) / 100.0) * last;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = (rank - lo as f64) as f32;
            values[lo] + (values[hi] - values[lo]) * frac
        }))
    }

    /// Clip to `in_range` and map it linearly onto the float intensity range:
    /// `[0, 1]` when the window starts at or above zero, `[-1, 1]` otherwise.
    /// An empty window flattens every value to the bottom of that range.
    pub(crate) fn rescale_intensity(data: &mut Array3<f32>, in_range: (f32, f32)) {
        let (imin, imax) = in_range;
        let (omin, omax) = if imin >= 0.0 { (0.0, 1.0) } else { (-1.0, 1.0) };
        let width = imax - imin;

        if width > 0.0 {
            data.par_mapv_inplace(|v| (v.clamp(imin, imax) - imin) / width * (omax - omin) + omin);
        } else {
            data.par_mapv_inplace(|v| if v.is_nan() { v } else { omin });
        }
    }

    /// Stretch contrast between the 2nd and 98th percentiles.
    ///
    /// Returns the window used, or `None` when the data is constant (or all
    /// NaN) and was left untouched. A window that collapses to one value on
    /// non-constant data still clips, which flattens the outliers.
    pub(crate) fn stretch(data: &mut Array3<f32>) -> Option<(f32, f32)> {
        let (low, high) = Self::STRETCH_PERCENTILES;
        let [min, p_low, p_high, max] = Self::percentiles(data, [0.0, low, high, 100.0])?;
        if max <= min {
            return None;
        }
        Self::rescale_intensity(data, (p_low, p_high));
        Some((p_low, p_high))
    }
}
