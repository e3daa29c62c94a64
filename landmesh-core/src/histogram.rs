//! Fixed-width binned histograms with peak detection
//!
//! Used by plane segmentation to find seed planes: a 1D histogram of polygon
//! heights for floors and ceilings, and a 2D histogram of (azimuth, offset)
//! for walls.

use crate::error::{Error, Result};
use itertools::Itertools;
use ndarray::{ArrayD, Dimension, IxDyn};
use serde::{Deserialize, Serialize};

/// One dimension of a histogram: `bins` equal bins over `[min, max]`.
///
/// A circular axis covers `[min, max)` and wraps around, so its first and
/// last bins are neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramAxis {
    pub bins: usize,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub circular: bool,
}

impl HistogramAxis {
    pub fn new(bins: usize, min: f64, max: f64) -> Self {
        Self {
            bins,
            min,
            max,
            circular: false,
        }
    }

    /// An axis over `[min, max)` that wraps around, e.g. an angle
    pub fn circular(bins: usize, min: f64, max: f64) -> Self {
        Self {
            circular: true,
            ..Self::new(bins, min, max)
        }
    }

    /// Width of a single bin
    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.bins as f64
    }

    /// Bin index for `value`; the upper edge belongs to the last bin.
    /// Values on a circular axis are wrapped into range first.
    pub fn bin_of(&self, value: f64) -> Option<usize> {
        if self.bins == 0 || !value.is_finite() {
            return None;
        }
        let value = if self.circular {
            self.wrap(value)
        } else if value < self.min || value > self.max {
            return None;
        } else {
            value
        };
        let index = ((value - self.min) / self.bin_width()) as usize;
        Some(index.min(self.bins - 1))
    }

    /// Center value of bin `index`
    pub fn bin_center(&self, index: usize) -> f64 {
        self.min + (index as f64 + 0.5) * self.bin_width()
    }

    /// Wrap `value` into `[min, max)`
    fn wrap(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        let wrapped = self.min + (value - self.min).rem_euclid(span);
        if wrapped >= self.max {
            self.min
        } else {
            wrapped
        }
    }

    /// Bin reached from `bin` after `offset` steps, if any
    fn step(&self, bin: usize, offset: isize) -> Option<usize> {
        let n = bin as isize + offset;
        if self.circular {
            Some(n.rem_euclid(self.bins as isize) as usize)
        } else {
            (n >= 0 && (n as usize) < self.bins).then_some(n as usize)
        }
    }

    /// Number of bins between `a` and `b`, the short way round on a circular
    /// axis
    fn bin_distance(&self, a: usize, b: usize) -> usize {
        let d = a.abs_diff(b);
        if self.circular {
            d.min(self.bins - d)
        } else {
            d
        }
    }

    fn validate(&self) -> Result<()> {
        if self.bins == 0 {
            return Err(Error::InvalidConfig("Histogram axis needs at least one bin".to_string()));
        }
        if self.circular && self.bins < 3 {
            return Err(Error::InvalidConfig("Circular histogram axis needs at least three bins".to_string()));
        }
        if !(self.min.is_finite() && self.max.is_finite()) || self.max <= self.min {
            return Err(Error::InvalidConfig(format!(
                "Histogram axis range [{}, {}] is empty or not finite",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Parameters for [`Histogram::peaks`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakParams {
    /// Minimum (windowed) count for a bin to qualify as a peak
    pub min_count: f64,
    /// Peaks within this many bins (Chebyshev distance) of a stronger peak
    /// are suppressed. Adjacent bins are always suppressed.
    pub min_separation: usize,
    /// Keep at most this many peaks, strongest first
    pub max_peaks: Option<usize>,
    /// Width of the box window summed before peak detection; 1 disables it
    pub smoothing_window: usize,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            min_count: 1.0,
            min_separation: 1,
            max_peaks: None,
            smoothing_window: 1,
        }
    }
}

impl PeakParams {
    pub fn with_min_count(mut self, min_count: f64) -> Self {
        self.min_count = min_count;
        self
    }

    pub fn with_min_separation(mut self, min_separation: usize) -> Self {
        self.min_separation = min_separation;
        self
    }

    pub fn with_max_peaks(mut self, max_peaks: usize) -> Self {
        self.max_peaks = Some(max_peaks);
        self
    }

    pub fn with_smoothing_window(mut self, window: usize) -> Self {
        self.smoothing_window = window;
        self
    }
}

/// A detected local maximum
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramPeak {
    /// Bin index along each axis
    pub bins: Vec<usize>,
    /// Count-weighted position around the peak bin, one value per axis
    pub position: Vec<f64>,
    /// Peak value after smoothing
    pub count: f64,
}

/// An N-dimensional fixed-width histogram
#[derive(Debug, Clone)]
pub struct Histogram {
    axes: Vec<HistogramAxis>,
    counts: ArrayD<f64>,
    total: usize,
}

impl Histogram {
    /// Create an empty histogram over the given axes
    pub fn new(axes: Vec<HistogramAxis>) -> Result<Self> {
        if axes.is_empty() {
            return Err(Error::InvalidConfig("Histogram needs at least one axis".to_string()));
        }
        for axis in &axes {
            axis.validate()?;
        }
        let shape: Vec<usize> = axes.iter().map(|a| a.bins).collect();
        Ok(Self {
            counts: ArrayD::zeros(IxDyn(&shape)),
            axes,
            total: 0,
        })
    }

    /// Convenience constructor for a one dimensional histogram
    pub fn new_1d(bins: usize, min: f64, max: f64) -> Result<Self> {
        Self::new(vec![HistogramAxis::new(bins, min, max)])
    }

    pub fn axes(&self) -> &[HistogramAxis] {
        &self.axes
    }

    pub fn dims(&self) -> usize {
        self.axes.len()
    }

    /// Number of samples accepted so far
    pub fn total(&self) -> usize {
        self.total
    }

    /// Add one sample. Samples with the wrong arity, non-finite or out of
    /// range coordinates are ignored and `false` is returned.
    pub fn add(&mut self, sample: &[f64]) -> bool {
        if sample.len() != self.axes.len() {
            return false;
        }
        let mut index = Vec::with_capacity(sample.len());
        for (axis, &value) in self.axes.iter().zip(sample) {
            match axis.bin_of(value) {
                Some(bin) => index.push(bin),
                None => return false,
            }
        }
        self.counts[IxDyn(&index)] += 1.0;
        self.total += 1;
        true
    }

    /// Count stored in the given bin, or zero if out of range
    pub fn count_at(&self, bins: &[usize]) -> f64 {
        self.counts.get(IxDyn(bins)).copied().unwrap_or(0.0)
    }

    /// Center of the given bin along each axis
    pub fn bin_center(&self, bins: &[usize]) -> Vec<f64> {
        self.axes
            .iter()
            .zip(bins)
            .map(|(axis, &bin)| axis.bin_center(bin))
            .collect()
    }

    /// Reset all counts
    pub fn clear(&mut self) {
        self.counts.fill(0.0);
        self.total = 0;
    }

    /// Local maxima, strongest first
    pub fn peaks(&self, params: &PeakParams) -> Vec<HistogramPeak> {
        if self.total == 0 {
            return Vec::new();
        }

        let smoothed = self.smoothed(params.smoothing_window);
        let neighbourhood = self.offsets(1, false);

        let mut candidates: Vec<(Vec<usize>, f64)> = smoothed
            .indexed_iter()
            .filter(|(_, &value)| value > 0.0 && value >= params.min_count)
            .filter_map(|(index, &value)| {
                let bins = index.slice().to_vec();
                let is_max = neighbourhood.iter().all(|offset| {
                    self.shifted(&bins, offset)
                        .map_or(true, |n| smoothed[IxDyn(&n)] <= value)
                });
                is_max.then_some((bins, value))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let radius = params.min_separation.max(1);
        let mut peaks: Vec<HistogramPeak> = Vec::new();
        for (bins, value) in candidates {
            if let Some(max) = params.max_peaks {
                if peaks.len() >= max {
                    break;
                }
            }
            let suppressed = peaks
                .iter()
                .any(|p| self.chebyshev(&p.bins, &bins) <= radius);
            if suppressed {
                continue;
            }
            let position = self.refined_position(&bins, &neighbourhood);
            peaks.push(HistogramPeak {
                bins,
                position,
                count: value,
            });
        }
        peaks
    }

    /// Counts summed over a centered box window
    fn smoothed(&self, window: usize) -> ArrayD<f64> {
        if window <= 1 {
            return self.counts.clone();
        }
        let offsets = self.offsets((window / 2) as isize, true);
        let mut out = ArrayD::zeros(self.counts.raw_dim());
        for (index, slot) in out.indexed_iter_mut() {
            let bins = index.slice().to_vec();
            *slot = offsets
                .iter()
                .filter_map(|offset| self.shifted(&bins, offset))
                .map(|n| self.counts[IxDyn(&n)])
                .sum();
        }
        out
    }

    /// All offsets in `[-half, half]^N`
    fn offsets(&self, half: isize, include_center: bool) -> Vec<Vec<isize>> {
        (0..self.dims())
            .map(|_| -half..=half)
            .multi_cartesian_product()
            .filter(|o| include_center || o.iter().any(|&d| d != 0))
            .collect()
    }

    fn shifted(&self, bins: &[usize], offset: &[isize]) -> Option<Vec<usize>> {
        bins.iter()
            .zip(offset)
            .zip(&self.axes)
            .map(|((&b, &d), axis)| axis.step(b, d))
            .collect()
    }

    /// Count-weighted mean position over the neighbourhood of `bins`.
    /// Neighbours are placed relative to the peak bin, so a peak straddling
    /// the seam of a circular axis is refined across it.
    fn refined_position(&self, bins: &[usize], neighbourhood: &[Vec<isize>]) -> Vec<f64> {
        let center = self.bin_center(bins);
        let mut weight = self.count_at(bins);
        let mut sum: Vec<f64> = center.iter().map(|c| c * weight).collect();

        for offset in neighbourhood {
            if let Some(n) = self.shifted(bins, offset) {
                let w = self.counts[IxDyn(&n)];
                if w > 0.0 {
                    for (k, s) in sum.iter_mut().enumerate() {
                        *s += (center[k] + offset[k] as f64 * self.axes[k].bin_width()) * w;
                    }
                    weight += w;
                }
            }
        }

        if weight <= 0.0 {
            return center;
        }
        sum.into_iter()
            .zip(&self.axes)
            .map(|(s, axis)| {
                let value = s / weight;
                if axis.circular {
                    axis.wrap(value)
                } else {
                    value
                }
            })
            .collect()
    }

    fn chebyshev(&self, a: &[usize], b: &[usize]) -> usize {
        a.iter()
            .zip(b)
            .zip(&self.axes)
            .map(|((&x, &y), axis)| axis.bin_distance(x, y))
            .max()
            .unwrap_or(0)
    }
}
