//! Histogram
//!
//! Per-feature histogram calculations for finding optimal splits.
//! Histograms store aggregated gradient and hessian statistics for each bin.
use serde::{Deserialize, Serialize};

/// Aggregate statistics of one bin.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bin {
    /// Number of samples whose binned value falls in this bin.
    pub count: u32,
    /// Sum of the gradients of those samples.
    pub sum_gradients: f32,
    /// Sum of the hessians of those samples.
    pub sum_hessians: f32,
}

/// Hessian source for histogram construction.
///
/// A length-1 hessian array from the caller broadcasts a single constant to
/// every sample; the builder then derives per-bin hessian sums from the bin
/// counts instead of reading a per-sample array.
#[derive(Debug, Clone, Copy)]
pub enum Hessians<'a> {
    /// One value shared by all samples.
    Constant(f32),
    /// One value per sample, aligned with the gradient array.
    PerSample(&'a [f32]),
}

/// Histogram of one feature over one node's sample set: an ordered array of
/// `n_bins` bins for bin values `0..n_bins`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeatureHistogram {
    /// The histogram data (bins).
    pub bins: Vec<Bin>,
}

impl FeatureHistogram {
    /// Create an empty histogram with `n_bins` zeroed bins.
    pub fn empty(n_bins: usize) -> Self {
        FeatureHistogram {
            bins: vec![Bin::default(); n_bins],
        }
    }

    /// Build a histogram from scratch over a sample-index set.
    ///
    /// * `feature` - one byte per sample, the binned feature column.
    /// * `sample_indices` - rows belonging to the node being evaluated.
    /// * `gradients` - full gradient array, indexed by sample id.
    /// * `hessians` - per-sample hessians, or a broadcast constant.
    pub fn from_samples(
        n_bins: usize,
        feature: &[u8],
        sample_indices: &[u32],
        gradients: &[f32],
        hessians: Hessians,
    ) -> Self {
        let mut histogram = Self::empty(n_bins);
        match hessians {
            Hessians::PerSample(hessians) => {
                for &i in sample_indices {
                    let bin = &mut histogram.bins[feature[i as usize] as usize];
                    bin.count += 1;
                    bin.sum_gradients += gradients[i as usize];
                    bin.sum_hessians += hessians[i as usize];
                }
            }
            Hessians::Constant(hessian) => {
                // Counting pass only; hessian sums follow from the counts.
                for &i in sample_indices {
                    let bin = &mut histogram.bins[feature[i as usize] as usize];
                    bin.count += 1;
                    bin.sum_gradients += gradients[i as usize];
                }
                for bin in histogram.bins.iter_mut() {
                    bin.sum_hessians = bin.count as f32 * hessian;
                }
            }
        }
        histogram
    }

    /// Derive the histogram of the complementary sibling, given the parent's
    /// histogram and the already built sibling's histogram.
    ///
    /// Both inputs must share the bin layout fixed at grower construction.
    /// The result is numerically equivalent to building from scratch over
    /// the complementary sample set, up to floating point accumulation
    /// order.
    pub fn from_subtraction(parent: &FeatureHistogram, sibling: &FeatureHistogram) -> Self {
        debug_assert_eq!(parent.bins.len(), sibling.bins.len());
        let bins = parent
            .bins
            .iter()
            .zip(sibling.bins.iter())
            .map(|(p, s)| Bin {
                count: p.count - s.count,
                sum_gradients: p.sum_gradients - s.sum_gradients,
                sum_hessians: p.sum_hessians - s.sum_hessians,
            })
            .collect();
        FeatureHistogram { bins }
    }
}
