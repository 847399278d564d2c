//! Splitter
//!
//! Histogram-based search for the best (feature, bin) split of a node.
use crate::data::Matrix;
use crate::histogram::{FeatureHistogram, Hessians};
use crate::utils::split_gain;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

/// Descriptor of the best candidate split found for a node.
///
/// `gain` is `f32::NEG_INFINITY` when no feasible threshold exists, so a
/// degenerate node always compares below any gain threshold and finalizes
/// as a leaf.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SplitInfo {
    /// Loss reduction of the split.
    pub gain: f32,
    /// Feature the split is made on.
    pub feature_idx: usize,
    /// Inclusive upper bin of the left branch.
    pub bin_idx: u8,
    /// Sum of the gradients of the samples routed left.
    pub gradient_left: f32,
    /// Sum of the gradients of the samples routed right.
    pub gradient_right: f32,
    /// Sum of the hessians of the samples routed left.
    pub hessian_left: f32,
    /// Sum of the hessians of the samples routed right.
    pub hessian_right: f32,
}

impl Default for SplitInfo {
    fn default() -> Self {
        SplitInfo {
            gain: f32::NEG_INFINITY,
            feature_idx: 0,
            bin_idx: 0,
            gradient_left: 0.0,
            gradient_right: 0.0,
            hessian_left: 0.0,
            hessian_right: 0.0,
        }
    }
}

/// Finds the best split of a node's sample set by scanning per-feature,
/// per-bin gradient and hessian aggregates.
pub struct HistogramSplitter<'a> {
    /// Binned feature matrix, one byte per value, bins in `[0, n_bins)`.
    pub binned_features: Matrix<'a, u8>,
    /// Number of bins shared by every feature, fixed at construction.
    pub n_bins: usize,
    /// Gradient of the loss for each sample.
    pub gradients: &'a [f32],
    /// Hessian of the loss for each sample, or a single broadcast constant.
    pub hessians: &'a [f32],
    /// L2 regularization applied to leaf values and gains.
    pub l2_regularization: f32,
    /// Minimum hessian mass required on each side of a feasible threshold.
    pub min_hessian_to_split: f32,
}

impl<'a> HistogramSplitter<'a> {
    pub fn new(
        binned_features: Matrix<'a, u8>,
        n_bins: usize,
        gradients: &'a [f32],
        hessians: &'a [f32],
        l2_regularization: f32,
        min_hessian_to_split: f32,
    ) -> Self {
        HistogramSplitter {
            binned_features,
            n_bins,
            gradients,
            hessians,
            l2_regularization,
            min_hessian_to_split,
        }
    }

    /// Whether the hessian source is a single constant broadcast to all samples.
    pub fn constant_hessian(&self) -> bool {
        self.hessians.len() == 1
    }

    fn hessian_source(&self) -> Hessians<'a> {
        if self.constant_hessian() {
            Hessians::Constant(self.hessians[0])
        } else {
            Hessians::PerSample(self.hessians)
        }
    }

    /// Sum the gradients and hessians over a sample-index set.
    pub fn aggregate_sums(&self, sample_indices: &[u32]) -> (f32, f32) {
        let sum_gradients: f32 = sample_indices.iter().map(|&i| self.gradients[i as usize]).sum();
        let sum_hessians: f32 = if self.constant_hessian() {
            self.hessians[0] * sample_indices.len() as f32
        } else {
            sample_indices.iter().map(|&i| self.hessians[i as usize]).sum()
        };
        (sum_gradients, sum_hessians)
    }

    /// Find the best split over all features, building every feature's
    /// histogram from scratch.
    ///
    /// Also returns the per-feature histograms so that a sibling node can
    /// later be evaluated by subtraction instead of a rescan.
    pub fn find_node_split(
        &self,
        sample_indices: &[u32],
        pool: &ThreadPool,
    ) -> (SplitInfo, Vec<FeatureHistogram>) {
        let (sum_gradients, sum_hessians) = self.aggregate_sums(sample_indices);
        let candidates: Vec<(SplitInfo, FeatureHistogram)> = pool.install(|| {
            (0..self.binned_features.cols)
                .into_par_iter()
                .map(|feature_idx| {
                    let histogram = FeatureHistogram::from_samples(
                        self.n_bins,
                        self.binned_features.get_col(feature_idx),
                        sample_indices,
                        self.gradients,
                        self.hessian_source(),
                    );
                    let split_info =
                        self.find_feature_split(feature_idx, &histogram, sum_gradients, sum_hessians);
                    (split_info, histogram)
                })
                .collect()
        });
        Self::reduce_candidates(candidates)
    }

    /// Find the best split over all features, deriving every feature's
    /// histogram by subtracting the sibling's histogram from the parent's.
    ///
    /// `sum_gradients` and `sum_hessians` are the aggregates of
    /// `sample_indices`, already known to the caller from the parent's
    /// split; the index set itself is never rescanned.
    pub fn find_node_split_subtraction(
        &self,
        sample_indices: &[u32],
        parent_histograms: &[FeatureHistogram],
        sibling_histograms: &[FeatureHistogram],
        sum_gradients: f32,
        sum_hessians: f32,
        pool: &ThreadPool,
    ) -> (SplitInfo, Vec<FeatureHistogram>) {
        assert_eq!(parent_histograms.len(), self.binned_features.cols);
        assert_eq!(sibling_histograms.len(), self.binned_features.cols);
        debug_assert_eq!(
            sample_indices.len() as u32,
            parent_histograms[0].bins.iter().map(|b| b.count).sum::<u32>()
                - sibling_histograms[0].bins.iter().map(|b| b.count).sum::<u32>()
        );
        let candidates: Vec<(SplitInfo, FeatureHistogram)> = pool.install(|| {
            parent_histograms
                .par_iter()
                .zip(sibling_histograms.par_iter())
                .enumerate()
                .map(|(feature_idx, (parent, sibling))| {
                    let histogram = FeatureHistogram::from_subtraction(parent, sibling);
                    let split_info =
                        self.find_feature_split(feature_idx, &histogram, sum_gradients, sum_hessians);
                    (split_info, histogram)
                })
                .collect()
        });
        Self::reduce_candidates(candidates)
    }

    /// Best threshold of one feature via a prefix scan over its histogram.
    ///
    /// Thresholds run over `0..n_bins - 1`: the last bin can never be the
    /// inclusive upper bound of a left branch. A strictly-greater comparison
    /// makes the lowest feasible bin win ties.
    fn find_feature_split(
        &self,
        feature_idx: usize,
        histogram: &FeatureHistogram,
        sum_gradients: f32,
        sum_hessians: f32,
    ) -> SplitInfo {
        let mut best = SplitInfo {
            feature_idx,
            ..SplitInfo::default()
        };
        let mut gradient_left = 0.0_f32;
        let mut hessian_left = 0.0_f32;
        for (bin_idx, bin) in histogram.bins[..self.n_bins - 1].iter().enumerate() {
            gradient_left += bin.sum_gradients;
            hessian_left += bin.sum_hessians;
            let gradient_right = sum_gradients - gradient_left;
            let hessian_right = sum_hessians - hessian_left;
            if hessian_left < self.min_hessian_to_split || hessian_right < self.min_hessian_to_split {
                continue;
            }
            let gain = split_gain(
                gradient_left,
                hessian_left,
                gradient_right,
                hessian_right,
                sum_gradients,
                sum_hessians,
                self.l2_regularization,
            );
            if gain > best.gain {
                best = SplitInfo {
                    gain,
                    feature_idx,
                    bin_idx: bin_idx as u8,
                    gradient_left,
                    gradient_right,
                    hessian_left,
                    hessian_right,
                };
            }
        }
        best
    }

    /// Pick the winning feature. Candidates arrive in feature order, and the
    /// strictly-greater comparison keeps the lowest feature index on equal
    /// gains, so the result is deterministic.
    fn reduce_candidates(candidates: Vec<(SplitInfo, FeatureHistogram)>) -> (SplitInfo, Vec<FeatureHistogram>) {
        let mut best = SplitInfo::default();
        let mut histograms = Vec::with_capacity(candidates.len());
        for (split_info, histogram) in candidates {
            if split_info.gain > best.gain {
                best = split_info;
            }
            histograms.push(histogram);
        }
        (best, histograms)
    }

    /// Partition a node's samples according to its winning split. A sample
    /// routes left iff its bin for `feature_idx` is `<= bin_idx`.
    ///
    /// Consumes the parent's index vector: ownership of every index moves to
    /// exactly one of the two children.
    pub fn split_indices(&self, sample_indices: Vec<u32>, split_info: &SplitInfo) -> (Vec<u32>, Vec<u32>) {
        let feature = self.binned_features.get_col(split_info.feature_idx);
        sample_indices
            .into_iter()
            .partition(|&i| feature[i as usize] <= split_info.bin_idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn test_pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn assert_split_infos_close(si: &SplitInfo, si_sub: &SplitInfo) {
        assert_eq!(si.feature_idx, si_sub.feature_idx);
        assert_eq!(si.bin_idx, si_sub.bin_idx);
        assert_relative_eq!(si.gain, si_sub.gain, max_relative = 1e-4, epsilon = 1e-4);
        assert_relative_eq!(si.gradient_left, si_sub.gradient_left, max_relative = 1e-4, epsilon = 1e-4);
        assert_relative_eq!(si.gradient_right, si_sub.gradient_right, max_relative = 1e-4, epsilon = 1e-4);
        assert_relative_eq!(si.hessian_left, si_sub.hessian_left, max_relative = 1e-4, epsilon = 1e-4);
        assert_relative_eq!(si.hessian_right, si_sub.hessian_right, max_relative = 1e-4, epsilon = 1e-4);
    }

    #[test]
    fn test_histogram_split() {
        // A planted discontinuity at every interior bin must be recovered
        // exactly, whichever side carries the negative gradients.
        let pool = test_pool();
        let mut rng = StdRng::seed_from_u64(42);
        let n_samples = 10_000;

        for n_bins in [3_usize, 32, 256] {
            let binned_feature: Vec<u8> = (0..n_samples).map(|_| rng.gen_range(0..n_bins) as u8).collect();
            let sample_indices: Vec<u32> = (0..n_samples as u32).collect();
            let hessians = vec![1.0_f32];

            for true_bin in [1_usize, n_bins / 2, n_bins - 2] {
                for sign in [-1.0_f32, 1.0] {
                    let gradients: Vec<f32> = binned_feature
                        .iter()
                        .map(|&b| if b as usize <= true_bin { -sign } else { sign })
                        .collect();

                    let matrix = Matrix::new(&binned_feature, n_samples, 1);
                    let splitter = HistogramSplitter::new(matrix, n_bins, &gradients, &hessians, 0.0, 1e-3);
                    let (split_info, histograms) = splitter.find_node_split(&sample_indices, &pool);

                    assert_eq!(split_info.bin_idx as usize, true_bin);
                    assert_eq!(split_info.feature_idx, 0);
                    assert!(split_info.gain >= 0.0);
                    assert_eq!(histograms.len(), 1);
                }
            }
        }
    }

    #[test]
    fn test_split_vs_split_subtraction() {
        let pool = test_pool();
        let mut rng = StdRng::seed_from_u64(42);

        let n_bins = 10;
        let n_features = 20;
        let n_samples = 500;

        let binned: Vec<u8> = (0..n_samples * n_features)
            .map(|_| rng.gen_range(0..n_bins as u8))
            .collect();
        let gradients: Vec<f32> = (0..n_samples).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();

        for constant_hessian in [true, false] {
            let hessians: Vec<f32> = if constant_hessian {
                vec![1.0]
            } else {
                (0..n_samples).map(|_| rng.gen::<f32>() + 0.1).collect()
            };

            let matrix = Matrix::new(&binned, n_samples, n_features);
            let splitter = HistogramSplitter::new(matrix, n_bins, &gradients, &hessians, 0.0, 1e-3);

            let sample_indices: Vec<u32> = (0..n_samples as u32).collect();
            let (left, right): (Vec<u32>, Vec<u32>) =
                sample_indices.iter().copied().partition(|_| rng.gen_bool(0.5));

            let (_si_parent, hists_parent) = splitter.find_node_split(&sample_indices, &pool);
            let (si_left, hists_left) = splitter.find_node_split(&left, &pool);
            let (si_right, hists_right) = splitter.find_node_split(&right, &pool);

            let (gradient_left, hessian_left) = splitter.aggregate_sums(&left);
            let (si_left_sub, hists_left_sub) = splitter.find_node_split_subtraction(
                &left,
                &hists_parent,
                &hists_right,
                gradient_left,
                hessian_left,
                &pool,
            );

            let (gradient_right, hessian_right) = splitter.aggregate_sums(&right);
            let (si_right_sub, hists_right_sub) = splitter.find_node_split_subtraction(
                &right,
                &hists_parent,
                &hists_left,
                gradient_right,
                hessian_right,
                &pool,
            );

            for (hists, hists_sub) in [(&hists_left, &hists_left_sub), (&hists_right, &hists_right_sub)] {
                for (hist, hist_sub) in hists.iter().zip(hists_sub.iter()) {
                    for (bin, bin_sub) in hist.bins.iter().zip(hist_sub.bins.iter()) {
                        assert_eq!(bin.count, bin_sub.count);
                        assert_relative_eq!(
                            bin.sum_gradients,
                            bin_sub.sum_gradients,
                            max_relative = 1e-4,
                            epsilon = 1e-4
                        );
                        assert_relative_eq!(
                            bin.sum_hessians,
                            bin_sub.sum_hessians,
                            max_relative = 1e-4,
                            epsilon = 1e-4
                        );
                    }
                }
            }

            assert_split_infos_close(&si_left, &si_left_sub);
            assert_split_infos_close(&si_right, &si_right_sub);
        }
    }

    #[test]
    fn test_constant_feature_has_no_candidate() {
        // All samples share one bin: no feasible threshold exists.
        let pool = test_pool();
        let n_samples = 100;
        let binned: Vec<u8> = vec![3; n_samples];
        let gradients: Vec<f32> = (0..n_samples).map(|i| if i % 2 == 0 { -1.0 } else { 1.0 }).collect();
        let hessians = vec![1.0_f32];
        let sample_indices: Vec<u32> = (0..n_samples as u32).collect();

        let matrix = Matrix::new(&binned, n_samples, 1);
        let splitter = HistogramSplitter::new(matrix, 8, &gradients, &hessians, 0.0, 1e-3);
        let (split_info, _) = splitter.find_node_split(&sample_indices, &pool);
        assert_eq!(split_info.gain, f32::NEG_INFINITY);
    }

    #[test]
    fn test_min_hessian_blocks_all_thresholds() {
        // Hessian mass is too small on any side: degenerate, not an error.
        let pool = test_pool();
        let binned: Vec<u8> = vec![0, 1, 2, 3];
        let gradients: Vec<f32> = vec![-1.0, -1.0, 1.0, 1.0];
        let hessians = vec![1e-6_f32];
        let sample_indices: Vec<u32> = vec![0, 1, 2, 3];

        let matrix = Matrix::new(&binned, 4, 1);
        let splitter = HistogramSplitter::new(matrix, 4, &gradients, &hessians, 0.0, 1e-3);
        let (split_info, _) = splitter.find_node_split(&sample_indices, &pool);
        assert_eq!(split_info.gain, f32::NEG_INFINITY);
    }

    #[test]
    fn test_tie_break_prefers_lowest_feature() {
        // Two identical columns produce identical gains; the lower feature
        // index must win, deterministically.
        let pool = test_pool();
        let column: Vec<u8> = vec![0, 0, 1, 1];
        let binned: Vec<u8> = [column.clone(), column].concat();
        let gradients: Vec<f32> = vec![-1.0, -1.0, 1.0, 1.0];
        let hessians = vec![1.0_f32];
        let sample_indices: Vec<u32> = vec![0, 1, 2, 3];

        let matrix = Matrix::new(&binned, 4, 2);
        let splitter = HistogramSplitter::new(matrix, 2, &gradients, &hessians, 0.0, 1e-3);
        let (split_info, _) = splitter.find_node_split(&sample_indices, &pool);
        assert_eq!(split_info.feature_idx, 0);
        assert_eq!(split_info.bin_idx, 0);
    }

    #[test]
    fn test_split_indices_partition() {
        let binned: Vec<u8> = vec![0, 2, 1, 3, 0, 2];
        let gradients = vec![0.0_f32; 6];
        let hessians = vec![1.0_f32];
        let matrix = Matrix::new(&binned, 6, 1);
        let splitter = HistogramSplitter::new(matrix, 4, &gradients, &hessians, 0.0, 1e-3);

        let split_info = SplitInfo {
            feature_idx: 0,
            bin_idx: 1,
            ..SplitInfo::default()
        };
        let (left, right) = splitter.split_indices(vec![0, 1, 2, 3, 4, 5], &split_info);
        assert_eq!(left, vec![0, 2, 4]);
        assert_eq!(right, vec![1, 3, 5]);
    }

    #[test]
    fn test_conservation_of_sums() {
        let pool = test_pool();
        let mut rng = StdRng::seed_from_u64(7);
        let n_samples = 200;
        let binned: Vec<u8> = (0..n_samples).map(|_| rng.gen_range(0..16)).collect();
        let gradients: Vec<f32> = (0..n_samples).map(|_| rng.gen::<f32>() - 0.5).collect();
        let hessians: Vec<f32> = (0..n_samples).map(|_| rng.gen::<f32>() + 0.1).collect();
        let sample_indices: Vec<u32> = (0..n_samples as u32).collect();

        let matrix = Matrix::new(&binned, n_samples, 1);
        let splitter = HistogramSplitter::new(matrix, 16, &gradients, &hessians, 0.0, 1e-3);
        let (split_info, _) = splitter.find_node_split(&sample_indices, &pool);
        let (sum_gradients, sum_hessians) = splitter.aggregate_sums(&sample_indices);

        assert_relative_eq!(
            split_info.gradient_left + split_info.gradient_right,
            sum_gradients,
            max_relative = 1e-4,
            epsilon = 1e-4
        );
        assert_relative_eq!(
            split_info.hessian_left + split_info.hessian_right,
            sum_hessians,
            max_relative = 1e-4,
            epsilon = 1e-4
        );
    }
}
