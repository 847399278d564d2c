//! Grower
//!
//! Greedy, best-first growth of a single decision tree over pre-binned
//! feature data. The node with the highest evaluated gain is always split
//! next, until the gain threshold, depth limit or leaf budget stops growth.
use crate::data::Matrix;
use crate::errors::TreeGrowError;
use crate::histogram::FeatureHistogram;
use crate::node::{SplittableEntry, TreeNode};
use crate::predictor::{PredictorRecord, TreePredictor};
use crate::splitter::{HistogramSplitter, SplitInfo};
use crate::utils::{leaf_weight, validate_non_negative_float, validate_not_below, validate_positive_float};
use log::{info, warn};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::collections::BinaryHeap;

/// Hyperparameters of the tree grower, validated at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowerConfig {
    /// Maximum number of leaves, at least 1. `None` leaves the count
    /// unbounded.
    pub max_leaf_nodes: Option<usize>,
    /// Maximum depth of any leaf, at least 1. `None` leaves depth unbounded.
    pub max_depth: Option<usize>,
    /// Minimum gain required to split a node instead of finalizing it.
    pub min_gain_to_split: f32,
    /// Number of bins every feature was discretized into, between 2 and 256.
    pub n_bins: usize,
    /// L2 regularization applied to leaf values and gains.
    pub l2_regularization: f32,
    /// Minimum hessian mass required on each side of a feasible threshold.
    pub min_hessian_to_split: f32,
    /// Learning-rate multiplier applied to leaf weights.
    pub shrinkage: f32,
    /// Thread count for per-feature split evaluation. `None` lets rayon
    /// pick.
    pub num_threads: Option<usize>,
}

impl Default for GrowerConfig {
    fn default() -> Self {
        GrowerConfig {
            max_leaf_nodes: None,
            max_depth: None,
            min_gain_to_split: 0.0,
            n_bins: 256,
            l2_regularization: 0.0,
            min_hessian_to_split: 1e-3,
            shrinkage: 1.0,
            num_threads: None,
        }
    }
}

/// Grows one tree for a gradient-boosted ensemble.
///
/// Nodes live in an arena addressed by index, root at 0; children are
/// linked by index rather than reference. The arena is append-only during
/// growth and immutable afterwards.
pub struct TreeGrower<'a> {
    /// Split evaluator over the binned feature matrix.
    pub splitter: HistogramSplitter<'a>,
    /// All nodes created so far, root first.
    pub nodes: Vec<TreeNode>,
    max_leaf_nodes: Option<usize>,
    max_depth: Option<usize>,
    min_gain_to_split: f32,
    shrinkage: f32,
    splittable_nodes: BinaryHeap<SplittableEntry>,
    n_finalized_leaves: usize,
    seq: usize,
    pool: ThreadPool,
}

impl<'a> TreeGrower<'a> {
    /// Build a grower over the full dataset and evaluate the root's
    /// splittability, unless the leaf budget is exactly 1, in which case the
    /// root is finalized immediately without any evaluation.
    ///
    /// * `binned_features` - one byte per value, bins in `[0, n_bins)`.
    /// * `gradients` - one value per row.
    /// * `hessians` - one value per row, or a single broadcast constant.
    pub fn new(
        binned_features: Matrix<'a, u8>,
        gradients: &'a [f32],
        hessians: &'a [f32],
        config: GrowerConfig,
    ) -> Result<Self, TreeGrowError> {
        Self::validate(&binned_features, gradients, hessians, &config)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads.unwrap_or(0))
            .build()
            .map_err(|e| {
                TreeGrowError::InvalidParameter(
                    "num_threads".to_string(),
                    "a thread count supported by the platform".to_string(),
                    e.to_string(),
                )
            })?;

        let n_samples = binned_features.rows;
        let splitter = HistogramSplitter::new(
            binned_features,
            config.n_bins,
            gradients,
            hessians,
            config.l2_regularization,
            config.min_hessian_to_split,
        );

        let sample_indices: Vec<u32> = (0..n_samples as u32).collect();
        let (sum_gradients, sum_hessians) = splitter.aggregate_sums(&sample_indices);
        let root = TreeNode::new(0, 0, sample_indices, sum_gradients, sum_hessians);

        let mut grower = TreeGrower {
            splitter,
            nodes: vec![root],
            max_leaf_nodes: config.max_leaf_nodes,
            max_depth: config.max_depth,
            min_gain_to_split: config.min_gain_to_split,
            shrinkage: config.shrinkage,
            splittable_nodes: BinaryHeap::new(),
            n_finalized_leaves: 0,
            seq: 0,
            pool,
        };

        if grower.max_leaf_nodes == Some(1) {
            // A one-leaf budget never needs a split evaluation.
            grower.finalize_leaf(0);
        } else {
            grower.compute_splittability(0);
        }
        Ok(grower)
    }

    fn validate(
        binned_features: &Matrix<u8>,
        gradients: &[f32],
        hessians: &[f32],
        config: &GrowerConfig,
    ) -> Result<(), TreeGrowError> {
        if binned_features.rows == 0 {
            return Err(TreeGrowError::InvalidParameter(
                "binned_features".to_string(),
                "a matrix with at least one row".to_string(),
                "0 rows".to_string(),
            ));
        }
        if config.n_bins < 2 || config.n_bins > 256 {
            return Err(TreeGrowError::InvalidParameter(
                "n_bins".to_string(),
                "a bin count between 2 and 256".to_string(),
                config.n_bins.to_string(),
            ));
        }
        if let Some(max_leaf_nodes) = config.max_leaf_nodes {
            validate_not_below(max_leaf_nodes, 1, "max_leaf_nodes")?;
        }
        if let Some(max_depth) = config.max_depth {
            validate_not_below(max_depth, 1, "max_depth")?;
        }
        validate_non_negative_float(config.min_gain_to_split, "min_gain_to_split")?;
        validate_non_negative_float(config.l2_regularization, "l2_regularization")?;
        validate_positive_float(config.min_hessian_to_split, "min_hessian_to_split")?;
        validate_positive_float(config.shrinkage, "shrinkage")?;

        if gradients.len() != binned_features.rows {
            return Err(TreeGrowError::MisalignedGradients(gradients.len(), binned_features.rows));
        }
        if hessians.len() != binned_features.rows && hessians.len() != 1 {
            return Err(TreeGrowError::MisalignedHessians(hessians.len(), binned_features.rows));
        }

        if config.n_bins < 256 {
            for feature_idx in 0..binned_features.cols {
                let col = binned_features.get_col(feature_idx);
                for (row, &bin) in col.iter().enumerate() {
                    if bin as usize >= config.n_bins {
                        return Err(TreeGrowError::BinOutOfRange(bin, feature_idx, row, config.n_bins));
                    }
                }
            }
        }
        Ok(())
    }

    /// Split nodes best-first until no splittable node remains.
    pub fn grow(&mut self) {
        while self.can_split_further() {
            self.split_next();
        }
        info!(
            "Grew a tree with {} nodes and {} leaves, depth {}.",
            self.nodes.len(),
            self.n_finalized_leaves,
            self.depth()
        );
    }

    pub fn can_split_further(&self) -> bool {
        !self.splittable_nodes.is_empty()
    }

    /// Number of leaves finalized so far.
    pub fn n_leaves(&self) -> usize {
        self.n_finalized_leaves
    }

    /// Depth of the deepest node created so far.
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Split the queued node with the highest gain and return the arena
    /// indices of the two children.
    ///
    /// Panics if no splittable node remains; `can_split_further` is the
    /// loop's termination test.
    pub fn split_next(&mut self) -> (usize, usize) {
        let entry = self.splittable_nodes.pop().expect("No more splittable nodes");
        let node_idx = entry.node;
        let depth = self.nodes[node_idx].depth + 1;

        // Ownership of the parent's indices moves into the partition; the
        // parent keeps no copy.
        let sample_indices = std::mem::take(&mut self.nodes[node_idx].sample_indices);
        let split_info: SplitInfo = self.nodes[node_idx]
            .split_info
            .clone()
            .expect("Queued node lost its split_info");
        let (left_indices, right_indices) = self.splitter.split_indices(sample_indices, &split_info);
        assert!(
            !left_indices.is_empty() && !right_indices.is_empty(),
            "Split of node {} on feature {} at bin {} produced an empty child partition",
            node_idx,
            split_info.feature_idx,
            split_info.bin_idx
        );

        // Child aggregates are already known from the parent's evaluation.
        let left_num = self.nodes.len();
        let right_num = left_num + 1;
        self.nodes.push(TreeNode::new(
            left_num,
            depth,
            left_indices,
            split_info.gradient_left,
            split_info.hessian_left,
        ));
        self.nodes.push(TreeNode::new(
            right_num,
            depth,
            right_indices,
            split_info.gradient_right,
            split_info.hessian_right,
        ));
        self.nodes[node_idx].left_child = Some(left_num);
        self.nodes[node_idx].right_child = Some(right_num);

        // Leaf count if growth stopped right now, the two new children each
        // counted provisionally as a leaf.
        let projected_leaf_count = self.n_finalized_leaves + self.splittable_nodes.len() + 2;

        if self.max_depth == Some(depth) {
            self.nodes[node_idx].histograms = None;
            self.finalize_leaf(left_num);
            self.finalize_leaf(right_num);
        } else if self.max_leaf_nodes == Some(projected_leaf_count) {
            self.nodes[node_idx].histograms = None;
            self.finalize_leaf(left_num);
            self.finalize_leaf(right_num);
            self.finalize_splittable_nodes();
        } else {
            self.evaluate_children(node_idx, left_num, right_num);
        }
        (left_num, right_num)
    }

    /// Evaluate both children of a freshly split node.
    ///
    /// The child with fewer samples is evaluated from scratch; the larger
    /// sibling's histograms are then derived by subtraction from the
    /// parent's retained histograms, avoiding a rescan of its samples.
    fn evaluate_children(&mut self, parent: usize, left: usize, right: usize) {
        let parent_histograms = self.nodes[parent]
            .histograms
            .take()
            .expect("Node was split without retained histograms");

        let (small, large) = if self.nodes[left].n_samples() <= self.nodes[right].n_samples() {
            (left, right)
        } else {
            (right, left)
        };

        let (small_info, small_histograms) = self
            .splitter
            .find_node_split(&self.nodes[small].sample_indices, &self.pool);
        let (large_info, large_histograms) = self.splitter.find_node_split_subtraction(
            &self.nodes[large].sample_indices,
            &parent_histograms,
            &small_histograms,
            self.nodes[large].sum_gradients,
            self.nodes[large].sum_hessians,
            &self.pool,
        );

        self.attach_evaluation(small, small_info, small_histograms);
        self.attach_evaluation(large, large_info, large_histograms);
    }

    fn compute_splittability(&mut self, node_idx: usize) {
        let (split_info, histograms) = self
            .splitter
            .find_node_split(&self.nodes[node_idx].sample_indices, &self.pool);
        self.attach_evaluation(node_idx, split_info, histograms);
    }

    /// Record an evaluation result: below the gain threshold the node
    /// becomes a leaf, otherwise it joins the priority queue.
    fn attach_evaluation(&mut self, node_idx: usize, split_info: SplitInfo, histograms: Vec<FeatureHistogram>) {
        let gain = split_info.gain;
        let node = &mut self.nodes[node_idx];
        node.split_info = Some(split_info);
        node.histograms = Some(histograms);
        if gain < self.min_gain_to_split {
            self.finalize_leaf(node_idx);
        } else {
            let entry = SplittableEntry::new(&self.nodes[node_idx], self.seq);
            self.seq += 1;
            self.splittable_nodes.push(entry);
        }
    }

    /// Assign the regularized Newton-step value to a leaf.
    fn finalize_leaf(&mut self, node_idx: usize) {
        let node = &mut self.nodes[node_idx];
        node.weight = Some(leaf_weight(
            node.sum_gradients,
            node.sum_hessians,
            self.splitter.l2_regularization,
            self.shrinkage,
        ));
        node.histograms = None;
        self.n_finalized_leaves += 1;
    }

    /// Bulk-finalize every still-queued node once the leaf budget is
    /// exhausted. Gains are not re-evaluated and the node counter is not
    /// touched.
    fn finalize_splittable_nodes(&mut self) {
        if !self.splittable_nodes.is_empty() {
            warn!(
                "Leaf budget reached with {} splittable nodes remaining; finalizing them as leaves.",
                self.splittable_nodes.len()
            );
        }
        while let Some(entry) = self.splittable_nodes.pop() {
            self.finalize_leaf(entry.node);
        }
    }

    /// Flatten the finished tree into a position-addressed predictor array:
    /// a preorder walk where each internal record's left child is the very
    /// next slot.
    pub fn make_predictor(&self) -> TreePredictor {
        let mut records = vec![PredictorRecord::default(); self.nodes.len()];
        let filled = self.fill_predictor_records(&mut records, 0, 0);
        debug_assert_eq!(filled, self.nodes.len());
        TreePredictor::new(records)
    }

    fn fill_predictor_records(&self, records: &mut [PredictorRecord], node_idx: usize, next_free_idx: usize) -> usize {
        let node = &self.nodes[node_idx];
        if let Some(weight) = node.weight {
            let record = &mut records[next_free_idx];
            record.weight = weight;
            record.is_leaf = true;
            next_free_idx + 1
        } else {
            let split_info = node.split_info.as_ref().expect("Internal node without split_info");
            let left_child = node.left_child.expect("Internal node without a left child");
            let right_child = node.right_child.expect("Internal node without a right child");

            let this = next_free_idx;
            records[this].feature_idx = split_info.feature_idx as u32;
            records[this].bin_threshold = split_info.bin_idx;
            let mut next_free_idx = next_free_idx + 1;

            records[this].left = next_free_idx as u32;
            next_free_idx = self.fill_predictor_records(records, left_child, next_free_idx);

            records[this].right = next_free_idx as u32;
            self.fill_predictor_records(records, right_child, next_free_idx)
        }
    }
}
