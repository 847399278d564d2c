use crate::histogram::FeatureHistogram;
use crate::splitter::SplitInfo;
use std::cmp::Ordering;
use std::fmt;

/// One vertex of the growing tree, addressed by its arena index `num`.
///
/// A node is in exactly one of four states: unevaluated (no `split_info`),
/// splittable (`split_info` set, no children), finalized leaf (`weight`
/// set), or internal (`split_info` set and both children linked).
#[derive(Debug)]
pub struct TreeNode {
    /// Arena index of this node.
    pub num: usize,
    /// Distance from the root, root = 0.
    pub depth: usize,
    /// Rows belonging to this node. Owned exclusively until the node splits,
    /// at which point ownership is partitioned between the two children.
    pub sample_indices: Vec<u32>,
    /// Sum of the gradients over `sample_indices`.
    pub sum_gradients: f32,
    /// Sum of the hessians over `sample_indices`.
    pub sum_hessians: f32,
    /// Best candidate split, present once splittability has been evaluated.
    pub split_info: Option<SplitInfo>,
    /// Arena index of the left child, present only after the split.
    pub left_child: Option<usize>,
    /// Arena index of the right child, present only after the split.
    pub right_child: Option<usize>,
    /// Prediction value, present only once finalized as a leaf.
    pub weight: Option<f32>,
    /// Per-feature histograms kept between evaluation and split, so a
    /// sibling can be derived by subtraction. Dropped afterwards.
    pub histograms: Option<Vec<FeatureHistogram>>,
}

impl TreeNode {
    pub fn new(num: usize, depth: usize, sample_indices: Vec<u32>, sum_gradients: f32, sum_hessians: f32) -> Self {
        TreeNode {
            num,
            depth,
            sample_indices,
            sum_gradients,
            sum_hessians,
            split_info: None,
            left_child: None,
            right_child: None,
            weight: None,
            histograms: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.weight.is_some()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_indices.len()
    }
}

impl fmt::Display for TreeNode {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.split_info, self.weight) {
            (_, Some(weight)) => write!(f, "{}:leaf={},depth={}", self.num, weight, self.depth),
            (Some(si), None) => write!(
                f,
                "{}:[f{} <= bin {}] gain={},depth={}",
                self.num, si.feature_idx, si.bin_idx, si.gain, self.depth
            ),
            (None, None) => write!(f, "{}:unevaluated,depth={}", self.num, self.depth),
        }
    }
}

/// Priority-queue key for a splittable node.
///
/// Ordered by gain, with equal gains broken by insertion sequence (earlier
/// first) so that growth is reproducible across runs.
#[derive(Debug)]
pub struct SplittableEntry {
    /// Gain of the node's evaluated split.
    pub gain: f32,
    /// Insertion sequence number, the explicit tie-break.
    pub seq: usize,
    /// Arena index of the node.
    pub node: usize,
}

impl SplittableEntry {
    /// Build a queue entry for an evaluated node.
    ///
    /// Panics if the node's splittability has not been evaluated: comparing
    /// unevaluated nodes is a programming error.
    pub fn new(node: &TreeNode, seq: usize) -> Self {
        let gain = node
            .split_info
            .as_ref()
            .expect("Cannot enqueue a node without evaluated split_info")
            .gain;
        SplittableEntry {
            gain,
            seq,
            node: node.num,
        }
    }
}

impl Ord for SplittableEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain
            .total_cmp(&other.gain)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for SplittableEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SplittableEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SplittableEntry {}
