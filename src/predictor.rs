//! Predictor
//!
//! The flat inference artifact produced from a grown tree: a
//! position-addressed array of fixed-shape records, independent of the
//! in-memory node arena.
use crate::data::Matrix;
use crate::errors::TreeGrowError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;

/// One flattened node. Records are laid out in preorder: slot 0 is the
/// root, and an internal record's `left` child is always the next slot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PredictorRecord {
    /// Feature the split is made on.
    pub feature_idx: u32,
    /// Inclusive upper bin of the left branch.
    pub bin_threshold: u8,
    /// Slot of the left child.
    pub left: u32,
    /// Slot of the right child.
    pub right: u32,
    /// Prediction value, meaningful only when `is_leaf`.
    pub weight: f32,
    /// Whether this record is a leaf.
    pub is_leaf: bool,
}

/// Read-only flattened tree for inference over binned rows.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TreePredictor {
    /// The flattened nodes, root at slot 0.
    pub nodes: Vec<PredictorRecord>,
}

impl TreePredictor {
    pub fn new(nodes: Vec<PredictorRecord>) -> Self {
        TreePredictor { nodes }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaf_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf).count()
    }

    /// Route one binned row from the root to a leaf and return its weight.
    pub fn predict_row(&self, binned_row: &[u8]) -> f32 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf {
                return node.weight;
            }
            idx = if binned_row[node.feature_idx as usize] <= node.bin_threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }

    /// Predict every row of a binned feature matrix.
    pub fn predict(&self, binned_features: &Matrix<u8>) -> Vec<f32> {
        (0..binned_features.rows)
            .into_par_iter()
            .map(|row| self.predict_row(&binned_features.get_row(row)))
            .collect()
    }

    /// Dump the predictor as a json object.
    pub fn json_dump(&self) -> Result<String, TreeGrowError> {
        match serde_json::to_string(self) {
            Ok(s) => Ok(s),
            Err(e) => Err(TreeGrowError::UnableToWrite(e.to_string())),
        }
    }

    /// Load a predictor from a json string.
    pub fn from_json(json_str: &str) -> Result<Self, TreeGrowError> {
        match serde_json::from_str::<TreePredictor>(json_str) {
            Ok(p) => Ok(p),
            Err(e) => Err(TreeGrowError::UnableToRead(e.to_string())),
        }
    }

    /// Save the predictor as a json object to a file.
    ///
    /// * `path` - Path to save the predictor.
    pub fn save(&self, path: &str) -> Result<(), TreeGrowError> {
        let model = self.json_dump()?;
        match fs::write(path, model) {
            Err(e) => Err(TreeGrowError::UnableToWrite(e.to_string())),
            Ok(_) => Ok(()),
        }
    }

    /// Load a predictor from a path to a json predictor object.
    ///
    /// * `path` - Path to load the predictor from.
    pub fn load(path: &str) -> Result<Self, TreeGrowError> {
        let json_str = match fs::read_to_string(path) {
            Ok(s) => Ok(s),
            Err(e) => Err(TreeGrowError::UnableToRead(e.to_string())),
        }?;
        Self::from_json(&json_str)
    }
}
