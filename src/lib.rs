// Modules
pub mod data;
pub mod errors;
pub mod grower;
pub mod histogram;
pub mod node;
pub mod predictor;
pub mod splitter;
pub mod utils;

// Individual classes, and functions
pub use data::Matrix;
pub use grower::{GrowerConfig, TreeGrower};
pub use predictor::TreePredictor;
