use serde::{Deserialize, Serialize};

use crate::initialization::Init;

/// The classifier to train.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub input_size: usize,
    pub output_size: usize,
    #[serde(default)]
    pub hidden_layers: Vec<usize>,
    /// Falls back to the builder's default when missing.
    pub drop_p: Option<f32>,
    pub init: Option<Init>,
}
