//! JSON run configuration.
//!
//! ```json
//! {
//!   "model": { "input_size": 784, "output_size": 10, "hidden_layers": [512, 256, 128] },
//!   "optimizer": { "adam": { "lr": 0.001, "b1": 0.9, "b2": 0.999, "eps": 1e-8 } },
//!   "epochs": 2,
//!   "batch_size": 64,
//!   "seed": 42,
//!   "log_every": 40,
//!   "dataset": {
//!     "train_images": "data/train-images-idx3-ubyte",
//!     "train_labels": "data/train-labels-idx1-ubyte",
//!     "test_images": "data/t10k-images-idx3-ubyte",
//!     "test_labels": "data/t10k-labels-idx1-ubyte"
//!   },
//!   "checkpoint": "checkpoint.json"
//! }
//! ```

mod adapter;
mod model;
mod training;

use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

pub use adapter::{Adapter, Run};
pub use model::ModelConfig;
pub use training::{DatasetConfig, OptimizerConfig};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub optimizer: OptimizerConfig,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: Option<u64>,
    pub log_every: Option<usize>,
    pub dataset: DatasetConfig,
    pub checkpoint: PathBuf,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Reads a [`Config`] from a JSON file. It's only parsed here, see [`Adapter`] for validation.
pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_json(&content)
}
