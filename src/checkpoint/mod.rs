//! Snapshots pairing a classifier's architecture with its learned parameters.
//!
//! A checkpoint is persisted as a single JSON record:
//!
//! ```json
//! {
//!   "input_size": 784,
//!   "output_size": 10,
//!   "hidden_layers": [512, 256, 128],
//!   "state_dict": {
//!     "hidden_layers.0.weight": { "shape": [512, 784], "data": [...] },
//!     "hidden_layers.0.bias": { "shape": [512], "data": [...] },
//!     "output.weight": { "shape": [10, 128], "data": [...] },
//!     "output.bias": { "shape": [10], "data": [...] }
//!   }
//! }
//! ```

mod checkpoint;
mod state_dict;

pub use checkpoint::{Checkpoint, load, load_from_file, save, save_to_file};
pub use state_dict::{StateDict, TensorRecord};
pub(crate) use state_dict::hidden_layers;
