mod batch;
mod dataset;
pub mod idx;
mod normalize;

pub use batch::Batch;
pub use dataset::{Batches, InMemoryDataset};
pub use normalize::Normalize;
