pub mod metrics;
mod summary;
mod trainer;

pub use summary::{EpochSummary, Validation};
pub use trainer::{Trainer, accumulate_grad, train, train_step, validate};
