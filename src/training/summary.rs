use serde::{Deserialize, Serialize};

/// What an epoch of training reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// Starting at `1`.
    pub epoch: usize,
    pub train_loss: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

/// The mean loss and mean accuracy over every validation batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub loss: f32,
    pub accuracy: f32,
}
