use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

/// Every parameter of a model keyed by `<layer name>.weight` or `<layer name>.bias`.
pub type StateDict = BTreeMap<String, TensorRecord>;

/// A row-major tensor snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorRecord {
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<f32>) -> Self {
        Self {
            shape: shape.into(),
            data,
        }
    }

    /// Checks the record against the shape a model expects under `key`.
    ///
    /// Both the declared shape and the amount of stored values must agree, a record read from
    /// disk could carry a shape that doesn't describe its data.
    pub fn check(&self, key: &str, expected: &[usize]) -> Result<()> {
        if self.shape != expected {
            return Err(MlErr::shape_mismatch(key, self.shape.clone(), expected));
        }

        let len: usize = self.shape.iter().product();
        if self.data.len() != len {
            return Err(MlErr::shape_mismatch(
                format!("{key} data"),
                [self.data.len()],
                [len],
            ));
        }

        Ok(())
    }
}

/// The hidden layers recorded in `state`.
///
/// # Returns
/// The amount of hidden layers, taken from the deepest `hidden_layers.<i>` key, and the width of
/// every recorded one read off its bias (or weight) shape.
pub(crate) fn hidden_layers(state: &StateDict) -> (usize, Vec<usize>) {
    let indices: BTreeSet<usize> = state
        .keys()
        .filter_map(|key| key.strip_prefix("hidden_layers.")?.split('.').next()?.parse().ok())
        .collect();

    let width = |i: usize, param: &str| {
        state
            .get(&format!("hidden_layers.{i}.{param}"))
            .and_then(|record| record.shape.first().copied())
    };

    let widths = indices
        .iter()
        .map(|&i| width(i, "bias").or_else(|| width(i, "weight")).unwrap_or(0))
        .collect();

    let depth = indices.last().map_or(0, |i| i + 1);
    (depth, widths)
}
