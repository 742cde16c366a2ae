use ndarray::Array2;

/// Per-value standardization `(x - mean) / std`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub mean: f32,
    pub std: f32,
}

impl Normalize {
    pub fn new(mean: f32, std: f32) -> Self {
        Self { mean, std }
    }

    pub fn apply(&self, x: Array2<f32>) -> Array2<f32> {
        let Self { mean, std } = *self;
        x.mapv_into(|v| (v - mean) / std)
    }
}

/// Maps `[0, 1]` pixels to `[-1, 1]`.
impl Default for Normalize {
    fn default() -> Self {
        Self::new(0.5, 0.5)
    }
}
