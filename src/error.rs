use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use crate::initialization::RandErr;

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The crate's error type.
#[derive(Debug)]
pub enum MlErr {
    /// The requested architecture can't be built.
    Construction { reason: String },
    /// A shape invariant was violated.
    ShapeMismatch {
        /// Human-readable context for the mismatch (e.g. "batch inputs", a parameter key).
        what: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// A batch source yielded no batches at all.
    EmptyBatches { what: &'static str },
    /// A label is not a valid class index for the model.
    InvalidLabel { label: usize, classes: usize },
    /// A state dict lacks one of the model's parameters.
    MissingParam { key: String },
    /// A state dict holds a parameter the model doesn't have.
    UnexpectedParam { key: String },
    /// `backward` was called without a gradient tracked `forward` before it.
    MissingForwardCache,
    InvalidConfig(String),
    InvalidData(String),
    Init(RandErr),
    Io(io::Error),
    Json(serde_json::Error),
}

impl MlErr {
    pub(crate) fn shape_mismatch<W, G, E>(what: W, got: G, expected: E) -> Self
    where
        W: Into<String>,
        G: Into<Vec<usize>>,
        E: Into<Vec<usize>>,
    {
        Self::ShapeMismatch {
            what: what.into(),
            got: got.into(),
            expected: expected.into(),
        }
    }

    pub(crate) fn construction(reason: impl Into<String>) -> Self {
        Self::Construction {
            reason: reason.into(),
        }
    }
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::Construction { reason } => write!(f, "cannot build model: {reason}"),
            MlErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {what}: got {got:?}, expected {expected:?}"
            ),
            MlErr::EmptyBatches { what } => {
                write!(f, "the {what} batches are empty, there is nothing to average")
            }
            MlErr::InvalidLabel { label, classes } => {
                write!(f, "label {label} is out of range for {classes} classes")
            }
            MlErr::MissingParam { key } => write!(f, "missing parameter '{key}' in state dict"),
            MlErr::UnexpectedParam { key } => {
                write!(f, "unexpected parameter '{key}' in state dict")
            }
            MlErr::MissingForwardCache => write!(
                f,
                "backward requires a forward pass with gradient tracking enabled"
            ),
            MlErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            MlErr::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            MlErr::Init(e) => write!(f, "parameter initialization failed: {e}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
            MlErr::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Init(e) => Some(e),
            MlErr::Io(e) => Some(e),
            MlErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<RandErr> for MlErr {
    fn from(value: RandErr) -> Self {
        Self::Init(value)
    }
}
