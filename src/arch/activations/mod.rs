mod log_softmax;
mod relu;

pub use log_softmax::{log_softmax, log_softmax_backward};
pub use relu::Relu;
