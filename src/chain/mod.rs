//! Chain construction and the assembled chain controller.

mod builder;
mod controller;

pub use builder::{ChainBuilder, ContainingTask, OperatorFactory};
pub use controller::OperatorChain;
