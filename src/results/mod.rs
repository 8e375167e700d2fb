//! Result tree and the aggregator that builds it.

mod aggregator;
mod tree;

pub use aggregator::*;
pub use tree::*;
