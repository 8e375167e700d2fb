//! Search orchestration: parameters, phase state, history and the pipeline.

mod error;
mod history;
mod orchestrator;
mod params;
mod state;

pub use error::*;
pub use history::*;
pub use orchestrator::*;
pub use params::*;
pub use state::*;
