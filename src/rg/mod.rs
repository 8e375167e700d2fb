//! ripgrep invocation: command building, process control and JSON records.

mod driver;
mod events;
mod process;

pub use driver::*;
pub use events::*;
pub use process::*;
