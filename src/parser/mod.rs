//! Parsing of captured search output into result events.

mod events;
mod parse;
mod worker;

pub use events::*;
pub use parse::*;
pub use worker::*;
