//! rgscope - search a directory tree with ripgrep and browse the matches.

pub mod config;
pub mod display;
pub mod parser;
pub mod results;
pub mod rg;
pub mod search;
