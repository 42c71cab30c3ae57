//! Runnable bots built on the handler chain, plus the shared launcher the binaries use.

pub mod counter;
pub mod form;
mod launch;

pub use launch::{launch, log_file_ready};
