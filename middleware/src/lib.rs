//! Reusable middleware actions for [`handler_chain::Bot`]: update logging and a sender allowlist.

mod middleware;

pub use middleware::{AllowlistMiddleware, LoggingMiddleware};

#[cfg(test)]
mod test;
