//! # dbot-state
//!
//! Short-lived per-user conversation state: an in-memory cache with TTL expiry and
//! capacity-bounded eviction ([`StateStore`]), backed by pluggable [`StatePersistence`] hooks.
//! Also provides per-user serialization locks so one user's updates never interleave their
//! `get -> mutate -> set` sequences.

pub mod clock;
pub mod persistence;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use persistence::{InMemoryPersistence, NoopPersistence, StatePersistence, StateValue};
pub use store::{StateConfig, StateStore, SweepReport};
