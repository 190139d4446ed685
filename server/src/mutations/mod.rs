//! Mutation coordinator
//!
//! Serializes concurrent updates to shared aggregate fields — reaction
//! counts, poll vote counts, per-member unread counters — so they stay
//! arithmetically consistent under concurrent writers. Store transactions
//! are the only consistency mechanism; derived aggregates are recomputed in
//! full from their detailed source of truth, never incrementally drifted.
//!
//! A committed mutation and its broadcast are decoupled: handlers emit
//! events only after the commit succeeds, and a failed broadcast never
//! rolls the data back.

pub mod polls;
pub mod reactions;
pub mod unread;

pub use polls::toggle_poll_vote;
pub use reactions::{apply_reaction, clear_all_reactions, ReactionOutcome};
pub use unread::{increment_unread, reset_unread};
