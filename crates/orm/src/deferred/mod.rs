//! Deferred relation bindings
//!
//! Relation changes made against a parent that has no primary key yet (or
//! that an editing session has not confirmed) are written to a ledger table
//! keyed by session. Saving the parent with the same session key replays
//! them; cancelling the session or `clean_up` discards them.

pub mod binding;
pub mod ledger;

pub use binding::{resolve_bindings, BindingGroup, DeferredBinding};
pub use ledger::{CommitPhase, DeferredLedger, Membership};
