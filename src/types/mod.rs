// ABOUTME: Validated domain types shared across deckhand.
// ABOUTME: Component names, commit references, and recorded revisions.

mod commit_ref;
mod component_name;
mod revision;

pub use commit_ref::{CommitRef, CommitRefError};
pub use component_name::{ComponentName, ComponentNameError};
pub use revision::Revision;
