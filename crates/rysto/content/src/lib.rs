//! Rysto content: stories, continuations and acceptance.
//!
//! Mutations are authorised by [`OwnershipGuard`] and executed as single
//! filtered store writes. A missing document and a document owned by someone
//! else are reported identically.

#![deny(unsafe_code)]

mod acceptance;
mod error;
mod guard;
mod service;

pub use acceptance::{AcceptanceOutcome, AcceptanceWorkflow};
pub use error::{ContentError, ContentResult};
pub use guard::OwnershipGuard;
pub use service::{ContentService, StoryQuery, StoryThread};
