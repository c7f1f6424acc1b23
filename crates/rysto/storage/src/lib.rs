//! Rysto storage contracts.
//!
//! This crate defines the narrow store interfaces the Rysto services need:
//! - credentials (find / count / insert with unique identity)
//! - stories and continuations (insert, find, filtered update/delete)
//! - votes (one per continuation and voter)
//! - the session cache (get / set / delete / exists with TTL)
//!
//! Design stance:
//! - A single filtered write is the unit of atomicity. Filters for
//!   single-document writes must name the document id.
//! - There are no cross-document transactions; callers that touch two
//!   documents compensate on their own.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use model::{
    ContinuationFilter, ContinuationPatch, SlotFilter, StoryFilter, StoryPatch, WriteOutcome,
};
pub use traits::{
    ContentStore, ContinuationStore, CredentialStore, RystoStorage, SessionCache, StoryStore,
    VoteStore,
};
