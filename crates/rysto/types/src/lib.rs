//! Rysto Types - the shared vocabulary of the Rysto platform.
//!
//! Every service (accounts, stories, voting) speaks in these types:
//! - [`Identity`]: the email that names a principal
//! - [`Credential`]: the stored secret hash for an identity
//! - [`Story`] / [`Continuation`]: authored content and its acceptance state
//! - [`Vote`]: one voter's vote for a continuation
//! - [`Clock`]: an injectable time source

#![deny(unsafe_code)]

mod clock;
mod content;
mod identity;
mod ids;

pub use clock::{Clock, ManualClock, SystemClock};
pub use content::{AcceptanceState, Continuation, Story, Vote};
pub use identity::{Credential, Identity, IdentityError};
pub use ids::{ContinuationId, CredentialId, IdParseError, StoryId, VoteId};
