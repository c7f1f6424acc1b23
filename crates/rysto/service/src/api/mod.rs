//! HTTP API

pub mod handlers;
mod router;

pub use router::{auth_router, story_router, vote_router};
