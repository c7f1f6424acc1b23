//! API request handlers

mod accounts;
mod health;
mod stories;
mod votes;

pub use accounts::*;
pub use health::*;
pub use stories::*;
pub use votes::*;
