//! Rysto authentication.
//!
//! Session tokens are signed JWTs, but a token alone is not enough: the
//! server also keeps a registration per token in a [`SessionStore`] so that
//! logout can revoke it. [`AuthGate`] checks both on every protected request.
//! [`AccountService`] implements register/login/logout on top.

#![deny(unsafe_code)]

pub mod accounts;
pub mod gate;
pub mod password;
pub mod session;
pub mod token;

pub use accounts::{AccountError, AccountService, Profile, MIN_PASSWORD_LEN};
pub use gate::{parse_bearer, AuthError, AuthGate, AuthRejection, GateMode, Principal};
pub use password::{hash_password, verify_password, PasswordError, DECOY_HASH};
pub use session::{token_prefix, SessionStore, DEFAULT_SESSION_TTL_HOURS};
pub use token::{TokenClaims, TokenCodec, TokenError, DEFAULT_TOKEN_LIFETIME_HOURS, TOKEN_ISSUER};
