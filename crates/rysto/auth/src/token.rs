//! Signed session tokens.
//!
//! Tokens are HS256 JWTs carrying `{email, iat, exp, iss}`. Expiry is checked
//! against the caller-supplied `now` instead of the wall clock so that
//! verification is a pure function of token bytes, secret and time. A token
//! is still accepted at exactly `now == exp`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rysto_types::Identity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Issuer embedded in every token.
pub const TOKEN_ISSUER: &str = "rysto-auth-service";

/// Lifetime embedded in every token, in hours.
pub const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 72;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The codec was built with an empty secret.
    #[error("signing secret must not be empty")]
    EmptySecret,

    /// Encoding the claims failed.
    #[error("failed to sign token: {0}")]
    Signing(String),

    /// Bad signature, wrong issuer or malformed token.
    #[error("invalid token: {0}")]
    Invalid(String),

    /// `now` is past the token's `exp`.
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Issues and verifies session tokens with a process-wide secret.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    lifetime: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>, issuer: impl Into<String>) -> Result<Self, TokenError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            lifetime: Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS),
        })
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String, TokenError> {
        let iat = now.timestamp();
        let claims = TokenClaims {
            email: identity.as_str().to_string(),
            iat,
            exp: iat + self.lifetime.num_seconds(),
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Decode and check a token, returning the identity it was issued for.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenError> {
        Ok(Identity::new(self.claims(token, now)?.email))
    }

    pub fn claims(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is evaluated below against the injected `now`.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if now.timestamp() > data.claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret", TOKEN_ISSUER).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(
            TokenCodec::new("", TOKEN_ISSUER).unwrap_err(),
            TokenError::EmptySecret
        );
    }

    #[test]
    fn embeds_claims_with_72h_lifetime() {
        let codec = codec();
        let token = codec.issue(&Identity::new("a@x.com"), t0()).unwrap();
        let claims = codec.claims(&token, t0()).unwrap();

        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.iss, "rysto-auth-service");
        assert_eq!(claims.exp - claims.iat, 72 * 3600);
    }

    #[test]
    fn valid_at_expiry_and_rejected_one_second_later() {
        let codec = codec();
        let token = codec.issue(&Identity::new("a@x.com"), t0()).unwrap();

        let at_exp = t0() + Duration::hours(72);
        assert_eq!(
            codec.verify(&token, at_exp).unwrap(),
            Identity::new("a@x.com")
        );
        assert_eq!(
            codec.verify(&token, at_exp + Duration::seconds(1)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn foreign_secret_is_invalid() {
        let other = TokenCodec::new("other-secret", TOKEN_ISSUER).unwrap();
        let token = other.issue(&Identity::new("a@x.com"), t0()).unwrap();
        assert!(matches!(
            codec().verify(&token, t0()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn foreign_issuer_is_invalid() {
        let other = TokenCodec::new("test-secret", "someone-else").unwrap();
        let token = other.issue(&Identity::new("a@x.com"), t0()).unwrap();
        assert!(matches!(
            codec().verify(&token, t0()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn other_hmac_algorithm_is_invalid() {
        let claims = TokenClaims {
            email: "a@x.com".to_string(),
            iat: t0().timestamp(),
            exp: t0().timestamp() + 3600,
            iss: TOKEN_ISSUER.to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(
            codec().verify(&token, t0()),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn garbage_is_invalid() {
        for token in ["", "abc", "a.b.c", "not a token at all"] {
            assert!(matches!(
                codec().verify(token, t0()),
                Err(TokenError::Invalid(_))
            ));
        }
    }

    proptest! {
        #[test]
        fn issued_tokens_verify_to_their_identity(
            local in "[a-z0-9._%+-]{1,24}",
            domain in "[a-z0-9-]{1,16}",
            tld in "[a-z]{2,6}",
            offset in 0i64..(72 * 3600),
        ) {
            let identity = Identity::new(format!("{local}@{domain}.{tld}"));
            let codec = codec();
            let token = codec.issue(&identity, t0()).unwrap();
            prop_assert_eq!(codec.verify(&token, t0() + Duration::seconds(offset)).unwrap(), identity);
        }
    }
}
