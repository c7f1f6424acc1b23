use crate::CredentialId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The email string that uniquely names a registered principal.
///
/// `Identity::parse` validates the shape of user input. `Identity::new`
/// wraps values that already passed validation once (token claims, stored
/// records) without re-checking them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    /// Validate and wrap an email address supplied by a client.
    pub fn parse(email: &str) -> Result<Self, IdentityError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(IdentityError::Empty);
        }
        if email.chars().any(char::is_whitespace) {
            return Err(IdentityError::Malformed(email.to_string()));
        }

        let mut parts = email.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            _ => return Err(IdentityError::Malformed(email.to_string())),
        };

        let domain_ok = domain.contains('.') && domain.split('.').all(|label| !label.is_empty());
        if local.is_empty() || !domain_ok {
            return Err(IdentityError::Malformed(email.to_string()));
        }

        Ok(Self(email.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("email is required")]
    Empty,

    #[error("'{0}' is not a valid email address")]
    Malformed(String),
}

/// A registered principal's stored credential.
///
/// Created at registration and never mutated afterwards. The hash is a PHC
/// string and is never serialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub email: Identity,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

impl Credential {
    pub fn new(email: Identity, password_hash: impl Into<String>) -> Self {
        Self {
            id: CredentialId::generate(),
            email,
            password_hash: password_hash.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        let identity = Identity::parse("a@x.com").unwrap();
        assert_eq!(identity.as_str(), "a@x.com");
        assert!(Identity::parse("  writer.one@stories.example.org ").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!(Identity::parse(""), Err(IdentityError::Empty));
        for bad in ["ax.com", "a@@x.com", "@x.com", "a@x", "a@x.", "a b@x.com", "a@.com"] {
            assert!(
                matches!(Identity::parse(bad), Err(IdentityError::Malformed(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn credential_hash_is_not_serialized() {
        let credential = Credential::new(Identity::new("a@x.com"), "$argon2id$secret");
        let json = serde_json::to_value(&credential).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "a@x.com");
    }
}
