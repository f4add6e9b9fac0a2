//! Caller identity verification.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::{AuthError, ConfigError};

/// A verified caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub subject_id: String,
    pub email: String,
    pub display_name: String,
}

impl Identity {
    pub fn new(
        subject_id: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            email: email.into(),
            display_name: display_name.into(),
        }
    }
}

/// Turns a bearer credential into an [`Identity`].
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, bearer: &str) -> Result<Identity, AuthError>;
}

/// Fixed token → identity table, loaded from configuration.
#[derive(Default)]
pub struct StaticTokenVerifier {
    entries: Vec<(SecretString, Identity)>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.entries.push((SecretString::from(token.into()), identity));
        self
    }

    /// Parse `token|subject|email|name` entries separated by `;`.
    pub fn parse(entries: &str) -> Result<Self, ConfigError> {
        let mut verifier = Self::new();
        let mut seen = HashMap::new();
        for entry in entries.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split('|').map(str::trim).collect();
            let [token, subject, email, name] = parts.as_slice() else {
                return Err(ConfigError::InvalidValue {
                    key: "GATEWAY_TOKENS".to_string(),
                    value: "expected token|subject|email|name".to_string(),
                });
            };
            if token.is_empty() || subject.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "GATEWAY_TOKENS".to_string(),
                    value: format!("empty token or subject for '{}'", subject),
                });
            }
            if seen.insert(token.to_string(), ()).is_some() {
                return Err(ConfigError::InvalidValue {
                    key: "GATEWAY_TOKENS".to_string(),
                    value: format!("duplicate token for subject '{}'", subject),
                });
            }
            verifier = verifier.with_token(*token, Identity::new(*subject, *email, *name));
        }
        Ok(verifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, bearer: &str) -> Result<Identity, AuthError> {
        let bearer = bearer.trim();
        if bearer.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        // Compare against every entry so timing does not reveal the match position.
        let mut matched = None;
        for (token, identity) in &self.entries {
            if bool::from(token.expose_secret().as_bytes().ct_eq(bearer.as_bytes())) {
                matched = Some(identity);
            }
        }
        matched.cloned().ok_or(AuthError::InvalidCredential)
    }
}

/// Extract the credential from an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}
