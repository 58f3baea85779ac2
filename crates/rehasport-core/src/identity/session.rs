use crate::{
    error::InternalError,
    types::{PrincipalId, Timestamp},
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

///
/// SessionClaims
///
/// What the identity provider vouches for about a token.
/// `metadata_role` is the raw signup metadata, if any.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionClaims {
    pub subject: PrincipalId,
    pub email: Option<String>,
    pub metadata_role: Option<String>,
    pub expires_at: Timestamp,
}

impl SessionClaims {
    #[must_use]
    pub fn new(subject: impl Into<PrincipalId>, expires_at: Timestamp) -> Self {
        Self {
            subject: subject.into(),
            email: None,
            metadata_role: None,
            expires_at,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_metadata_role(mut self, role: impl Into<String>) -> Self {
        self.metadata_role = Some(role.into());
        self
    }

    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

///
/// SessionResolver
///
/// External identity provider. Tokens are opaque; `Ok(None)` means the
/// provider does not recognise the token.
///

#[async_trait]
pub trait SessionResolver: Send + Sync + 'static {
    async fn resolve(&self, token: &str) -> Result<Option<SessionClaims>, InternalError>;
}

///
/// StaticSessionResolver
///
/// In-process token table.
///

#[derive(Debug, Default)]
pub struct StaticSessionResolver {
    sessions: RwLock<HashMap<String, SessionClaims>>,
}

impl StaticSessionResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, token: impl Into<String>, claims: SessionClaims) {
        self.sessions.write().insert(token.into(), claims);
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }
}

#[async_trait]
impl SessionResolver for StaticSessionResolver {
    async fn resolve(&self, token: &str) -> Result<Option<SessionClaims>, InternalError> {
        Ok(self.sessions.read().get(token).cloned())
    }
}
