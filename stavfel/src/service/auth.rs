//! Authentication seam.
//!
//! Token verification is an external concern; the service only needs to turn
//! a bearer token into a subject with scopes. Deployments plug in their own
//! [`AuthParser`]; [`StaticTokens`] covers development setups and tests.

use hashbrown::HashMap;

/// The identity behind a request.
#[derive(Debug, Clone, Default)]
pub struct AuthInfo {
    /// Who the caller is; recorded as `updated_by` on writes.
    pub subject: String,
    pub scopes: Vec<String>,
}

impl AuthInfo {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Maps a bearer token to an [`AuthInfo`], or rejects it.
pub trait AuthParser: Send + Sync {
    fn parse(&self, token: &str) -> Option<AuthInfo>;
}

/// A fixed token table, configured from the command line.
#[derive(Debug, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, AuthInfo>,
}

impl StaticTokens {
    pub fn new() -> StaticTokens {
        StaticTokens::default()
    }

    pub fn insert(
        &mut self,
        token: impl Into<String>,
        subject: impl Into<String>,
        scopes: Vec<String>,
    ) {
        self.tokens.insert(
            token.into(),
            AuthInfo {
                subject: subject.into(),
                scopes,
            },
        );
    }
}

impl AuthParser for StaticTokens {
    fn parse(&self, token: &str) -> Option<AuthInfo> {
        self.tokens.get(token).cloned()
    }
}
