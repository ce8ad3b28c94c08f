//! Login credentials and identity-provider selection.

use std::fmt;
use std::str::FromStr;

use crate::error::PassabotError;

/// SPID identity provider used for the federated login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityProviderKind {
    /// PosteID, with second factor via push approval in the PosteID app.
    #[default]
    PosteId,
}

impl IdentityProviderKind {
    /// SAML entity id the booking site uses to select this provider.
    pub fn entity_id(&self) -> &'static str {
        match self {
            Self::PosteId => "https://posteid.poste.it",
        }
    }

    /// Short configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PosteId => "posteid",
        }
    }
}

impl fmt::Display for IdentityProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityProviderKind {
    type Err = PassabotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "posteid" | "poste" | "https://posteid.poste.it" => Ok(Self::PosteId),
            other => Err(PassabotError::Config(format!(
                "unsupported identity provider: {}",
                other
            ))),
        }
    }
}

/// Username/password pair for the identity provider.
///
/// Immutable once built. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
    provider: IdentityProviderKind,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        provider: IdentityProviderKind,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            provider,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn provider(&self) -> IdentityProviderKind {
        self.provider
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("provider", &self.provider)
            .finish()
    }
}
