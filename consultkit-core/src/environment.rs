use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Backend environment the app talks to.
///
/// Each environment has its own API host, web host and account-storage tag so
/// that accounts for different environments can live side by side on a device.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    uniffi::Enum,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local or shared development backend.
    Development,
    /// Pre-production backend.
    Staging,
    /// Live backend.
    Production,
}

impl Environment {
    /// Tag appended to account storage keys (`alice__prod`).
    #[must_use]
    pub const fn storage_tag(self) -> &'static str {
        match self {
            Self::Development => "dev",
            Self::Staging => "staging",
            Self::Production => "prod",
        }
    }

    /// Resolves an environment from its storage tag.
    #[must_use]
    pub fn from_storage_tag(tag: &str) -> Option<Self> {
        [Self::Development, Self::Staging, Self::Production]
            .into_iter()
            .find(|env| env.storage_tag() == tag)
    }
}
