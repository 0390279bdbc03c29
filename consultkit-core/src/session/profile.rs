use serde::{Deserialize, Serialize};

/// Practitioner profile returned by `practice/profile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct Profile {
    /// Server identifier.
    pub id: u64,
    /// Login name.
    pub username: String,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Role within the practice (`doctor`, `nurse`, `admin`, ...).
    pub role: String,
    /// Premium account tier.
    #[serde(default)]
    pub is_premium: bool,
}
