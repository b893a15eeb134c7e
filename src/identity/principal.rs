use serde::{Deserialize, Serialize};

/// Account snapshot as reported by the identity provider.
///
/// Always replaced wholesale on refresh; nothing mutates a snapshot in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email_verified: bool,
}
