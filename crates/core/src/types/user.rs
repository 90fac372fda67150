//! Identity projection mirrored from the external identity provider.

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// The signed-in user as last reported by the identity provider.
///
/// Only `uid` is guaranteed; everything else is whatever the provider knows.
/// Replaced wholesale on every session event, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

impl AuthenticatedUser {
    /// A user known only by uid.
    #[must_use]
    pub fn new(uid: impl Into<UserId>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
            photo_url: None,
        }
    }

    /// Best label for greeting the user: display name, then email, then uid.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.email.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| self.uid.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_label_fallbacks() {
        let mut user = AuthenticatedUser::new("uid-1");
        assert_eq!(user.label(), "uid-1");
        user.email = Some("moe@tavern.com".into());
        assert_eq!(user.label(), "moe@tavern.com");
        user.display_name = Some("Moe".into());
        assert_eq!(user.label(), "Moe");
    }

    #[test]
    fn test_wire_names() {
        let mut user = AuthenticatedUser::new("uid-1");
        user.photo_url = Some("https://img/moe.png".into());
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["uid"], "uid-1");
        assert_eq!(json["photoURL"], "https://img/moe.png");
        assert!(json["displayName"].is_null());
    }
}
