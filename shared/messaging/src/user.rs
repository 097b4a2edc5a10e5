//! User profile records, read-only from the chat engine's perspective.

use serde::{Deserialize, Serialize};

/// A row of the `users/{userId}` tree. The engine reads languages,
/// display names, and search fields; writes belong to account management.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
}

impl UserProfile {
    /// Case-insensitive substring match on username or email.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.username.to_lowercase().contains(&query)
            || self.email.to_lowercase().contains(&query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(username: &str, email: &str) -> UserProfile {
        UserProfile {
            user_id: "u1".into(),
            username: username.into(),
            email: email.into(),
            language: None,
            profile_image_url: None,
        }
    }

    #[test]
    fn match_is_case_insensitive() {
        let user = profile("Alice", "alice@example.com");
        assert!(user.matches("ali"));
        assert!(user.matches("ALICE"));
        assert!(user.matches("example.com"));
        assert!(!user.matches("bob"));
    }
}
