use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Display data the profile service supplies for listing rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
}

impl DisplayInfo {
    /// Case-insensitive substring match against first or last name.
    pub fn matches_name(&self, filter: &str) -> bool {
        let needle = filter.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.first_name.to_lowercase().contains(&needle)
            || self.last_name.to_lowercase().contains(&needle)
    }
}

/// A profile record as held by the identity collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub display: DisplayInfo,
    /// Denormalized number of `Connected` edges touching this identity.
    pub connection_count: i64,
}

impl Profile {
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            display: DisplayInfo {
                user_id: UserId::new(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                picture: None,
                headline: None,
            },
            connection_count: 0,
        }
    }

    pub fn id(&self) -> UserId {
        self.display.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_filter_is_case_insensitive_substring() {
        let profile = Profile::new("Ada", "Lovelace");
        assert!(profile.display.matches_name("love"));
        assert!(profile.display.matches_name("ADA"));
        assert!(profile.display.matches_name("  "));
        assert!(!profile.display.matches_name("babbage"));
    }
}
