use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::{SlackUserId, WorkspaceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChickenId(pub Uuid);

impl ChickenId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chicken {
    pub id: ChickenId,
    pub workspace_id: WorkspaceId,
    pub owner_id: SlackUserId,
    pub name: Option<String>,
    pub awaiting_rename: bool,
    pub laid_today: bool,
    pub created_at: DateTime<Utc>,
}

impl Chicken {
    pub fn hatch(workspace_id: WorkspaceId, owner_id: SlackUserId, now: DateTime<Utc>) -> Self {
        Self {
            id: ChickenId::generate(),
            workspace_id,
            owner_id,
            name: None,
            awaiting_rename: false,
            laid_today: false,
            created_at: now,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("an unnamed chicken")
    }
}

/// Normalizes a requested chicken name. Returns `None` when nothing usable remains.
pub fn normalize_chicken_name(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }

    Some(collapsed.chars().take(MAX_CHICKEN_NAME_CHARS).collect())
}

pub const MAX_CHICKEN_NAME_CHARS: usize = 64;

#[cfg(test)]
mod tests {
    use super::{normalize_chicken_name, MAX_CHICKEN_NAME_CHARS};

    #[test]
    fn name_whitespace_is_collapsed() {
        assert_eq!(normalize_chicken_name("  Henrietta   the  Great "), Some("Henrietta the Great".to_owned()));
    }

    #[test]
    fn blank_name_is_rejected() {
        assert_eq!(normalize_chicken_name(" \t\n "), None);
    }

    #[test]
    fn long_name_is_truncated_on_char_boundary() {
        let long = "é".repeat(MAX_CHICKEN_NAME_CHARS + 10);
        let normalized = normalize_chicken_name(&long).expect("name");
        assert_eq!(normalized.chars().count(), MAX_CHICKEN_NAME_CHARS);
    }
}
