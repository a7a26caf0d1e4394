use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlackUserId(pub String);

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SlackUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl SlackUserId {
    /// Slack mention markup for this user, e.g. `<@U1234>`.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackUser {
    pub workspace_id: WorkspaceId,
    pub user_id: SlackUserId,
    pub is_active: bool,
    pub daily_eggs_last_refreshed_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl SlackUser {
    pub fn new(workspace_id: WorkspaceId, user_id: SlackUserId, now: DateTime<Utc>) -> Self {
        Self {
            workspace_id,
            user_id,
            is_active: true,
            daily_eggs_last_refreshed_on: None,
            created_at: now,
        }
    }

    /// True when the user's chickens have not been refreshed yet on `today`.
    pub fn needs_daily_refresh(&self, today: NaiveDate) -> bool {
        self.daily_eggs_last_refreshed_on.map_or(true, |refreshed| refreshed < today)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{SlackUser, SlackUserId, WorkspaceId};

    #[test]
    fn new_user_needs_refresh() {
        let user = SlackUser::new(
            WorkspaceId("W1".to_owned()),
            SlackUserId("U1".to_owned()),
            Utc::now(),
        );
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");

        assert!(user.needs_daily_refresh(today));
    }

    #[test]
    fn user_refreshed_today_does_not_need_refresh() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
        let mut user = SlackUser::new(
            WorkspaceId("W1".to_owned()),
            SlackUserId("U1".to_owned()),
            Utc::now(),
        );
        user.daily_eggs_last_refreshed_on = Some(today);

        assert!(!user.needs_daily_refresh(today));
        assert!(user.needs_daily_refresh(today.succ_opt().expect("next day")));
    }

    #[test]
    fn mention_uses_slack_markup() {
        assert_eq!(SlackUserId("U42".to_owned()).mention(), "<@U42>");
    }
}
