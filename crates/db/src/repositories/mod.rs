use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use henhouse_core::domain::chicken::{Chicken, ChickenId};
use henhouse_core::domain::egg::Egg;
use henhouse_core::domain::user::{SlackUser, SlackUserId, WorkspaceId};

pub mod chicken;
pub mod egg;
pub mod memory;
pub mod user;

pub use chicken::SqlChickenRepository;
pub use egg::SqlEggRepository;
pub use memory::InMemoryHenhouse;
pub use user::SqlSlackUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provisioned {
    pub user: SlackUser,
    /// True when this call created the user and hatched their chickens.
    pub created: bool,
}

#[async_trait]
pub trait SlackUserRepository: Send + Sync {
    async fn find(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &SlackUserId,
    ) -> Result<Option<SlackUser>, RepositoryError>;

    /// Returns the user, creating it with `chickens` freshly hatched chickens
    /// when it does not exist yet.
    async fn ensure_provisioned(
        &self,
        workspace_id: &WorkspaceId,
        user_id: &SlackUserId,
        chickens: u32,
        now: DateTime<Utc>,
    ) -> Result<Provisioned, RepositoryError>;
}

#[async_trait]
pub trait ChickenRepository: Send + Sync {
    /// Chickens in hatch order.
    async fn list_for_owner(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<Vec<Chicken>, RepositoryError>;

    /// The earliest-hatched chicken of this owner that is awaiting a new name.
    async fn find_awaiting_rename(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<Option<Chicken>, RepositoryError>;

    /// Flags every chicken of the owner as awaiting a rename. Returns how many were flagged.
    async fn mark_all_awaiting_rename(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<u64, RepositoryError>;

    /// Renames the chicken only if it is still awaiting a rename; returns
    /// whether the rename was applied.
    async fn rename_if_awaiting(&self, id: &ChickenId, name: &str)
        -> Result<bool, RepositoryError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayEggsRequest {
    pub workspace_id: WorkspaceId,
    pub giver_id: SlackUserId,
    pub recipients: Vec<SlackUserId>,
    pub eggs_per_recipient: u32,
    pub today: NaiveDate,
    pub now: DateTime<Utc>,
}

impl LayEggsRequest {
    pub fn total_requested(&self) -> u32 {
        let recipients = u32::try_from(self.recipients.len()).unwrap_or(u32::MAX);
        self.eggs_per_recipient.saturating_mul(recipients)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayEggsResult {
    Laid { eggs: Vec<Egg>, remaining_today: u32 },
    Insufficient { available: u32, requested: u32 },
}

#[async_trait]
pub trait EggRepository: Send + Sync {
    /// Lays `eggs_per_recipient` eggs for every recipient from the giver's
    /// chickens, refreshing the giver's chickens first when `today` is a new
    /// day. Either every egg is laid or none is.
    async fn lay_eggs(&self, request: LayEggsRequest) -> Result<LayEggsResult, RepositoryError>;

    async fn count_received(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<u64, RepositoryError>;

    /// Eggs the giver can still give on `today`.
    async fn available_today(
        &self,
        workspace_id: &WorkspaceId,
        giver_id: &SlackUserId,
        today: NaiveDate,
    ) -> Result<u32, RepositoryError>;
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("invalid date `{raw}`: {error}")))
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
