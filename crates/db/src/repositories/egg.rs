use chrono::NaiveDate;
use sqlx::{Row, SqliteConnection};

use henhouse_core::domain::egg::Egg;
use henhouse_core::domain::user::{SlackUserId, WorkspaceId};

use super::chicken::row_to_chicken;
use super::{
    format_date, parse_date, EggRepository, LayEggsRequest, LayEggsResult, RepositoryError,
};
use crate::DbPool;

pub struct SqlEggRepository {
    pool: DbPool,
}

impl SqlEggRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn last_refreshed_on(
    conn: &mut SqliteConnection,
    workspace_id: &WorkspaceId,
    user_id: &SlackUserId,
) -> Result<Option<NaiveDate>, RepositoryError> {
    let row = sqlx::query(
        "SELECT daily_eggs_last_refreshed_on FROM slack_user WHERE workspace_id = ? AND user_id = ?",
    )
    .bind(&workspace_id.0)
    .bind(&user_id.0)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| RepositoryError::NotFound(format!("slack user {workspace_id}/{user_id}")))?;

    let raw: Option<String> = row
        .try_get("daily_eggs_last_refreshed_on")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    raw.as_deref().map(parse_date).transpose()
}

fn is_stale(refreshed_on: Option<NaiveDate>, today: NaiveDate) -> bool {
    refreshed_on.map_or(true, |date| date < today)
}

#[async_trait::async_trait]
impl EggRepository for SqlEggRepository {
    async fn lay_eggs(&self, request: LayEggsRequest) -> Result<LayEggsResult, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let workspace_id = &request.workspace_id;
        let giver_id = &request.giver_id;

        let refreshed_on = last_refreshed_on(&mut *tx, workspace_id, giver_id).await?;
        if is_stale(refreshed_on, request.today) {
            sqlx::query("UPDATE chicken SET laid_today = 0 WHERE workspace_id = ? AND owner_id = ?")
                .bind(&workspace_id.0)
                .bind(&giver_id.0)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE slack_user SET daily_eggs_last_refreshed_on = ?
                 WHERE workspace_id = ? AND user_id = ?",
            )
            .bind(format_date(request.today))
            .bind(&workspace_id.0)
            .bind(&giver_id.0)
            .execute(&mut *tx)
            .await?;
        }

        let rows = sqlx::query(
            "SELECT id, workspace_id, owner_id, name, awaiting_rename, laid_today, created_at
             FROM chicken
             WHERE workspace_id = ? AND owner_id = ? AND laid_today = 0
             ORDER BY created_at, rowid",
        )
        .bind(&workspace_id.0)
        .bind(&giver_id.0)
        .fetch_all(&mut *tx)
        .await?;
        let layers = rows.iter().map(row_to_chicken).collect::<Result<Vec<_>, _>>()?;

        let available = u32::try_from(layers.len()).unwrap_or(u32::MAX);
        let requested = request.total_requested();
        if available < requested {
            tx.rollback().await?;
            return Ok(LayEggsResult::Insufficient { available, requested });
        }

        let mut eggs = Vec::with_capacity(layers.len());
        let mut layers = layers.into_iter();
        for recipient in &request.recipients {
            for _ in 0..request.eggs_per_recipient {
                let Some(chicken) = layers.next() else {
                    return Err(RepositoryError::Decode(
                        "ran out of laying chickens after availability check".to_owned(),
                    ));
                };
                let egg = Egg::lay(
                    chicken.id,
                    workspace_id.clone(),
                    giver_id.clone(),
                    recipient.clone(),
                    request.now,
                );

                sqlx::query(
                    "INSERT INTO egg (id, workspace_id, laid_by, given_by, owned_by, laid_on, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(egg.id.0.to_string())
                .bind(&egg.workspace_id.0)
                .bind(egg.laid_by.0.to_string())
                .bind(&egg.given_by.0)
                .bind(&egg.owned_by.0)
                .bind(format_date(request.today))
                .bind(egg.created_at.to_rfc3339())
                .execute(&mut *tx)
                .await?;

                sqlx::query("UPDATE chicken SET laid_today = 1 WHERE id = ?")
                    .bind(chicken.id.0.to_string())
                    .execute(&mut *tx)
                    .await?;

                eggs.push(Egg { laid_on: request.today, ..egg });
            }
        }

        tx.commit().await?;
        Ok(LayEggsResult::Laid { eggs, remaining_today: available - requested })
    }

    async fn count_received(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM egg WHERE workspace_id = ? AND owned_by = ?")
                .bind(&workspace_id.0)
                .bind(&owner_id.0)
                .fetch_one(&self.pool)
                .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn available_today(
        &self,
        workspace_id: &WorkspaceId,
        giver_id: &SlackUserId,
        today: NaiveDate,
    ) -> Result<u32, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let refreshed_on = last_refreshed_on(&mut *conn, workspace_id, giver_id).await?;

        let query = if is_stale(refreshed_on, today) {
            "SELECT COUNT(*) FROM chicken WHERE workspace_id = ? AND owner_id = ?"
        } else {
            "SELECT COUNT(*) FROM chicken WHERE workspace_id = ? AND owner_id = ? AND laid_today = 0"
        };
        let count: i64 = sqlx::query_scalar(query)
            .bind(&workspace_id.0)
            .bind(&giver_id.0)
            .fetch_one(&mut *conn)
            .await?;

        Ok(u32::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use henhouse_core::domain::user::{SlackUserId, WorkspaceId};

    use crate::repositories::{
        EggRepository, LayEggsRequest, LayEggsResult, SlackUserRepository, SqlEggRepository,
        SqlSlackUserRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    fn workspace() -> WorkspaceId {
        WorkspaceId("W1".to_owned())
    }

    fn user(id: &str) -> SlackUserId {
        SlackUserId(id.to_owned())
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).expect("date")
    }

    async fn seeded_pool(users: &[&str]) -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repo = SqlSlackUserRepository::new(pool.clone());
        for id in users {
            repo.ensure_provisioned(&workspace(), &user(id), 5, Utc::now())
                .await
                .expect("provision");
        }
        pool
    }

    fn request(recipients: &[&str], eggs: u32, today: NaiveDate) -> LayEggsRequest {
        LayEggsRequest {
            workspace_id: workspace(),
            giver_id: user("UGIVER"),
            recipients: recipients.iter().map(|id| user(id)).collect(),
            eggs_per_recipient: eggs,
            today,
            now: today.and_hms_opt(12, 0, 0).expect("noon").and_utc(),
        }
    }

    #[tokio::test]
    async fn lays_same_count_for_each_recipient() {
        let pool = seeded_pool(&["UGIVER", "UA", "UB"]).await;
        let repo = SqlEggRepository::new(pool);

        let result = repo.lay_eggs(request(&["UA", "UB"], 2, day(1))).await.expect("lay");

        let LayEggsResult::Laid { eggs, remaining_today } = result else {
            panic!("expected eggs to be laid");
        };
        assert_eq!(eggs.len(), 4);
        assert_eq!(remaining_today, 1);
        assert_eq!(repo.count_received(&workspace(), &user("UA")).await.expect("count"), 2);
        assert_eq!(repo.count_received(&workspace(), &user("UB")).await.expect("count"), 2);
        let available =
            repo.available_today(&workspace(), &user("UGIVER"), day(1)).await.expect("available");
        assert_eq!(available, 1);
    }

    #[tokio::test]
    async fn insufficient_allowance_lays_nothing() {
        let pool = seeded_pool(&["UGIVER", "UA", "UB", "UC"]).await;
        let repo = SqlEggRepository::new(pool);

        let result = repo.lay_eggs(request(&["UA", "UB", "UC"], 2, day(1))).await.expect("lay");

        assert_eq!(result, LayEggsResult::Insufficient { available: 5, requested: 6 });
        for id in ["UA", "UB", "UC"] {
            assert_eq!(repo.count_received(&workspace(), &user(id)).await.expect("count"), 0);
        }
    }

    #[tokio::test]
    async fn allowance_refreshes_on_a_new_day() {
        let pool = seeded_pool(&["UGIVER", "UA"]).await;
        let repo = SqlEggRepository::new(pool);

        repo.lay_eggs(request(&["UA"], 5, day(1))).await.expect("lay day one");
        let exhausted = repo.lay_eggs(request(&["UA"], 1, day(1))).await.expect("lay again");
        assert_eq!(exhausted, LayEggsResult::Insufficient { available: 0, requested: 1 });
        let available =
            repo.available_today(&workspace(), &user("UGIVER"), day(2)).await.expect("available");
        assert_eq!(available, 5);

        let next_day = repo.lay_eggs(request(&["UA"], 1, day(2))).await.expect("lay day two");
        assert!(matches!(next_day, LayEggsResult::Laid { remaining_today: 4, .. }));
        assert_eq!(repo.count_received(&workspace(), &user("UA")).await.expect("count"), 6);
    }

    #[tokio::test]
    async fn unknown_giver_is_reported() {
        let pool = seeded_pool(&["UA"]).await;
        let repo = SqlEggRepository::new(pool);

        let error = repo.lay_eggs(request(&["UA"], 1, day(1))).await.expect_err("no giver");
        assert!(matches!(error, crate::repositories::RepositoryError::NotFound(_)));
    }
}
