use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use henhouse_core::domain::chicken::{Chicken, ChickenId};
use henhouse_core::domain::user::{SlackUserId, WorkspaceId};

use super::{parse_timestamp, ChickenRepository, RepositoryError};
use crate::DbPool;

pub struct SqlChickenRepository {
    pool: DbPool,
}

impl SqlChickenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const CHICKEN_COLUMNS: &str =
    "id, workspace_id, owner_id, name, awaiting_rename, laid_today, created_at";

pub(crate) fn row_to_chicken(row: &sqlx::sqlite::SqliteRow) -> Result<Chicken, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let workspace_id: String =
        row.try_get("workspace_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let owner_id: String =
        row.try_get("owner_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: Option<String> =
        row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let awaiting_rename: bool =
        row.try_get("awaiting_rename").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let laid_today: bool =
        row.try_get("laid_today").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let id = Uuid::parse_str(&id)
        .map_err(|e| RepositoryError::Decode(format!("invalid chicken id `{id}`: {e}")))?;

    Ok(Chicken {
        id: ChickenId(id),
        workspace_id: WorkspaceId(workspace_id),
        owner_id: SlackUserId(owner_id),
        name,
        awaiting_rename,
        laid_today,
        created_at: parse_timestamp(&created_at)?,
    })
}

pub(crate) async fn insert_chicken(
    conn: &mut SqliteConnection,
    chicken: &Chicken,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO chicken (id, workspace_id, owner_id, name, awaiting_rename, laid_today, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(chicken.id.0.to_string())
    .bind(&chicken.workspace_id.0)
    .bind(&chicken.owner_id.0)
    .bind(&chicken.name)
    .bind(chicken.awaiting_rename)
    .bind(chicken.laid_today)
    .bind(chicken.created_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl ChickenRepository for SqlChickenRepository {
    async fn list_for_owner(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<Vec<Chicken>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CHICKEN_COLUMNS} FROM chicken
             WHERE workspace_id = ? AND owner_id = ?
             ORDER BY created_at, rowid"
        ))
        .bind(&workspace_id.0)
        .bind(&owner_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_chicken).collect()
    }

    async fn find_awaiting_rename(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<Option<Chicken>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CHICKEN_COLUMNS} FROM chicken
             WHERE workspace_id = ? AND owner_id = ? AND awaiting_rename = 1
             ORDER BY created_at, rowid
             LIMIT 1"
        ))
        .bind(&workspace_id.0)
        .bind(&owner_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_chicken).transpose()
    }

    async fn mark_all_awaiting_rename(
        &self,
        workspace_id: &WorkspaceId,
        owner_id: &SlackUserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE chicken SET awaiting_rename = 1 WHERE workspace_id = ? AND owner_id = ?",
        )
        .bind(&workspace_id.0)
        .bind(&owner_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn rename_if_awaiting(
        &self,
        id: &ChickenId,
        name: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE chicken SET name = ?, awaiting_rename = 0 WHERE id = ? AND awaiting_rename = 1",
        )
        .bind(name)
        .bind(id.0.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use henhouse_core::domain::chicken::ChickenId;
    use henhouse_core::domain::user::{SlackUserId, WorkspaceId};

    use crate::repositories::{
        ChickenRepository, SlackUserRepository, SqlChickenRepository, SqlSlackUserRepository,
    };
    use crate::{connect_with_settings, migrations};

    async fn provisioned_repo(chickens: u32) -> (SqlChickenRepository, WorkspaceId, SlackUserId) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let workspace = WorkspaceId("W1".to_owned());
        let user = SlackUserId("U1".to_owned());
        SqlSlackUserRepository::new(pool.clone())
            .ensure_provisioned(&workspace, &user, chickens, Utc::now())
            .await
            .expect("provision");
        (SqlChickenRepository::new(pool), workspace, user)
    }

    #[tokio::test]
    async fn no_chicken_awaits_rename_by_default() {
        let (repo, workspace, user) = provisioned_repo(3).await;

        let pending = repo.find_awaiting_rename(&workspace, &user).await.expect("find");
        assert_eq!(pending, None);
    }

    #[tokio::test]
    async fn renaming_walks_chickens_in_hatch_order() {
        let (repo, workspace, user) = provisioned_repo(2).await;
        let hatched = repo.list_for_owner(&workspace, &user).await.expect("list");

        assert_eq!(repo.mark_all_awaiting_rename(&workspace, &user).await.expect("mark"), 2);

        let first = repo.find_awaiting_rename(&workspace, &user).await.expect("find").expect("first");
        assert_eq!(first.id, hatched[0].id);
        assert!(repo.rename_if_awaiting(&first.id, "Henrietta").await.expect("rename"));

        let second =
            repo.find_awaiting_rename(&workspace, &user).await.expect("find").expect("second");
        assert_eq!(second.id, hatched[1].id);
        assert!(repo.rename_if_awaiting(&second.id, "Clucky").await.expect("rename"));

        assert_eq!(repo.find_awaiting_rename(&workspace, &user).await.expect("find"), None);
        let names: Vec<_> = repo
            .list_for_owner(&workspace, &user)
            .await
            .expect("list")
            .into_iter()
            .map(|chicken| chicken.name)
            .collect();
        assert_eq!(names, vec![Some("Henrietta".to_owned()), Some("Clucky".to_owned())]);
    }

    #[tokio::test]
    async fn stale_rename_is_not_applied() {
        let (repo, workspace, user) = provisioned_repo(1).await;
        repo.mark_all_awaiting_rename(&workspace, &user).await.expect("mark");
        let pending =
            repo.find_awaiting_rename(&workspace, &user).await.expect("find").expect("pending");

        assert!(repo.rename_if_awaiting(&pending.id, "First").await.expect("rename"));
        assert!(!repo.rename_if_awaiting(&pending.id, "Second").await.expect("stale rename"));

        let chickens = repo.list_for_owner(&workspace, &user).await.expect("list");
        assert_eq!(chickens[0].name.as_deref(), Some("First"));
    }

    #[tokio::test]
    async fn renaming_unknown_chicken_is_a_no_op() {
        let (repo, _, _) = provisioned_repo(1).await;

        let applied = repo.rename_if_awaiting(&ChickenId::generate(), "Ghost").await.expect("rename");
        assert!(!applied);
    }
}
