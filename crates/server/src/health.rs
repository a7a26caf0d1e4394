use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use henhouse_db::DbPool;
use serde::Serialize;
use tracing::{error, info, warn};

/// Tables the bot reads and writes on every event.
const HENHOUSE_TABLES: [&str; 3] = ["slack_user", "chicken", "egg"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

/// Row counts reported once the schema is in place.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Flock {
    pub users: i64,
    pub chickens: i64,
    pub eggs: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_tables: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flock: Option<Flock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_error: Option<String>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(db_pool)
}

pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Ready only when the database answers and every henhouse table exists.
pub async fn health(State(pool): State<DbPool>) -> (StatusCode, Json<HealthReport>) {
    let mut report = HealthReport {
        status: Readiness::Degraded,
        missing_tables: Vec::new(),
        flock: None,
        database_error: None,
        checked_at: Utc::now().to_rfc3339(),
    };

    match inspect(&pool).await {
        Ok(Schema::Migrated(flock)) => {
            report.status = Readiness::Ready;
            report.flock = Some(flock);
        }
        Ok(Schema::Missing(tables)) => report.missing_tables = tables,
        Err(error) => report.database_error = Some(error.to_string()),
    }

    if report.status == Readiness::Degraded {
        warn!(
            event_name = "system.health.degraded",
            correlation_id = "health",
            missing_tables = ?report.missing_tables,
            database_error = report.database_error.as_deref().unwrap_or(""),
            "henhouse is not ready"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, Json(report));
    }
    (StatusCode::OK, Json(report))
}

enum Schema {
    Migrated(Flock),
    Missing(Vec<&'static str>),
}

async fn inspect(pool: &DbPool) -> Result<Schema, sqlx::Error> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name IN ('slack_user', 'chicken', 'egg')",
    )
    .fetch_all(pool)
    .await?;

    let missing: Vec<&'static str> = HENHOUSE_TABLES
        .into_iter()
        .filter(|table| !present.iter().any(|name| name == table))
        .collect();
    if !missing.is_empty() {
        return Ok(Schema::Missing(missing));
    }

    let (users, chickens, eggs): (i64, i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM slack_user), \
                (SELECT COUNT(*) FROM chicken), \
                (SELECT COUNT(*) FROM egg)",
    )
    .fetch_one(pool)
    .await?;
    Ok(Schema::Migrated(Flock { users, chickens, eggs }))
}
