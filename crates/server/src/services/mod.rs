//! Database-backed implementations of the collaborators the message dispatcher calls.

use std::sync::Arc;

use henhouse_core::ApplicationError;
use henhouse_db::repositories::{
    ChickenRepository, EggRepository, RepositoryError, SlackUserRepository, SqlChickenRepository,
    SqlEggRepository, SqlSlackUserRepository,
};
use henhouse_db::DbPool;

mod commands;
mod eggs;
mod rename;

pub use commands::DirectMessageCommands;
pub use eggs::EggGiver;
pub use rename::ChickenRenamer;

#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn SlackUserRepository>,
    pub chickens: Arc<dyn ChickenRepository>,
    pub eggs: Arc<dyn EggRepository>,
}

impl Repositories {
    pub fn sqlite(pool: DbPool) -> Self {
        Self {
            users: Arc::new(SqlSlackUserRepository::new(pool.clone())),
            chickens: Arc::new(SqlChickenRepository::new(pool.clone())),
            eggs: Arc::new(SqlEggRepository::new(pool)),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        use henhouse_db::repositories::InMemoryHenhouse;

        let henhouse = Arc::new(InMemoryHenhouse::default());
        Self { users: henhouse.clone(), chickens: henhouse.clone(), eggs: henhouse }
    }
}

pub(crate) fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
