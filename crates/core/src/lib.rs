//! Domain core for the henhouse Slack bot: users, chickens and eggs, reward
//! extraction from channel messages, direct-message commands, configuration
//! and the layered error taxonomy.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod reward;

pub use commands::DmCommand;
pub use domain::chicken::{Chicken, ChickenId};
pub use domain::egg::{Egg, EggId};
pub use domain::user::{SlackUser, SlackUserId, WorkspaceId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use reward::{extract_reward, RewardExtractor, RewardTally};
