pub mod chicken;
pub mod egg;
pub mod user;
