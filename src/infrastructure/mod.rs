pub mod backends;
pub mod database;
