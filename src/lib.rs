pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use shared::error::{AppError, Result};
