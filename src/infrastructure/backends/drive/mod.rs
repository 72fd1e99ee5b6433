pub mod backend;
pub mod client;
pub mod token_manager;

pub use backend::DriveBackend;
pub use client::{DriveClient, DriveQuota, FileId};
pub use token_manager::{DriveTokenManager, DEFAULT_AUTH_SCOPE};
