//! Database models, initialization and migrations

pub mod init;
pub mod migrations;
pub mod models;

pub use init::*;
pub use migrations::*;
pub use models::*;
