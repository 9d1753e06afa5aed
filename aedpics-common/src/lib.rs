//! # AEDpics Common Library
//!
//! Shared code for the AED registry service:
//! - Database schema, migrations and row models
//! - Roles and permission helpers
//! - Scheduling helpers
//! - TNMS institution-name normalization
//! - Field encryption for personal data
//! - Configuration loading

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod roles;
pub mod schedule;
pub mod time;
pub mod tnms;

pub use error::{Error, Result};
pub use roles::UserRole;
