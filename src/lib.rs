//! Synkronus server: app-bundle distribution, observation sync, and
//! content-addressed attachment storage for the Synkronus mobile
//! data-collection platform.

pub mod attachments;
pub mod auth;
pub mod bundle;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod logging;
pub mod observations;
pub mod sync;
pub mod users;
pub mod version;

pub use config::Config;
pub use db::Db;
pub use error::{AppError, Result};
