//! Terminus Core - Shared data models, economy arithmetic, and errors

pub mod errors;
pub mod models;

pub use errors::{Error, Result};
pub use models::*;
