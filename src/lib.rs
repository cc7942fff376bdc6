//! HBNB - Rental listing storage core
//!
//! One storage facade over a JSON file or a relational database, a place
//! search engine on top of it, and a thin REST API.
//!
//! Features:
//! - Backend chosen once at startup (`file` or `db`), identical answers
//!   from both
//! - Request-scoped storage sessions, closed exactly once
//! - Place search by state, city and amenity
//!
//! # Example
//!
//! ```ignore
//! use hbnb::{config::StorageConfig, models::{Entity, State}, storage::StorageEngine};
//!
//! let engine = StorageEngine::open(&StorageConfig::file("file.json")).await?;
//! let storage = engine.session();
//! storage.add(Entity::from(State::new("California"))).await?;
//! storage.save().await?;
//! storage.close().await?;
//! ```

pub mod api;
pub mod config;
pub mod models;
pub mod search;
pub mod storage;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Application name
pub const APP_NAME: &str = "hbnb";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use models::{Entity, EntityKind};
pub use search::{search_places, PlaceSearch};
pub use storage::{Storage, StorageEngine, StorageError, StorageKind, StorageResult};
