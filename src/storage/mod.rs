//! Storage - Persistence facade over two interchangeable backends
//!
//! TigerStyle: one trait, two implementations, chosen once at startup.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    StorageEngine                         │
//! │         (selected once from configuration)               │
//! └──────────────┬───────────────────────────┬──────────────┘
//!                │ session()                 │ session()
//!       ┌────────▼────────┐         ┌────────▼────────┐
//!       │  FileStorage    │         │   DbStorage     │
//!       │  (JSON file,    │         │  (SQLite pool,  │
//!       │   shared map)   │         │   per-session   │
//!       │                 │         │   transaction)  │
//!       └─────────────────┘         └─────────────────┘
//! ```
//!
//! Callers only see `Arc<dyn Storage>`. The few places where behavior must
//! differ by backend branch on [`Storage::kind`].

mod backend;
mod db;
mod engine;
mod error;
mod file;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use backend::Storage;
pub use db::DbStorage;
pub use engine::StorageEngine;
pub use error::{StorageError, StorageResult};
pub use file::FileStorage;

/// Which backend serves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Single JSON file
    #[default]
    File,
    /// Relational database
    Db,
}

impl StorageKind {
    /// Configuration spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Db => "db",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
