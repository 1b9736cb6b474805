//! Install and migration orchestrators.
//!
//! Both flows share the same target preparation: open the full target
//! connection, and when the server reports the database as missing (as
//! opposed to refusing the login) create it through a transient
//! administrative adapter and connect again. Both write the configuration
//! file last, only after their work has succeeded.

pub mod install;
pub mod migrate;
mod response;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use install::{handle_install, InstallOrchestrator, InstallReport};
pub use migrate::{handle_migration, MigrationOrchestrator, MigrationReport, TableReport};
pub use response::EntryResponse;

use crate::config::EngineConfig;
use crate::core::DatabaseAdapter;
use crate::drivers::admin_adapter;
use crate::error::Result;

/// Redirect returned by a successful install.
pub const INSTALL_REDIRECT: &str = "/login";

/// Redirect returned by a successful migration.
pub const MIGRATION_REDIRECT: &str = "/admin/database";

/// States of a migration run.
///
/// Any failure returns the run to `Idle` with the configuration untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Idle,
    ProbingTarget,
    PreparingTarget,
    CopyingSchemaAndData,
    Committed,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationPhase::Idle => "idle",
            MigrationPhase::ProbingTarget => "probing target",
            MigrationPhase::PreparingTarget => "preparing target",
            MigrationPhase::CopyingSchemaAndData => "copying schema and data",
            MigrationPhase::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// Open the target connection.
///
/// Returns `false` when the server reports the database missing; every other
/// failure, credentials included, is returned as an error.
pub(crate) async fn probe(target: &dyn DatabaseAdapter) -> Result<bool> {
    match target.connect().await {
        Ok(()) => Ok(true),
        Err(e) if e.is_database_missing() => {
            info!("Database '{}' does not exist yet", target.config().database);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Create the target database on its server, then connect to it.
pub(crate) async fn create_target_database(target: &Arc<dyn DatabaseAdapter>) -> Result<()> {
    let config: &EngineConfig = target.config();
    let admin = admin_adapter(config)?;
    admin.create_database(&config.database).await?;
    target.connect().await
}
