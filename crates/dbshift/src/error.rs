//! Error types for the adapter and migration layer.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::EngineKind;

/// Main error type for adapter and orchestration operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// Configuration error (unknown engine type, missing fields, bad values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Host unreachable, bad port or rejected credentials.
    #[error("Connection to {engine} failed: {message}")]
    Connection { engine: EngineKind, message: String },

    /// The server answered but the requested database does not exist.
    #[error("Database '{database}' does not exist on the {engine} server")]
    DatabaseMissing { engine: EngineKind, database: String },

    /// DDL rejected by the engine.
    #[error("Schema operation on '{object}' failed: {message}")]
    Schema { object: String, message: String },

    /// A row could not be written to the target table.
    #[error("Data copy failed for table {table}: {message}")]
    DataCopy { table: String, message: String },

    /// The configuration file could not be written.
    #[error("Could not persist configuration to {path:?}: {message}")]
    ConfigPersist { path: PathBuf, message: String },

    /// Transaction misuse (nested begin, commit without begin) or a failed commit.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Query failure outside DDL and data copy (introspection, size, maintenance).
    #[error("Query failed ({context}): {message}")]
    Query { context: String, message: String },

    /// Another install or migration holds the configuration lock.
    #[error("Configuration is locked by another operation ({0:?}); retry later or remove a stale lock file")]
    Locked(PathBuf),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// Create a Connection error.
    pub fn connection(engine: EngineKind, message: impl ToString) -> Self {
        DbError::Connection {
            engine,
            message: message.to_string(),
        }
    }

    /// Create a Schema error.
    pub fn schema(object: impl Into<String>, message: impl ToString) -> Self {
        DbError::Schema {
            object: object.into(),
            message: message.to_string(),
        }
    }

    /// Create a DataCopy error.
    pub fn data_copy(table: impl Into<String>, message: impl ToString) -> Self {
        DbError::DataCopy {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Query error with context about where it occurred.
    pub fn query(context: impl Into<String>, message: impl ToString) -> Self {
        DbError::Query {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a ConfigPersist error.
    pub fn persist(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        DbError::ConfigPersist {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// True when the failure means "database absent" rather than "cannot log in".
    pub fn is_database_missing(&self) -> bool {
        matches!(self, DbError::DatabaseMissing { .. })
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            DbError::Config(_) => 2,
            DbError::Connection { .. } | DbError::DatabaseMissing { .. } => 3,
            DbError::Schema { .. } => 4,
            DbError::DataCopy { .. } => 5,
            DbError::ConfigPersist { .. } => 6,
            DbError::Locked(_) => 7,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for adapter and orchestration operations.
pub type Result<T> = std::result::Result<T, DbError>;
