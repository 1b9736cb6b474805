//! Engine configuration record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// Default MySQL/MariaDB port.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Default PostgreSQL port.
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Default MySQL connection character set.
pub const DEFAULT_MYSQL_CHARSET: &str = "utf8mb4";

/// Default PostgreSQL schema.
pub const DEFAULT_POSTGRES_SCHEMA: &str = "public";

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Embedded file-based engine.
    #[serde(alias = "sqlite3")]
    Sqlite,
    /// MySQL / MariaDB server.
    #[serde(alias = "mariadb")]
    Mysql,
    /// PostgreSQL server.
    #[serde(alias = "pgsql", alias = "postgresql", alias = "pg")]
    Postgres,
}

impl EngineKind {
    /// Engine identifier as persisted in the configuration file.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Sqlite => "sqlite",
            EngineKind::Mysql => "mysql",
            EngineKind::Postgres => "postgres",
        }
    }

    /// Client/server engines need a host and credentials; the embedded one does not.
    pub fn is_server(&self) -> bool {
        !matches!(self, EngineKind::Sqlite)
    }

    /// Port used when the configuration leaves it out.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            EngineKind::Sqlite => None,
            EngineKind::Mysql => Some(DEFAULT_MYSQL_PORT),
            EngineKind::Postgres => Some(DEFAULT_POSTGRES_PORT),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(EngineKind::Sqlite),
            "mysql" | "mariadb" => Ok(EngineKind::Mysql),
            "postgres" | "postgresql" | "pgsql" | "pg" => Ok(EngineKind::Postgres),
            other => Err(DbError::Config(format!(
                "Unknown database type: '{}'. Supported types: sqlite, mysql, postgres",
                other
            ))),
        }
    }
}

/// Connection target for one database.
///
/// Two records with identical fields denote the same target; the connection
/// registry relies on this through `Eq + Hash`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine type.
    pub r#type: EngineKind,

    /// Server host (server engines only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Server port; engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name, or file path for the embedded engine.
    pub database: String,

    /// Login name (server engines only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Login password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Connection character set (MySQL; PostgreSQL client encoding).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,

    /// Schema searched for tables (PostgreSQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// TLS mode: disable, require, verify-ca, verify-full.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<String>,
}

impl EngineConfig {
    /// Configuration for an embedded database file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::bare(EngineKind::Sqlite, path.into())
    }

    /// Configuration for a MySQL/MariaDB database.
    pub fn mysql(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: Some(host.into()),
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::bare(EngineKind::Mysql, database.into())
        }
    }

    /// Configuration for a PostgreSQL database.
    pub fn postgres(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: Some(host.into()),
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::bare(EngineKind::Postgres, database.into())
        }
    }

    fn bare(kind: EngineKind, database: String) -> Self {
        Self {
            r#type: kind,
            host: None,
            port: None,
            database,
            username: None,
            password: None,
            charset: None,
            schema: None,
            ssl_mode: None,
        }
    }

    /// Set an explicit port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Copy of this configuration pointing at another database on the same server.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self.clone()
        }
    }

    /// Engine type.
    pub fn kind(&self) -> EngineKind {
        self.r#type
    }

    /// Host, defaulting to localhost.
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or("localhost")
    }

    /// Port, defaulting to the engine's standard port.
    pub fn port(&self) -> u16 {
        self.port
            .or_else(|| self.r#type.default_port())
            .unwrap_or_default()
    }

    /// Login name, empty when absent.
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }

    /// Password, empty when absent.
    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }

    /// Character set used for the connection.
    pub fn charset(&self) -> &str {
        match (&self.charset, self.r#type) {
            (Some(charset), _) => charset,
            (None, EngineKind::Postgres) => "UTF8",
            (None, _) => DEFAULT_MYSQL_CHARSET,
        }
    }

    /// Schema searched for tables (PostgreSQL).
    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_POSTGRES_SCHEMA)
    }

    /// TLS mode string, `disable` when absent.
    pub fn ssl_mode(&self) -> &str {
        self.ssl_mode.as_deref().unwrap_or("disable")
    }

    /// Human-readable target description without credentials.
    pub fn describe(&self) -> String {
        match self.r#type {
            EngineKind::Sqlite => format!("sqlite:{}", self.database),
            kind => format!(
                "{}://{}@{}:{}/{}",
                kind,
                self.username(),
                self.host(),
                self.port(),
                self.database
            ),
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("charset", &self.charset)
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}
