//! Configuration validation.

use super::{EngineConfig, EngineKind};
use crate::core::identifier::validate_identifier;
use crate::drivers::common::SslMode;
use crate::error::{DbError, Result};

/// Validate an engine configuration before any connection attempt.
pub fn validate(config: &EngineConfig) -> Result<()> {
    if config.database.trim().is_empty() {
        return Err(DbError::Config("database is required".into()));
    }

    if config.r#type == EngineKind::Sqlite {
        if config.database.contains('\0') {
            return Err(DbError::Config("database path contains a null byte".into()));
        }
        return Ok(());
    }

    if config.host.as_deref().map_or(true, |h| h.trim().is_empty()) {
        return Err(DbError::Config(format!(
            "host is required for {} databases",
            config.r#type
        )));
    }
    if config.username.as_deref().map_or(true, |u| u.is_empty()) {
        return Err(DbError::Config(format!(
            "username is required for {} databases",
            config.r#type
        )));
    }
    if config.port == Some(0) {
        return Err(DbError::Config("port must be between 1 and 65535".into()));
    }

    validate_identifier(&config.database)?;
    if let Some(schema) = &config.schema {
        validate_identifier(schema)?;
    }

    // Interpolated into SET NAMES / client_encoding, so only plain words pass.
    if let Some(charset) = &config.charset {
        if charset.is_empty() || !charset.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DbError::Config(format!(
                "charset must be a plain identifier, got '{}'",
                charset
            )));
        }
    }

    if let Some(mode) = &config.ssl_mode {
        mode.parse::<SslMode>()?;
    }

    Ok(())
}
