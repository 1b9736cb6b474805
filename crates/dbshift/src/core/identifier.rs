//! Identifier validation and quoting.
//!
//! Identifiers (table, column, database names) cannot be bound as statement
//! parameters, so every dynamically named object goes through this module:
//!
//! 1. Validate the identifier (no null bytes, bounded length)
//! 2. Wrap it in the engine's quote character
//! 3. Double any embedded quote character

use crate::error::{DbError, Result};

/// Upper bound on identifier length in bytes. The engines truncate or
/// reject well below this (PostgreSQL 63, MySQL 64).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Reject names that cannot be safely quoted: empty, containing NUL, or
/// longer than [`MAX_IDENTIFIER_LENGTH`] bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    let problem = if name.is_empty() {
        "is empty".to_string()
    } else if name.contains('\0') {
        "contains a null byte".to_string()
    } else if name.len() > MAX_IDENTIFIER_LENGTH {
        format!("is {} bytes long (limit {})", name.len(), MAX_IDENTIFIER_LENGTH)
    } else {
        return Ok(());
    };
    Err(DbError::Config(format!("Identifier {:?} {}", name, problem)))
}

/// Wrap `name` in `quote`, doubling every embedded `quote`.
pub fn quote_with(name: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    format!("{q}{}{q}", name.replace(quote, &doubled), q = quote)
}

/// Quote an identifier with double quotes (SQLite, PostgreSQL).
pub fn quote_double(name: &str) -> String {
    quote_with(name, '"')
}

/// Quote an identifier with backticks (MySQL).
pub fn quote_backtick(name: &str) -> String {
    quote_with(name, '`')
}

/// Quote a string literal, doubling single quotes.
pub fn quote_literal(value: &str) -> String {
    quote_with(value, '\'')
}

/// Validate and quote a PostgreSQL identifier.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(quote_double(name))
}

/// Validate and quote a MySQL identifier.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(quote_backtick(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ordinary_and_odd_names() {
        for name in ["users", "user_roles", "Table With Spaces", "we\"ird"] {
            assert!(validate_identifier(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_rejects_unquotable_names() {
        assert!(validate_identifier("").unwrap_err().to_string().contains("empty"));
        let err = validate_identifier("users\0; DROP TABLE x").unwrap_err();
        assert!(err.to_string().contains("null byte"));

        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
        let err = validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1)).unwrap_err();
        assert!(err.to_string().contains("limit 128"));
    }

    #[test]
    fn test_quote_doubles_quote_char_exactly_once() {
        assert_eq!(quote_double("table\"name"), "\"table\"\"name\"");
        assert_eq!(quote_backtick("table`name"), "`table``name`");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");

        // Every quote in the input shows up doubled, nothing else changes.
        let name = "a\"b\"\"c";
        let quoted = quote_double(name);
        let inner = &quoted[1..quoted.len() - 1];
        assert_eq!(inner.matches('"').count(), name.matches('"').count() * 2);
        assert_eq!(inner.replace("\"\"", "\""), name);
    }

    #[test]
    fn test_other_quote_chars_untouched() {
        assert_eq!(quote_backtick("say \"hi\""), "`say \"hi\"`");
        assert_eq!(quote_double("it`s"), "\"it`s\"");
    }

    #[test]
    fn test_quote_pg_keeps_payload_inside_quotes() {
        let quoted = quote_pg("app\"; DROP DATABASE postgres; --").unwrap();
        assert_eq!(quoted, "\"app\"\"; DROP DATABASE postgres; --\"");
    }

    #[test]
    fn test_quote_mysql_validates_first() {
        assert!(quote_mysql("bad\0name").is_err());
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
    }
}
