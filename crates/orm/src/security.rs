//! Identifier checks for SQL rendered by the PostgreSQL store
//!
//! Table and column names reach SQL text (values are always bound), so each
//! one is validated and then quoted.

use crate::error::{ModelError, ModelResult};

/// Characters allowed in SQL identifiers (alphanumeric, underscore, dollar)
const ALLOWED_IDENTIFIER_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_$";

/// SQL keywords rejected as bare identifiers
static SQL_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "UNION", "DROP", "CREATE",
    "ALTER", "GRANT", "REVOKE", "TRUNCATE", "EXEC", "EXECUTE", "DECLARE", "CAST",
];

/// Escape a SQL identifier by doubling embedded quotes and wrapping it in
/// double quotes.
///
/// ```
/// use storm_orm::security::escape_identifier;
///
/// assert_eq!(escape_identifier("system_files"), "\"system_files\"");
/// assert_eq!(escape_identifier("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn escape_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Validate that an identifier is safe for use in SQL
pub fn validate_identifier(identifier: &str) -> ModelResult<()> {
    let Some(first) = identifier.chars().next() else {
        return Err(ModelError::Validation(
            "Identifier cannot be empty".to_string(),
        ));
    };

    // PostgreSQL limit
    if identifier.len() > 63 {
        return Err(ModelError::Validation(format!(
            "Identifier '{}' is too long (max 63 characters)",
            identifier
        )));
    }

    if let Some(c) = identifier.chars().find(|c| !ALLOWED_IDENTIFIER_CHARS.contains(*c)) {
        return Err(ModelError::Validation(format!(
            "Identifier '{}' contains invalid character '{}'",
            identifier, c
        )));
    }

    if first.is_ascii_digit() {
        return Err(ModelError::Validation(format!(
            "Identifier '{}' cannot start with a number",
            identifier
        )));
    }

    if SQL_KEYWORDS.contains(&identifier.to_uppercase().as_str()) {
        return Err(ModelError::Validation(format!(
            "Identifier '{}' is a reserved SQL keyword",
            identifier
        )));
    }

    Ok(())
}

/// Validate, then escape
pub fn quote_identifier(identifier: &str) -> ModelResult<String> {
    validate_identifier(identifier)?;
    Ok(escape_identifier(identifier))
}
