//! Response shape shared by the install and migration entry points.

use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Outcome of an entry point, serialized as JSON for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryResponse {
    pub success: bool,

    /// Where the caller should go next (success only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,

    /// What failed (failure only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EntryResponse {
    pub fn ok(redirect: impl Into<String>) -> Self {
        Self {
            success: true,
            redirect: Some(redirect.into()),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            redirect: None,
            message: Some(message.into()),
        }
    }
}

impl From<&DbError> for EntryResponse {
    fn from(err: &DbError) -> Self {
        Self::failure(err.to_string())
    }
}
