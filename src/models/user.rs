use serde::{Deserialize, Serialize};

use super::UserId;

/// A registered user, one row of the rating matrix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct User {
    /// Stable identifier assigned by the record store
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Identifier the user is known by in the client application
    #[serde(default)]
    pub internal_id: Option<String>,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            internal_id: None,
        }
    }
}

/// Payload for creating a user
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    #[serde(default)]
    pub internal_id: Option<String>,
}
