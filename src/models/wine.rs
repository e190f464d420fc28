use serde::{Deserialize, Serialize};

use super::WineId;

/// A catalogued wine, one column of the rating matrix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Wine {
    /// Stable identifier assigned by the record store
    pub id: WineId,
    /// Display name
    pub name: String,
    /// Catalogue identifier used by clients
    #[serde(default)]
    pub internal_id: Option<String>,
}

impl Wine {
    pub fn new(id: WineId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            internal_id: None,
        }
    }
}

/// Payload for creating a wine
#[derive(Debug, Clone, Deserialize)]
pub struct NewWine {
    pub name: String,
    #[serde(default)]
    pub internal_id: Option<String>,
}
