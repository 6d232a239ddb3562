use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A JSON value stored under a path.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub path: String,
    pub raw: String,
    pub updated_at: DateTime<Utc>,
}

impl StoredDocument {
    pub fn value(&self) -> Result<Value> {
        serde_json::from_str(&self.raw)
            .with_context(|| format!("document at '{}' is not valid JSON", self.path))
    }
}
