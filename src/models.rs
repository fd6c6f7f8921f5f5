// src/models.rs
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub type UserId = u64;
pub type RecordId = u64;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Argon2id PHC string, never the plaintext.
    pub password: String,
}

/// A credential row as it sits in the `credential_records` table. `secret`
/// holds the codec's stored form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub owner_id: UserId,
    pub name: String,
    pub username: String,
    pub secret: String,
    pub updated_at: DateTime<Utc>,
}

/// A credential as shown to its owner.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: RecordId,
    pub owner_id: UserId,
    pub name: String,
    pub username: String,
    /// `None` only when the stored form is a legacy one-way hash.
    pub secret: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn from_stored(stored: &StoredRecord, secret: Option<String>) -> Self {
        CredentialRecord {
            id: stored.id,
            owner_id: stored.owner_id,
            name: stored.name.clone(),
            username: stored.username.clone(),
            secret,
            updated_at: stored.updated_at,
        }
    }
}

/// Validated payload for creating a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub name: String,
    pub username: String,
    pub secret: String,
}

impl NewRecord {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let record = NewRecord {
            name: name.into(),
            username: username.into(),
            secret: secret.into(),
        };
        let mut errors = ValidationError::default();
        check_required("name", &record.name, "Name is required", &mut errors);
        check_required("username", &record.username, "Username is required", &mut errors);
        errors.into_result()?;
        Ok(record)
    }
}

/// Partial update. A `None` field is left untouched; `Some("")` is an
/// explicit value and is validated like any other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub username: Option<String>,
    pub secret: Option<String>,
}

impl RecordPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.username.is_none() && self.secret.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        if let Some(name) = &self.name {
            check_required("name", name, "Name is required", &mut errors);
        }
        if let Some(username) = &self.username {
            check_required("username", username, "Username is required", &mut errors);
        }
        errors.into_result()
    }
}

fn check_required(field: &'static str, value: &str, message: &str, errors: &mut ValidationError) {
    if value.is_empty() {
        errors.push(field, message);
    }
}

/// Next `updated_at` value: the current time at millisecond precision, bumped
/// past `previous` when the clock has not moved.
pub fn next_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(3);
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}
