// src/error.rs
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::models::RecordId;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Argon2 operation failed: {0}")]
    Argon2(String),
    #[error("ChaCha20Poly1305 operation failed: {0}")]
    ChaCha(String),
    #[error("Hex decoding error: {0}")]
    HexDecoding(String),
}

/// Failures of the secret codec. `Unrecoverable` is the one callers are
/// expected to handle, everything else means the stored form is damaged.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("stored secret was produced by a one-way hash and cannot be recovered")]
    Unrecoverable,
    #[error("stored secret is malformed: {0}")]
    Malformed(String),
    #[error("Cryptography error while decoding secret: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Malformed client input, with one entry per offending field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut err = ValidationError::default();
        err.push(field, message);
        err
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.push(FieldError { field, message: message.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "validation failed ({})", parts.join(", "))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Data format error: {0}")]
    FormatError(String),
    #[error("Cryptography error during store operation: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Secret codec error: {0}")]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("credential record {0} not found")]
    NotFound(RecordId),
    #[error("username `{0}` is already taken")]
    DuplicateUsername(String),
    #[error("master password does not unlock this vault")]
    WrongMasterPassword,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Cryptography error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CLI error: {0}")]
    Cli(String),
    #[error("Server error: {0}")]
    Server(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;
pub type CryptoResult<T> = Result<T, CryptoError>;
pub type SecretResult<T> = Result<T, SecretError>;
pub type StoreResult<T> = Result<T, StoreError>;
