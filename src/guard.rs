// src/guard.rs
use crate::models::{CredentialRecord, StoredRecord, UserId};

/// Anything that belongs to exactly one user.
pub trait Owned {
    fn owner_id(&self) -> UserId;
}

impl Owned for StoredRecord {
    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

impl Owned for CredentialRecord {
    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
}

/// A missing record and someone else's record are both `Denied`; callers
/// must report them the same way.
pub fn authorize<R: Owned>(record: Option<&R>, requesting_user: UserId) -> Access {
    match record {
        Some(record) if record.owner_id() == requesting_user => Access::Allowed,
        _ => Access::Denied,
    }
}
