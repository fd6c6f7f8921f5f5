// src/store.rs
use crate::codec::SecretCodec;
use crate::config::Argon2Params;
use crate::crypto::{self, KEY_LEN, NONCE_LEN, SALT_LEN};
use crate::error::{SecretError, StoreError, StoreResult, ValidationError};
use crate::guard::{self, Access};
use crate::models::{next_timestamp, CredentialRecord, NewRecord, RecordId, RecordPatch, StoredRecord, User, UserId};
use crate::pagination::{paginate, Page, PageRequest};
use log;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct Tables {
    last_user_id: UserId,
    last_record_id: RecordId,
    users: BTreeMap<UserId, User>,
    credential_records: BTreeMap<RecordId, StoredRecord>,
}

impl Tables {
    fn allocate_user_id(&mut self) -> UserId {
        self.last_user_id += 1;
        self.last_user_id
    }

    fn allocate_record_id(&mut self) -> RecordId {
        self.last_record_id += 1;
        self.last_record_id
    }
}

struct VaultFile {
    path: PathBuf,
    salt: [u8; SALT_LEN],
    key: [u8; KEY_LEN],
}

impl fmt::Debug for VaultFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultFile")
            .field("path", &self.path)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Users and credential records, optionally mirrored to an encrypted vault
/// file.
///
/// All mutations go through [`RecordStore::commit`]. Writers queue on
/// `writer` for the whole read-modify-write; `tables` is only write-locked
/// to publish a draft that is already on disk, so readers never wait for
/// file I/O.
#[derive(Debug)]
pub struct RecordStore {
    tables: RwLock<Tables>,
    writer: Mutex<()>,
    codec: SecretCodec,
    file: Option<VaultFile>,
}

impl RecordStore {
    pub fn in_memory(codec: SecretCodec) -> Self {
        RecordStore {
            tables: RwLock::new(Tables::default()),
            writer: Mutex::new(()),
            codec,
            file: None,
        }
    }

    /// Opens the vault at `path`, creating it when missing. The vault key is
    /// derived from `master_password` and the salt stored in the file; it
    /// encrypts both the file and each secret inside it.
    pub fn open(path: &Path, master_password: &str, argon2_config: &Argon2Params) -> StoreResult<Self> {
        if path.exists() {
            let contents = read_vault_file(path)?;
            let mut salt = [0u8; SALT_LEN];
            salt.copy_from_slice(&contents[..SALT_LEN]);
            let key = crypto::derive_key_from_master_password(master_password, &salt, argon2_config)?;
            let tables = decrypt_tables(&contents[SALT_LEN..], &key)?;

            log::info!(
                "Opened vault {:?} ({} users, {} credential records)",
                path,
                tables.users.len(),
                tables.credential_records.len()
            );
            return Ok(RecordStore {
                tables: RwLock::new(tables),
                writer: Mutex::new(()),
                codec: SecretCodec::new(key),
                file: Some(VaultFile { path: path.to_path_buf(), salt, key }),
            });
        }

        log::info!("No vault at {:?}, creating a new one", path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let salt = crypto::generate_salt();
        let key = crypto::derive_key_from_master_password(master_password, &salt, argon2_config)?;
        let file = VaultFile { path: path.to_path_buf(), salt, key };
        let tables = Tables::default();
        save_tables(&file, &tables)?;

        Ok(RecordStore {
            tables: RwLock::new(tables),
            writer: Mutex::new(()),
            codec: SecretCodec::new(key),
            file: Some(file),
        })
    }

    /// Runs `op` against a copy of the tables, persists the copy, then swaps
    /// it in. Nothing changes if `op` or the write fails.
    fn commit<R>(&self, op: impl FnOnce(&mut Tables) -> StoreResult<R>) -> StoreResult<R> {
        let _writer = self.writer.lock();
        let mut draft = self.tables.read().clone();
        let result = op(&mut draft)?;
        if let Some(file) = &self.file {
            save_tables(file, &draft)?;
        }
        *self.tables.write() = draft;
        Ok(result)
    }

    /// Blocks other writers as if a vault write were in progress.
    #[cfg(test)]
    pub(crate) fn hold_writer(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.writer.lock()
    }

    /// Decodes the stored secret. Legacy one-way hashes are masked rather
    /// than failing the read.
    fn reveal(&self, stored: &StoredRecord) -> StoreResult<CredentialRecord> {
        let secret = match self.codec.decode(&stored.secret) {
            Ok(plaintext) => Some(plaintext),
            Err(SecretError::Unrecoverable) => {
                log::warn!("Credential record {} holds an unrecoverable legacy secret; masking it", stored.id);
                None
            }
            Err(e) => {
                log::error!("Failed to decode secret of credential record {}: {}", stored.id, e);
                return Err(e.into());
            }
        };
        Ok(CredentialRecord::from_stored(stored, secret))
    }

    // --- users ---

    pub fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<User> {
        if username.is_empty() {
            return Err(ValidationError::single("username", "Username is required").into());
        }
        let user = self.commit(|tables| {
            if tables.users.values().any(|u| u.username == username) {
                return Err(StoreError::DuplicateUsername(username.to_string()));
            }
            let user = User {
                id: tables.allocate_user_id(),
                username: username.to_string(),
                password: password_hash.to_string(),
            };
            tables.users.insert(user.id, user.clone());
            Ok(user)
        })?;
        log::info!("Created user {} ({})", user.id, user.username);
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Option<User> {
        self.tables.read().users.get(&id).cloned()
    }

    pub fn get_user_by_username(&self, username: &str) -> Option<User> {
        self.tables.read().users.values().find(|u| u.username == username).cloned()
    }

    // --- credential records ---

    /// Stores a new record. The response carries the plaintext that was
    /// supplied, not a decode of what was written.
    pub fn create(&self, owner_id: UserId, new_record: NewRecord) -> StoreResult<CredentialRecord> {
        let stored_secret = self.codec.encode(&new_record.secret)?;
        let stored = self.commit(|tables| {
            let record = StoredRecord {
                id: tables.allocate_record_id(),
                owner_id,
                name: new_record.name.clone(),
                username: new_record.username.clone(),
                secret: stored_secret,
                updated_at: next_timestamp(None),
            };
            tables.credential_records.insert(record.id, record.clone());
            Ok(record)
        })?;
        log::info!("Created credential record {} for user {}", stored.id, owner_id);
        Ok(CredentialRecord::from_stored(&stored, Some(new_record.secret)))
    }

    pub fn get(&self, id: RecordId) -> StoreResult<Option<CredentialRecord>> {
        let stored = self.tables.read().credential_records.get(&id).cloned();
        stored.map(|record| self.reveal(&record)).transpose()
    }

    /// Like [`get`](Self::get), but a record owned by someone else is
    /// reported as `NotFound`.
    pub fn get_for(&self, requesting_user: UserId, id: RecordId) -> StoreResult<CredentialRecord> {
        let stored = self.tables.read().credential_records.get(&id).cloned();
        match guard::authorize(stored.as_ref(), requesting_user) {
            Access::Allowed => stored.map_or(Err(StoreError::NotFound(id)), |record| self.reveal(&record)),
            Access::Denied => Err(StoreError::NotFound(id)),
        }
    }

    pub fn is_owned_by(&self, id: RecordId, user: UserId) -> bool {
        guard::authorize(self.tables.read().credential_records.get(&id), user) == Access::Allowed
    }

    /// One page of the owner's records in insertion order. `search` keeps
    /// records whose name contains it, ignoring case; `total` counts what is
    /// left after filtering.
    pub fn list_by_owner(&self, owner_id: UserId, request: PageRequest, search: Option<&str>) -> StoreResult<Page<CredentialRecord>> {
        let needle = search.map(str::to_lowercase).filter(|s| !s.is_empty());
        let owned: Vec<StoredRecord> = {
            let tables = self.tables.read();
            tables
                .credential_records
                .values()
                .filter(|r| r.owner_id == owner_id)
                .filter(|r| needle.as_ref().map_or(true, |n| r.name.to_lowercase().contains(n.as_str())))
                .cloned()
                .collect()
        };

        let page = paginate(owned, request);
        let records = page
            .records
            .iter()
            .map(|record| self.reveal(record))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Page { records, total: page.total })
    }

    pub fn update(&self, id: RecordId, patch: &RecordPatch) -> StoreResult<CredentialRecord> {
        self.apply_update(id, patch, None)
    }

    /// Update on behalf of `requesting_user`. The ownership check and the
    /// write happen under the same lock.
    pub fn update_for(&self, requesting_user: UserId, id: RecordId, patch: &RecordPatch) -> StoreResult<CredentialRecord> {
        self.apply_update(id, patch, Some(requesting_user))
    }

    fn apply_update(&self, id: RecordId, patch: &RecordPatch, requesting_user: Option<UserId>) -> StoreResult<CredentialRecord> {
        patch.validate()?;
        let stored_secret = patch.secret.as_deref().map(|s| self.codec.encode(s)).transpose()?;

        let stored = self.commit(|tables| {
            if let Some(user) = requesting_user {
                if guard::authorize(tables.credential_records.get(&id), user) == Access::Denied {
                    return Err(StoreError::NotFound(id));
                }
            }
            let record = tables.credential_records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if let Some(name) = &patch.name {
                record.name = name.clone();
            }
            if let Some(username) = &patch.username {
                record.username = username.clone();
            }
            if let Some(secret) = stored_secret {
                record.secret = secret;
            }
            record.updated_at = next_timestamp(Some(record.updated_at));
            Ok(record.clone())
        })?;
        log::info!("Updated credential record {}", id);

        match &patch.secret {
            Some(plaintext) => Ok(CredentialRecord::from_stored(&stored, Some(plaintext.clone()))),
            None => self.reveal(&stored),
        }
    }

    /// Removes a record. Removing an absent id succeeds.
    pub fn delete(&self, id: RecordId) -> StoreResult<()> {
        let removed = self.commit(|tables| Ok(tables.credential_records.remove(&id).is_some()))?;
        if removed {
            log::info!("Deleted credential record {}", id);
        } else {
            log::debug!("Delete of absent credential record {} ignored", id);
        }
        Ok(())
    }

    /// Delete on behalf of `requesting_user`; absent and foreign records are
    /// both `NotFound`.
    pub fn delete_for(&self, requesting_user: UserId, id: RecordId) -> StoreResult<()> {
        self.commit(|tables| match guard::authorize(tables.credential_records.get(&id), requesting_user) {
            Access::Allowed => {
                tables.credential_records.remove(&id);
                Ok(())
            }
            Access::Denied => Err(StoreError::NotFound(id)),
        })?;
        log::info!("Deleted credential record {} for user {}", id, requesting_user);
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes the tables to the vault file as
/// [SALT (SALT_LEN bytes)] [NONCE (NONCE_LEN bytes)] [ENCRYPTED BINCODE TABLES (...)]
/// via a temporary file that is renamed into place.
fn save_tables(file: &VaultFile, tables: &Tables) -> StoreResult<()> {
    let filepath = &file.path;
    log::debug!("Saving vault to {:?}", filepath);
    let serialized_data = bincode::serialize(tables).map_err(|e| {
        let msg = format!("Bincode serialization failed: {}", e);
        log::error!("save_tables: {}", msg);
        StoreError::Serialization(msg)
    })?;

    let nonce = crypto::generate_chacha_nonce();
    let encrypted_data = crypto::encrypt_data(&serialized_data, &file.key, &nonce).map_err(|e| {
        log::error!("Failed to encrypt vault tables: {:?}", e);
        StoreError::Crypto(e)
    })?;

    let tmp_path = temp_path(filepath);
    let mut out = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| {
            log::error!("Failed to open file {:?} for writing: {:?}", tmp_path, e);
            StoreError::Io(e)
        })?;

    out.write_all(&file.salt).map_err(|e| { log::error!("Failed to write salt to {:?}: {:?}", tmp_path, e); e })?;
    out.write_all(&nonce).map_err(|e| { log::error!("Failed to write nonce to {:?}: {:?}", tmp_path, e); e })?;
    out.write_all(&encrypted_data).map_err(|e| { log::error!("Failed to write encrypted tables to {:?}: {:?}", tmp_path, e); e })?;
    out.sync_all()?;
    drop(out);

    fs::rename(&tmp_path, filepath).map_err(|e| {
        log::error!("Failed to move {:?} over {:?}: {:?}", tmp_path, filepath, e);
        StoreError::Io(e)
    })?;
    Ok(())
}

/// Reads the whole vault file and checks it holds at least a salt and a
/// nonce.
fn read_vault_file(filepath: &Path) -> StoreResult<Vec<u8>> {
    log::info!("Attempting to load vault from {:?}", filepath);
    let mut file = File::open(filepath).map_err(|e| {
        log::error!("Failed to open vault file {:?}: {:?}", filepath, e);
        StoreError::Io(e)
    })?;

    let mut file_contents = Vec::new();
    file.read_to_end(&mut file_contents).map_err(|e| {
        log::error!("Failed to read vault file {:?}: {:?}", filepath, e);
        StoreError::Io(e)
    })?;

    if file_contents.len() < SALT_LEN + NONCE_LEN {
        let msg = format!(
            "File {:?} is too short to contain salt and nonce (len: {})",
            filepath,
            file_contents.len()
        );
        log::error!("read_vault_file: {}", msg);
        return Err(StoreError::FormatError(msg));
    }
    Ok(file_contents)
}

/// `payload` is everything after the salt. A payload that does not
/// authenticate under `key` means the master password is wrong or the file
/// was altered; the two cannot be told apart.
fn decrypt_tables(payload: &[u8], key: &[u8; KEY_LEN]) -> StoreResult<Tables> {
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&payload[..NONCE_LEN]);

    let decrypted_data = crypto::decrypt_data(&payload[NONCE_LEN..], key, &nonce).map_err(|_| {
        log::warn!("Vault did not decrypt. Wrong master password or corrupted vault?");
        StoreError::WrongMasterPassword
    })?;

    bincode::deserialize(&decrypted_data).map_err(|e| {
        let msg = format!("Bincode deserialization failed: {}", e);
        log::error!("decrypt_tables: {}", msg);
        StoreError::Deserialization(msg)
    })
}
