use std::cell::RefCell;
use std::path::Path;

use gatekeeper_core::{
    ChannelEntry, ChannelHandle, FileRecord, GatekeeperError, OperatorLogEntry, PostNo, Setting,
    Timestamp, TokenId, TokenStatus, UserEntitlement, UserId, VerificationToken,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Persistent state database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   users          — UserId bytes     → bincode(UserEntitlement)
///   files          — PostNo be bytes  → bincode(FileRecord)
///   channels       — handle utf8      → bincode(ChannelEntry)
///   tokens         — TokenId bytes    → bincode(VerificationToken)
///   current_token  — UserId bytes    → TokenId bytes (single-outstanding index)
///   settings       — key utf8         → bincode(Setting)
///   operator_log   — log_id be bytes  → bincode(OperatorLogEntry)
///   meta           — utf8 key bytes   → raw bytes (sequence counters)
pub struct StateDb {
    _db: sled::Db,
    users: sled::Tree,
    files: sled::Tree,
    channels: sled::Tree,
    tokens: sled::Tree,
    current_token: sled::Tree,
    settings: sled::Tree,
    operator_log: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: sled::Error) -> GatekeeperError {
    GatekeeperError::Storage(e.to_string())
}

fn ser<T: Serialize>(v: &T) -> Result<Vec<u8>, GatekeeperError> {
    bincode::serialize(v).map_err(|e| GatekeeperError::Serialization(e.to_string()))
}

fn de<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GatekeeperError> {
    bincode::deserialize(bytes).map_err(|e| GatekeeperError::Serialization(e.to_string()))
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GatekeeperError> {
        let db = sled::open(path).map_err(storage_err)?;
        Ok(Self {
            users: db.open_tree("users").map_err(storage_err)?,
            files: db.open_tree("files").map_err(storage_err)?,
            channels: db.open_tree("channels").map_err(storage_err)?,
            tokens: db.open_tree("tokens").map_err(storage_err)?,
            current_token: db.open_tree("current_token").map_err(storage_err)?,
            settings: db.open_tree("settings").map_err(storage_err)?,
            operator_log: db.open_tree("operator_log").map_err(storage_err)?,
            meta: db.open_tree("meta").map_err(storage_err)?,
            _db: db,
        })
    }

    /// Open a temporary in-memory-backed database, for tests.
    #[cfg(any(test, feature = "test-util"))]
    pub fn open_temporary() -> Result<Self, GatekeeperError> {
        let db = sled::Config::new().temporary(true).open().map_err(storage_err)?;
        Ok(Self {
            users: db.open_tree("users").map_err(storage_err)?,
            files: db.open_tree("files").map_err(storage_err)?,
            channels: db.open_tree("channels").map_err(storage_err)?,
            tokens: db.open_tree("tokens").map_err(storage_err)?,
            current_token: db.open_tree("current_token").map_err(storage_err)?,
            settings: db.open_tree("settings").map_err(storage_err)?,
            operator_log: db.open_tree("operator_log").map_err(storage_err)?,
            meta: db.open_tree("meta").map_err(storage_err)?,
            _db: db,
        })
    }

    /// Run a fallible read-modify-write atomically against a single key.
    ///
    /// `sled::Tree::fetch_and_update` retries the closure internally on
    /// concurrent writers, giving CAS semantics without a manual retry loop
    /// at call sites. `f` returning `Err` aborts the update and the error is
    /// propagated to the caller unchanged; `f` returning `Ok(None)` deletes
    /// the key (used nowhere yet, but mirrors the teacher's spare db.rs API
    /// surface in case a future caller needs it).
    fn atomic_update<T, F>(tree: &sled::Tree, key: &[u8], mut f: F) -> Result<T, GatekeeperError>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnMut(Option<T>) -> Result<T, GatekeeperError>,
    {
        let failure: RefCell<Option<GatekeeperError>> = RefCell::new(None);
        let result: RefCell<Option<T>> = RefCell::new(None);

        tree.fetch_and_update(key, |existing: Option<&[u8]>| {
            if failure.borrow().is_some() {
                return existing.map(|b| b.to_vec());
            }
            let decoded = match existing {
                Some(bytes) => match de::<T>(bytes) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        *failure.borrow_mut() = Some(e);
                        return existing.map(|b| b.to_vec());
                    }
                },
                None => None,
            };
            match f(decoded) {
                Ok(next) => {
                    let encoded = match ser(&next) {
                        Ok(b) => b,
                        Err(e) => {
                            *failure.borrow_mut() = Some(e);
                            return existing.map(|b| b.to_vec());
                        }
                    };
                    *result.borrow_mut() = Some(next);
                    Some(encoded)
                }
                Err(e) => {
                    *failure.borrow_mut() = Some(e);
                    existing.map(|b| b.to_vec())
                }
            }
        })
        .map_err(storage_err)?;

        if let Some(e) = failure.into_inner() {
            return Err(e);
        }
        result
            .into_inner()
            .ok_or_else(|| GatekeeperError::Fatal("atomic_update produced no result".into()))
    }

    // ── Users ────────────────────────────────────────────────────────────────

    pub fn get_user(&self, user_id: UserId) -> Result<Option<UserEntitlement>, GatekeeperError> {
        match self.users.get(user_id.0.to_be_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    /// Insert a freshly seeded record; `Conflict` if one already exists.
    pub fn insert_user(&self, user: &UserEntitlement) -> Result<(), GatekeeperError> {
        let key = user.user_id.0.to_be_bytes();
        let bytes = ser(user)?;
        let prior = self.users.compare_and_swap(key, None::<&[u8]>, Some(bytes)).map_err(storage_err)?;
        prior
            .map_err(|_| GatekeeperError::Conflict(format!("user {} already exists", user.user_id)))
    }

    /// Atomically mutate an existing user record. `NotFound` if absent.
    pub fn update_user<F>(&self, user_id: UserId, f: F) -> Result<UserEntitlement, GatekeeperError>
    where
        F: FnMut(Option<UserEntitlement>) -> Result<UserEntitlement, GatekeeperError>,
    {
        let key = user_id.0.to_be_bytes();
        if !self.users.contains_key(key).map_err(storage_err)? {
            return Err(GatekeeperError::NotFound(format!("user {user_id}")));
        }
        Self::atomic_update(&self.users, &key, f)
    }

    /// Fetch-or-create: idempotently seed a user row on first contact, then
    /// return it. Used by the engine's "ensure user row" step (spec.md §4.5).
    pub fn ensure_user(&self, user_id: UserId, now: Timestamp) -> Result<UserEntitlement, GatekeeperError> {
        let key = user_id.0.to_be_bytes();
        Self::atomic_update(&self.users, &key, move |existing| match existing {
            Some(u) => Ok(u),
            None => Ok(UserEntitlement::new(user_id, now)),
        })
    }

    // ── Files ────────────────────────────────────────────────────────────────

    pub fn get_file(&self, post_no: PostNo) -> Result<Option<FileRecord>, GatekeeperError> {
        match self.files.get(post_no.0.to_be_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    /// Allocate the next monotonic post number and insert the record. The
    /// counter allocation and the insert are each CAS-safe individually, but
    /// a freshly allocated `post_no` can never already be occupied, so a
    /// `Conflict` here means the counter itself was corrupted.
    pub fn insert_file(&self, mut record: FileRecord) -> Result<FileRecord, GatekeeperError> {
        let next = self.next_counter("next_post_no")?;
        record.post_no = PostNo(next);
        let key = record.post_no.0.to_be_bytes();
        let bytes = ser(&record)?;
        let prior = self.files.compare_and_swap(key, None::<&[u8]>, Some(bytes)).map_err(storage_err)?;
        prior.map_err(|_| GatekeeperError::Conflict(format!("post_no {next} already exists")))?;
        Ok(record)
    }

    /// Atomically increment `downloads` and return the new count.
    pub fn increment_downloads(&self, post_no: PostNo) -> Result<u64, GatekeeperError> {
        let key = post_no.0.to_be_bytes();
        let updated = Self::atomic_update(&self.files, &key, |existing| {
            let mut record = existing
                .ok_or_else(|| GatekeeperError::NotFound(format!("file {}", post_no.0)))?;
            record.downloads += 1;
            Ok(record)
        })?;
        Ok(updated.downloads)
    }

    // ── Channels ─────────────────────────────────────────────────────────────

    pub fn put_channel(&self, entry: &ChannelEntry) -> Result<(), GatekeeperError> {
        let bytes = ser(entry)?;
        self.channels.insert(entry.handle.as_bytes(), bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_channel(&self, handle: &ChannelHandle) -> Result<Option<ChannelEntry>, GatekeeperError> {
        match self.channels.get(handle.as_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    pub fn delete_channel(&self, handle: &ChannelHandle) -> Result<(), GatekeeperError> {
        self.channels.remove(handle.as_bytes()).map_err(storage_err)?;
        Ok(())
    }

    /// Active channels ordered by `(display_order, inserted_at)` — the order
    /// the "must-join" gate presents them in (spec.md §4.2).
    pub fn list_active_channels(&self) -> Result<Vec<ChannelEntry>, GatekeeperError> {
        let mut all = Vec::new();
        for item in self.channels.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let entry: ChannelEntry = de(&bytes)?;
            if entry.active {
                all.push(entry);
            }
        }
        all.sort_by_key(|e| (e.display_order, e.inserted_at));
        Ok(all)
    }

    // ── Verification tokens ──────────────────────────────────────────────────

    pub fn get_token(&self, token_id: TokenId) -> Result<Option<VerificationToken>, GatekeeperError> {
        match self.tokens.get(token_id.as_bytes()).map_err(storage_err)? {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    pub fn insert_token(&self, token: &VerificationToken) -> Result<(), GatekeeperError> {
        let bytes = ser(token)?;
        let prior = self
            .tokens
            .compare_and_swap(token.token_id.as_bytes(), None::<&[u8]>, Some(bytes))
            .map_err(storage_err)?;
        prior.map_err(|_| GatekeeperError::Conflict(format!("token {} already exists", token.token_id)))
    }

    /// Atomically mutate an existing token. `NotFound` if absent.
    pub fn update_token<F>(&self, token_id: TokenId, f: F) -> Result<VerificationToken, GatekeeperError>
    where
        F: FnMut(Option<VerificationToken>) -> Result<VerificationToken, GatekeeperError>,
    {
        let key = *token_id.as_bytes();
        if !self.tokens.contains_key(key).map_err(storage_err)? {
            return Err(GatekeeperError::NotFound(format!("token {token_id}")));
        }
        Self::atomic_update(&self.tokens, &key, f)
    }

    /// Tokens past their grace period (spec.md §4.1 eviction note) — a
    /// periodic sweep may purge these; user entitlement rows are never
    /// swept this way.
    pub fn iter_evictable_tokens(&self, now: Timestamp, grace_seconds: i64) -> Result<Vec<TokenId>, GatekeeperError> {
        let mut out = Vec::new();
        for item in self.tokens.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            let token: VerificationToken = de(&bytes)?;
            let terminal = matches!(
                token.effective_status(now),
                TokenStatus::Completed | TokenStatus::Expired
            );
            if terminal && now > token.expires_at + grace_seconds {
                out.push(token.token_id);
            }
        }
        Ok(out)
    }

    pub fn delete_token(&self, token_id: TokenId) -> Result<(), GatekeeperError> {
        self.tokens.remove(token_id.as_bytes()).map_err(storage_err)?;
        Ok(())
    }

    /// The single-outstanding-token index (spec.md §4.3): at most one
    /// non-terminal token per user at a time. Mint is responsible for
    /// checking and updating this index atomically with the insert.
    pub fn current_token_id(&self, user_id: UserId) -> Result<Option<TokenId>, GatekeeperError> {
        match self.current_token.get(user_id.0.to_be_bytes()).map_err(storage_err)? {
            Some(bytes) => {
                let arr: [u8; 16] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| GatekeeperError::Serialization("malformed current_token entry".into()))?;
                Ok(Some(TokenId::from_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    pub fn set_current_token_id(&self, user_id: UserId, token_id: TokenId) -> Result<(), GatekeeperError> {
        self.current_token
            .insert(user_id.0.to_be_bytes(), token_id.as_bytes())
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn clear_current_token_id(&self, user_id: UserId) -> Result<(), GatekeeperError> {
        self.current_token.remove(user_id.0.to_be_bytes()).map_err(storage_err)?;
        Ok(())
    }

    // ── Settings ─────────────────────────────────────────────────────────────

    pub fn put_setting(&self, setting: &Setting) -> Result<(), GatekeeperError> {
        let bytes = ser(setting)?;
        self.settings.insert(setting.key.as_bytes(), bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn list_settings(&self) -> Result<Vec<Setting>, GatekeeperError> {
        let mut out = Vec::new();
        for item in self.settings.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(de(&bytes)?);
        }
        Ok(out)
    }

    // ── Operator action log ──────────────────────────────────────────────────

    pub fn append_operator_log(&self, mut entry: OperatorLogEntry) -> Result<OperatorLogEntry, GatekeeperError> {
        entry.log_id = self.next_counter("next_log_id")?;
        let key = entry.log_id.to_be_bytes();
        let bytes = ser(&entry)?;
        self.operator_log.insert(key, bytes).map_err(storage_err)?;
        Ok(entry)
    }

    /// All log entries in ascending `log_id` order. The tree is append-only
    /// and keyed by a monotonic big-endian id, so insertion order and key
    /// order coincide.
    pub fn list_operator_log(&self) -> Result<Vec<OperatorLogEntry>, GatekeeperError> {
        let mut out = Vec::new();
        for item in self.operator_log.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(de(&bytes)?);
        }
        Ok(out)
    }

    // ── Sequence counters (meta tree) ────────────────────────────────────────

    /// Allocate the next value of a monotonic counter. Goes through sled's
    /// own CAS retry (`fetch_and_update`) the same way `atomic_update` does
    /// for entity trees, rather than a bare get-then-insert — two concurrent
    /// uploads racing this function must never be handed the same counter
    /// value.
    fn next_counter(&self, key: &str) -> Result<u64, GatekeeperError> {
        let allocated: RefCell<Option<u64>> = RefCell::new(None);

        self.meta
            .fetch_and_update(key, |existing: Option<&[u8]>| {
                let current = existing
                    .map(|b| {
                        let mut arr = [0u8; 8];
                        arr.copy_from_slice(&b[..8]);
                        u64::from_be_bytes(arr)
                    })
                    .unwrap_or(1);
                *allocated.borrow_mut() = Some(current);
                Some((current + 1).to_be_bytes().to_vec())
            })
            .map_err(storage_err)?;

        allocated
            .into_inner()
            .ok_or_else(|| GatekeeperError::Fatal("next_counter produced no value".into()))
    }

    pub fn flush(&self) -> Result<(), GatekeeperError> {
        self._db.flush().map_err(storage_err)?;
        Ok(())
    }
}
