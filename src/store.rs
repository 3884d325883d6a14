//! Document store with optimistic concurrency.
//!
//! Every document is kept next to a version number. Readers get a
//! [`Versioned`] copy; writers stage the documents they changed together with
//! the version they read, and [`GameStore::commit`] writes all of them or none,
//! refusing if any of them moved on in the meantime.
use super::competition::Competition;
use super::error::StoreError;
use super::record::PlayerProfile;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub doc: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    /// Version the document was read at. `None` means it must not exist yet.
    pub expected: Option<u64>,
    pub doc: T,
}

#[derive(Debug, Clone, Default)]
pub struct Commit {
    pub competitions: Vec<Staged<Competition>>,
    pub profiles: Vec<Staged<PlayerProfile>>,
}

impl Commit {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn competition(mut self, expected: Option<u64>, doc: Competition) -> Self {
        self.competitions.push(Staged { expected, doc });
        self
    }
    pub fn profile(mut self, expected: Option<u64>, doc: PlayerProfile) -> Self {
        self.profiles.push(Staged { expected, doc });
        self
    }
    pub fn is_empty(&self) -> bool {
        self.competitions.is_empty() && self.profiles.is_empty()
    }
}

pub trait GameStore: Send + Sync {
    fn competition(&self, id: &str) -> Result<Option<Versioned<Competition>>, StoreError>;

    fn profile(&self, user_id: &str) -> Result<Option<Versioned<PlayerProfile>>, StoreError>;

    /// Write every staged document atomically, each only if its stored version
    /// still matches. Fails with [`StoreError::Conflict`] otherwise.
    fn commit(&self, commit: Commit) -> Result<(), StoreError>;
}

pub fn competition_key(id: &str) -> Vec<u8> {
    format!("competition/{id}").into_bytes()
}

pub fn profile_key(user_id: &str) -> Vec<u8> {
    format!("profile/{user_id}").into_bytes()
}

// stored layout: [version, doc]
fn encode_stored<T: minicbor::Encode<()>>(version: u64, doc: &T) -> Result<Vec<u8>, StoreError> {
    let mut e = minicbor::Encoder::new(Vec::new());
    e.array(2)
        .and_then(|e| e.u64(version))
        .and_then(|e| e.encode(doc))
        .map_err(|err| StoreError::Encode(err.to_string()))?;
    Ok(e.into_writer())
}

fn decode_stored<T>(raw: &[u8]) -> Result<Versioned<T>, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    let mut d = minicbor::Decoder::new(raw);
    d.array()?;
    let version = d.u64()?;
    let doc = d.decode()?;
    Ok(Versioned { version, doc })
}

fn read_version(raw: &[u8]) -> Result<u64, minicbor::decode::Error> {
    let mut d = minicbor::Decoder::new(raw);
    d.array()?;
    d.u64()
}

struct PreparedWrite {
    key: Vec<u8>,
    expected: Option<u64>,
    value: Vec<u8>,
}

impl PreparedWrite {
    fn new<T: minicbor::Encode<()>>(
        key: Vec<u8>,
        expected: Option<u64>,
        doc: &T,
    ) -> Result<Self, StoreError> {
        let version = expected.map_or(1, |v| v + 1);
        Ok(Self {
            key,
            expected,
            value: encode_stored(version, doc)?,
        })
    }
}

/// [`GameStore`] on top of an embedded sled database.
#[derive(Clone)]
pub struct SledStore {
    instance: Arc<sled::Db>,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    fn load<T>(&self, key: Vec<u8>) -> Result<Option<Versioned<T>>, StoreError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        self.instance
            .get(key)?
            .map(|raw| decode_stored(&raw))
            .transpose()
    }
}

impl GameStore for SledStore {
    fn competition(&self, id: &str) -> Result<Option<Versioned<Competition>>, StoreError> {
        self.load(competition_key(id))
    }

    fn profile(&self, user_id: &str) -> Result<Option<Versioned<PlayerProfile>>, StoreError> {
        self.load(profile_key(user_id))
    }

    fn commit(&self, commit: Commit) -> Result<(), StoreError> {
        // encode up front, the transaction closure may run more than once
        let mut writes = Vec::with_capacity(commit.competitions.len() + commit.profiles.len());
        for staged in &commit.competitions {
            writes.push(PreparedWrite::new(
                competition_key(&staged.doc.id),
                staged.expected,
                &staged.doc,
            )?);
        }
        for staged in &commit.profiles {
            writes.push(PreparedWrite::new(
                profile_key(&staged.doc.user_id),
                staged.expected,
                &staged.doc,
            )?);
        }

        self.instance
            .transaction(|tx| -> ConflictableTransactionResult<(), StoreError> {
                for write in &writes {
                    let current = match tx.get(write.key.as_slice())? {
                        Some(raw) => Some(read_version(&raw).map_err(|err| {
                            ConflictableTransactionError::Abort(StoreError::Decode(err))
                        })?),
                        None => None,
                    };
                    if current != write.expected {
                        return Err(ConflictableTransactionError::Abort(StoreError::Conflict {
                            key: String::from_utf8_lossy(&write.key).into_owned(),
                        }));
                    }
                    tx.insert(write.key.as_slice(), write.value.as_slice())?;
                }
                Ok(())
            })
            .map_err(|err| match err {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => StoreError::Sled(err),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SledStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledStore::new(Arc::new(db))
    }

    #[test]
    fn insert_then_update_bumps_version() {
        let store = store();
        let competition = Competition::new("league_1", "ladder");

        store
            .commit(Commit::new().competition(None, competition.clone()))
            .unwrap();
        let loaded = store.competition("league_1").unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.doc, competition);

        store
            .commit(Commit::new().competition(Some(1), loaded.doc))
            .unwrap();
        assert_eq!(store.competition("league_1").unwrap().unwrap().version, 2);
    }

    #[test]
    fn stale_version_is_a_conflict_and_writes_nothing() {
        let store = store();
        store
            .commit(Commit::new().competition(None, Competition::new("league_1", "ladder")))
            .unwrap();

        let mut renamed = Competition::new("league_1", "renamed");
        renamed.add_participant("a");
        let stale = Commit::new()
            .profile(None, PlayerProfile::new("a", 20))
            .competition(None, renamed);

        let err = store.commit(stale).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(store.profile("a").unwrap().is_none());
        assert_eq!(store.competition("league_1").unwrap().unwrap().doc.name, "ladder");
    }

    #[test]
    fn missing_documents_load_as_none() {
        let store = store();
        assert!(store.competition("nope").unwrap().is_none());
        assert!(store.profile("nope").unwrap().is_none());
    }
}
