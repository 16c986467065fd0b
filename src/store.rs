//! Document storage for swept addresses.
//!
//! Every address class lives in its own collection (`private_ips`,
//! `public_ips`) holding one document per unique address:
//!
//! ```json
//! {"ip": "10.0.0.5", "first_seen": 1718000000.25, "last_seen": 1718000610.5}
//! ```
//!
//! An upsert keyed by `ip` sets `first_seen` only when the document is created
//! and moves `last_seen` forward on every sighting.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use camino::Utf8PathBuf;
use ip_harvest::AddressClass;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Seconds since the Unix epoch, with sub-second precision.
pub fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Name of the collection holding one address class.
pub fn collection_name(class: AddressClass) -> &'static str {
    match class {
        AddressClass::Private => "private_ips",
        AddressClass::Public => "public_ips",
    }
}

/// One stored address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub ip: String,
    pub first_seen: f64,
    pub last_seen: f64,
}

/// What a batch upsert did to a collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    /// Documents created by this batch.
    pub inserted: usize,
    /// Existing documents whose `last_seen` moved.
    pub updated: usize,
}

/// A store of address documents, one collection per [`AddressClass`].
pub trait AddressStore {
    /// Upsert every address of `class`, stamping them with `seen_at`.
    fn upsert(
        &mut self,
        class: AddressClass,
        addresses: &[String],
        seen_at: f64,
    ) -> Result<UpsertOutcome>;

    /// Number of documents in the collection for `class`.
    fn count(&self, class: AddressClass) -> Result<usize>;

    /// Look up a single address.
    fn get(&self, class: AddressClass, ip: &str) -> Result<Option<Document>>;
}

/// Opens an [`AddressStore`]. Called once per sweep.
pub trait Connect {
    type Store: AddressStore;

    fn connect(&self) -> Result<Self::Store>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct Collection {
    docs: BTreeMap<String, Document>,
}

impl Collection {
    fn upsert(&mut self, addresses: &[String], seen_at: f64) -> UpsertOutcome {
        let mut outcome = UpsertOutcome::default();
        for ip in addresses {
            match self.docs.get_mut(ip) {
                Some(doc) => {
                    // a clock stepping backwards must not rewind last_seen
                    if seen_at > doc.last_seen {
                        doc.last_seen = seen_at;
                        outcome.updated += 1;
                    }
                }
                None => {
                    self.docs.insert(
                        ip.clone(),
                        Document {
                            ip: ip.clone(),
                            first_seen: seen_at,
                            last_seen: seen_at,
                        },
                    );
                    outcome.inserted += 1;
                }
            }
        }
        outcome
    }

    // the map key is the unique index; a document must agree with it
    fn check_keys(&self) -> std::result::Result<(), String> {
        for (key, doc) in &self.docs {
            if *key != doc.ip {
                return Err(format!("document {:?} stored under key {:?}", doc.ip, key));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Database {
    #[serde(default)]
    private_ips: Collection,
    #[serde(default)]
    public_ips: Collection,
}

impl Database {
    fn collection(&self, class: AddressClass) -> &Collection {
        match class {
            AddressClass::Private => &self.private_ips,
            AddressClass::Public => &self.public_ips,
        }
    }

    fn collection_mut(&mut self, class: AddressClass) -> &mut Collection {
        match class {
            AddressClass::Private => &mut self.private_ips,
            AddressClass::Public => &mut self.public_ips,
        }
    }
}

/// A database kept in a single JSON file.
///
/// Every upsert rewrites the file through a temporary sibling and a rename,
/// so readers never observe a half-written database.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    db: Database,
}

impl JsonStore {
    /// Open the database at `path`, starting empty when the file is absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = if path.exists() {
            let file = File::open(&path)?;
            let db: Database =
                serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::Corrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            for class in AddressClass::ALL {
                db.collection(class)
                    .check_keys()
                    .map_err(|reason| Error::Corrupt {
                        path: path.clone(),
                        reason,
                    })?;
            }
            db
        } else {
            Database::default()
        };
        debug!(
            path = %path.display(),
            private = db.private_ips.docs.len(),
            public = db.public_ips.docs.len(),
            "opened store"
        );
        Ok(JsonStore { path, db })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut out = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut out, &self.db)?;
        out.write_all(b"\n")?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl AddressStore for JsonStore {
    fn upsert(
        &mut self,
        class: AddressClass,
        addresses: &[String],
        seen_at: f64,
    ) -> Result<UpsertOutcome> {
        let outcome = self.db.collection_mut(class).upsert(addresses, seen_at);
        if outcome != UpsertOutcome::default() {
            self.flush()?;
        }
        Ok(outcome)
    }

    fn count(&self, class: AddressClass) -> Result<usize> {
        Ok(self.db.collection(class).docs.len())
    }

    fn get(&self, class: AddressClass, ip: &str) -> Result<Option<Document>> {
        Ok(self.db.collection(class).docs.get(ip).cloned())
    }
}

/// Opens a [`JsonStore`] named `<database>.json` inside a store directory.
#[derive(Clone, Debug)]
pub struct JsonConnector {
    dir: Utf8PathBuf,
    database: String,
}

impl JsonConnector {
    /// # Errors
    ///
    /// [`Error::InvalidDatabaseName`] if `database` is empty or contains a
    /// path separator.
    pub fn new(dir: Utf8PathBuf, database: impl Into<String>) -> Result<Self> {
        let database = database.into();
        if database.is_empty()
            || database == "."
            || database == ".."
            || database.contains(['/', '\\'])
        {
            return Err(Error::InvalidDatabaseName { name: database });
        }
        Ok(JsonConnector { dir, database })
    }

    /// Path of the database file.
    pub fn path(&self) -> Utf8PathBuf {
        self.dir.join(format!("{}.json", self.database))
    }
}

impl Connect for JsonConnector {
    type Store = JsonStore;

    fn connect(&self) -> Result<JsonStore> {
        fs::create_dir_all(&self.dir)?;
        let store = JsonStore::open(self.path())?;
        info!(
            "Using database: {}, collections: {}, {}",
            self.database,
            collection_name(AddressClass::Private),
            collection_name(AddressClass::Public)
        );
        Ok(store)
    }
}

/// An in-process store. Clones share the same collections, and connecting
/// hands out another clone.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    db: Arc<Mutex<Database>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_db<T>(&self, f: impl FnOnce(&mut Database) -> T) -> T {
        let mut db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut db)
    }
}

impl AddressStore for MemoryStore {
    fn upsert(
        &mut self,
        class: AddressClass,
        addresses: &[String],
        seen_at: f64,
    ) -> Result<UpsertOutcome> {
        Ok(self.with_db(|db| db.collection_mut(class).upsert(addresses, seen_at)))
    }

    fn count(&self, class: AddressClass) -> Result<usize> {
        Ok(self.with_db(|db| db.collection(class).docs.len()))
    }

    fn get(&self, class: AddressClass, ip: &str) -> Result<Option<Document>> {
        Ok(self.with_db(|db| db.collection(class).docs.get(ip).cloned()))
    }
}

impl Connect for MemoryStore {
    type Store = MemoryStore;

    fn connect(&self) -> Result<MemoryStore> {
        Ok(self.clone())
    }
}
