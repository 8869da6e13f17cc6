use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ReferenceError;
use crate::puzzle::{Board, Direction, CELLS};

/// Sixteen tiles packed four bits each, first cell in the high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn pack(tiles: &[u8; CELLS]) -> Self {
        Fingerprint(tiles.iter().fold(0u64, |packed, &tile| packed << 4 | tile as u64))
    }
}

/// A board's fingerprint and whether its mirror is the canonical orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalKey {
    pub fingerprint: Fingerprint,
    pub mirrored: bool,
}

impl CanonicalKey {
    pub fn of(board: &Board) -> Self {
        let regular = Fingerprint::pack(board.tiles());
        let mirrored = Fingerprint::pack(board.mirrored_tiles());
        if mirrored < regular {
            Self {
                fingerprint: mirrored,
                mirrored: true,
            }
        } else {
            Self {
                fingerprint: regular,
                mirrored: false,
            }
        }
    }

    /// Maps moves between the board's orientation and the canonical one.
    /// Reflection is its own inverse, so this works in both directions.
    pub fn orient(&self, moves: &[Direction]) -> Vec<Direction> {
        if self.mirrored {
            moves.iter().map(|m| m.mirrored()).collect()
        } else {
            moves.to_vec()
        }
    }
}

/// Exact distance of a board and optionally the start of one optimal solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub distance: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefix: Vec<Direction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    New,
    /// A record already existed and was left untouched
    AlreadyPresent,
}

/// Insert-only store of reference records. Implementations must tolerate
/// concurrent callers; two inserts for one fingerprint keep a single record.
pub trait ReferenceStore: Send + Sync {
    fn lookup(&self, fingerprint: Fingerprint) -> Result<Option<ReferenceRecord>, ReferenceError>;

    fn insert(&self, fingerprint: Fingerprint, record: ReferenceRecord) -> Result<Inserted, ReferenceError>;

    fn size(&self) -> Result<usize, ReferenceError>;
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    fingerprint: Fingerprint,
    #[serde(flatten)]
    record: ReferenceRecord,
}

/// Process-local collection; first writer wins.
#[derive(Debug, Default)]
pub struct InMemoryReferences {
    records: RwLock<HashMap<Fingerprint, ReferenceRecord>>,
}

impl InMemoryReferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a snapshot written by [`save_json`](Self::save_json).
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let entries: Vec<SnapshotEntry> = serde_json::from_slice(&fs::read(path)?)?;
        let records: HashMap<_, _> = entries
            .into_iter()
            .map(|entry| (entry.fingerprint, entry.record))
            .collect();
        info!(path = %path.display(), records = records.len(), "reference collection loaded");
        Ok(Self {
            records: RwLock::new(records),
        })
    }

    /// Writes every record, ordered by fingerprint.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ReferenceError> {
        let mut entries: Vec<SnapshotEntry> = self
            .records
            .read()
            .iter()
            .map(|(&fingerprint, record)| SnapshotEntry {
                fingerprint,
                record: record.clone(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.fingerprint);
        fs::write(path.as_ref(), serde_json::to_vec_pretty(&entries)?)?;
        debug!(path = %path.as_ref().display(), records = entries.len(), "reference collection saved");
        Ok(())
    }
}

impl ReferenceStore for InMemoryReferences {
    fn lookup(&self, fingerprint: Fingerprint) -> Result<Option<ReferenceRecord>, ReferenceError> {
        Ok(self.records.read().get(&fingerprint).cloned())
    }

    fn insert(&self, fingerprint: Fingerprint, record: ReferenceRecord) -> Result<Inserted, ReferenceError> {
        let mut records = self.records.write();
        if records.contains_key(&fingerprint) {
            return Ok(Inserted::AlreadyPresent);
        }
        records.insert(fingerprint, record);
        Ok(Inserted::New)
    }

    fn size(&self) -> Result<usize, ReferenceError> {
        Ok(self.records.read().len())
    }
}

type Job = Box<dyn FnOnce(&dyn ReferenceStore) + Send>;

const QUEUED_CALLS: usize = 16;

/// Runs calls on one long-lived worker thread and gives up after `timeout`.
/// An abandoned call finishes in the background and its answer is dropped;
/// calls still queued past their deadline are skipped.
pub struct TimeoutReferences {
    jobs: Sender<(Instant, Job)>,
    timeout: Duration,
}

impl TimeoutReferences {
    pub fn new(inner: Arc<dyn ReferenceStore>, timeout: Duration) -> Self {
        let (jobs, queue) = crossbeam_channel::bounded::<(Instant, Job)>(QUEUED_CALLS);
        let spawned = thread::Builder::new()
            .name("reference-worker".into())
            .spawn(move || {
                for (deadline, job) in queue {
                    if Instant::now() < deadline {
                        job(inner.as_ref());
                    }
                }
            });
        if let Err(e) = spawned {
            // every call then reports the collection as unavailable
            warn!(error = %e, "could not start the reference worker");
        }
        Self { jobs, timeout }
    }

    fn call<T, F>(&self, op: F) -> Result<T, ReferenceError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ReferenceStore) -> Result<T, ReferenceError> + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let (tx, rx) = crossbeam_channel::bounded(1);
        let job: Job = Box::new(move |store| {
            let _ = tx.send(op(store));
        });

        match self.jobs.send_deadline((deadline, job), deadline) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => return Err(ReferenceError::Timeout(self.timeout)),
            Err(SendTimeoutError::Disconnected(_)) => {
                return Err(ReferenceError::Unavailable("reference worker is not running".into()))
            }
        }

        match rx.recv_deadline(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ReferenceError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ReferenceError::Unavailable(
                "reference call ended without an answer".into(),
            )),
        }
    }
}

impl ReferenceStore for TimeoutReferences {
    fn lookup(&self, fingerprint: Fingerprint) -> Result<Option<ReferenceRecord>, ReferenceError> {
        self.call(move |store| store.lookup(fingerprint))
    }

    fn insert(&self, fingerprint: Fingerprint, record: ReferenceRecord) -> Result<Inserted, ReferenceError> {
        self.call(move |store| store.insert(fingerprint, record))
    }

    fn size(&self) -> Result<usize, ReferenceError> {
        self.call(|store| store.size())
    }
}
