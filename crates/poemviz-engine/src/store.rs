//! Sparse, index-addressed result storage shared by generation and playback.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use poemviz_models::{GenerationResult, RunId};
use tokio::sync::watch;

use crate::error::{StoreError, StoreResult};

/// How a successful write changed the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// The slot was empty.
    Inserted,
    /// A real image replaced an eager placeholder.
    Superseded,
}

/// Result of a successful [`ResultStore::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub kind: WriteKind,
    /// Non-empty slots right after this write.
    pub completed: usize,
}

#[derive(Debug)]
struct Slot {
    result: GenerationResult,
    writes: u32,
}

/// Results for one run, addressed by segment index.
///
/// Holes are expected while generation is in flight. A slot is written at
/// most once, except that a placeholder may be replaced by a real image.
/// Readers never observe a partially written entry.
#[derive(Debug)]
pub struct ResultStore {
    run_id: RunId,
    slots: RwLock<Vec<Option<Slot>>>,
    filled: AtomicUsize,
    sealed: AtomicBool,
    closed: AtomicBool,
    version: watch::Sender<u64>,
}

impl ResultStore {
    pub fn new(run_id: RunId, total: usize) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            run_id,
            slots: RwLock::new((0..total).map(|_| None).collect()),
            filled: AtomicUsize::new(0),
            sealed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            version,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Number of segments in the run.
    pub fn len(&self) -> usize {
        self.read_slots(|slots| slots.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `result` in the slot named by its index.
    pub fn write(&self, result: GenerationResult) -> StoreResult<WriteOutcome> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }

        let index = result.index;
        let outcome = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            let total = slots.len();
            let slot = slots
                .get_mut(index)
                .ok_or(StoreError::OutOfRange { index, total })?;

            let kind = match slot {
                None => {
                    *slot = Some(Slot { result, writes: 1 });
                    self.filled.fetch_add(1, Ordering::AcqRel);
                    WriteKind::Inserted
                }
                Some(existing)
                    if existing.result.origin.is_placeholder()
                        && !result.origin.is_placeholder() =>
                {
                    existing.result = result;
                    existing.writes += 1;
                    WriteKind::Superseded
                }
                Some(_) => return Err(StoreError::AlreadyWritten(index)),
            };

            WriteOutcome {
                kind,
                completed: self.filled.load(Ordering::Acquire),
            }
        };

        self.version.send_modify(|v| *v += 1);
        Ok(outcome)
    }

    /// Clone of the entry at `index`, if present.
    pub fn get(&self, index: usize) -> Option<GenerationResult> {
        self.read_slots(|slots| {
            slots
                .get(index)
                .and_then(|slot| slot.as_ref())
                .map(|slot| slot.result.clone())
        })
    }

    pub fn contains(&self, index: usize) -> bool {
        self.read_slots(|slots| matches!(slots.get(index), Some(Some(_))))
    }

    /// How many times the slot at `index` has been written.
    pub fn write_count(&self, index: usize) -> u32 {
        self.read_slots(|slots| {
            slots
                .get(index)
                .and_then(|slot| slot.as_ref())
                .map(|slot| slot.writes)
                .unwrap_or(0)
        })
    }

    /// Number of non-empty slots.
    pub fn completed_count(&self) -> usize {
        self.filled.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count() == self.len()
    }

    /// Present entries in index order.
    pub fn snapshot(&self) -> Vec<GenerationResult> {
        self.read_slots(|slots| {
            slots
                .iter()
                .flatten()
                .map(|slot| slot.result.clone())
                .collect()
        })
    }

    /// Mark generation finished. Playback uses this to tell the end of the
    /// poem from a slot that is still being generated.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
        self.version.send_modify(|v| *v += 1);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Reject all further writes. Used when a run is stopped or aborted.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.version.send_modify(|v| *v += 1);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Receiver that changes on every write, seal and close.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Wait until the slot at `index` holds an entry.
    ///
    /// Returns `false` if the store is closed first.
    pub async fn wait_for(&self, index: usize) -> bool {
        let mut changes = self.subscribe();
        loop {
            if self.contains(index) {
                return true;
            }
            if self.is_closed() {
                return false;
            }
            if changes.changed().await.is_err() {
                return self.contains(index);
            }
        }
    }

    fn read_slots<T>(&self, f: impl FnOnce(&[Option<Slot>]) -> T) -> T {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        f(&slots)
    }
}
