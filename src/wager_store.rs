//! Pending and settled wager records
//!
//! A wager lives under `wager/pending/{id}` until settlement moves it to
//! `wager/settled/{id}` in the same commit that pays it out. The pending
//! partition therefore doubles as the settlement work queue.

use crate::{
    errors::LedgerResult,
    games::types::{Wager, WagerOutcome},
    optimistic::retry_on_conflict,
    storage::{decode_json, get_json, AtomicWrite, CommitOutcome, SharedStore, Versioned},
};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

const PENDING_PREFIX: &[u8] = b"wager/pending/";
const SETTLED_PREFIX: &[u8] = b"wager/settled/";

pub fn pending_key(id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(PENDING_PREFIX.len() + id.len());
    key.extend_from_slice(PENDING_PREFIX);
    key.extend_from_slice(id.as_bytes());
    key
}

pub fn settled_key(id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(SETTLED_PREFIX.len() + id.len());
    key.extend_from_slice(SETTLED_PREFIX);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Add a new pending wager to a commit. The key must not exist yet.
pub fn prepare_record(write: &mut AtomicWrite, wager: &Wager) -> LedgerResult<()> {
    let key = pending_key(&wager.id);
    write.check(key.clone(), None);
    write.put_json(key, wager)?;
    Ok(())
}

/// Move a pending wager to the settled partition with its final status,
/// conditioned on the pending record being unchanged. Returns `None` without
/// touching `write` when the record is no longer pending.
pub fn prepare_retire(
    write: &mut AtomicWrite,
    pending: &Versioned<Wager>,
    outcome: WagerOutcome,
    at: DateTime<Utc>,
) -> LedgerResult<Option<Wager>> {
    let Some(settled) = pending.value.retire(outcome, at) else {
        return Ok(None);
    };
    let key = pending_key(&settled.id);
    write.check(key.clone(), Some(pending.version));
    write.delete(key);
    write.put_json(settled_key(&settled.id), &settled)?;
    Ok(Some(settled))
}

pub struct WagerStore {
    store: SharedStore,
    page_size: usize,
    max_attempts: u32,
}

impl WagerStore {
    pub fn new(store: SharedStore, page_size: usize, max_attempts: u32) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            max_attempts,
        }
    }

    pub fn load_pending(&self, id: &str) -> LedgerResult<Option<Versioned<Wager>>> {
        get_json(&*self.store, &pending_key(id))
    }

    /// Authoritative record from whichever partition holds it
    pub fn get_wager(&self, id: &str) -> LedgerResult<Option<Wager>> {
        if let Some(pending) = self.load_pending(id)? {
            return Ok(Some(pending.value));
        }
        Ok(get_json::<Wager>(&*self.store, &settled_key(id))?.map(|v| v.value))
    }

    /// Standalone retirement. A wager that is already settled or unknown is a no-op.
    pub fn retire(&self, id: &str, outcome: WagerOutcome, at: DateTime<Utc>) -> LedgerResult<Option<Wager>> {
        retry_on_conflict(self.max_attempts, |_| {
            let Some(pending) = self.load_pending(id)? else {
                return Ok(Some(None));
            };
            let mut write = AtomicWrite::new();
            let Some(settled) = prepare_retire(&mut write, &pending, outcome, at)? else {
                return Ok(Some(None));
            };
            match self.store.commit(write)? {
                CommitOutcome::Committed(_) => Ok(Some(Some(settled))),
                CommitOutcome::Conflict => Ok(None),
            }
        })
    }

    /// Lazily page through every pending wager in key order
    pub fn scan_pending(&self) -> PendingScan {
        PendingScan {
            store: self.store.clone(),
            page_size: self.page_size,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Outstanding wagers placed by `owner`
    pub fn pending_for(&self, owner: &str) -> LedgerResult<Vec<Wager>> {
        let mut wagers = Vec::new();
        for item in self.scan_pending() {
            let wager = item?.value;
            if wager.owner == owner {
                wagers.push(wager);
            }
        }
        wagers.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        Ok(wagers)
    }
}

/// Forward-only iterator over `wager/pending/`.
///
/// Each page resumes strictly after the last key returned, so records deleted
/// behind the cursor are never revisited and records inserted behind it are
/// left for the next run.
pub struct PendingScan {
    store: SharedStore,
    page_size: usize,
    cursor: Option<Vec<u8>>,
    buffer: VecDeque<Versioned<Wager>>,
    exhausted: bool,
}

impl PendingScan {
    fn fill(&mut self) -> LedgerResult<()> {
        let rows = self
            .store
            .scan_prefix(PENDING_PREFIX, self.cursor.as_deref(), self.page_size)?;
        if rows.len() < self.page_size {
            self.exhausted = true;
        }
        for (key, raw) in rows {
            let wager = decode_json(&key, &raw.value)?;
            self.buffer.push_back(Versioned {
                version: raw.version,
                value: wager,
            });
            self.cursor = Some(key);
        }
        tracing::debug!(
            buffered = self.buffer.len(),
            exhausted = self.exhausted,
            "Pending wager page loaded"
        );
        Ok(())
    }
}

impl Iterator for PendingScan {
    type Item = LedgerResult<Versioned<Wager>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
