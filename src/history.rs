//! Append-only audit records: per-account history and declared results
//!
//! Both logs sort newest-first by placing an inverted big-endian timestamp
//! right after the prefix. Pages resume from a hex-encoded last key.

use crate::{
    errors::{LedgerResult, ValidationError},
    games::types::{HistoryEntry, HistoryKind, HistoryStatus, WinResult},
    storage::{decode_json, AtomicWrite, SharedStore},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

const HISTORY_PREFIX: &str = "history/";
const RESULT_PREFIX: &[u8] = b"result/";

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

/// One page of a newest-first listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Pass back to fetch the next page; absent on the last page
    pub next_cursor: Option<String>,
}

fn inverted_timestamp(at: DateTime<Utc>) -> [u8; 8] {
    let micros = at.timestamp_micros().max(0) as u64;
    (u64::MAX - micros).to_be_bytes()
}

pub fn history_prefix(owner: &str) -> Vec<u8> {
    format!("{}{}/", HISTORY_PREFIX, owner).into_bytes()
}

fn history_key(entry: &HistoryEntry) -> Vec<u8> {
    // Key layout: prefix | inv_ts(be) | entry id
    let mut key = history_prefix(&entry.owner);
    key.extend_from_slice(&inverted_timestamp(entry.timestamp));
    key.extend_from_slice(entry.id.as_bytes());
    key
}

fn result_key(result: &WinResult) -> Vec<u8> {
    let mut key = Vec::with_capacity(RESULT_PREFIX.len() + 8 + result.id.len());
    key.extend_from_slice(RESULT_PREFIX);
    key.extend_from_slice(&inverted_timestamp(result.timestamp));
    key.extend_from_slice(result.id.as_bytes());
    key
}

/// Build a history record with a fresh id
pub fn new_entry(
    owner: &str,
    kind: HistoryKind,
    amount: u64,
    description: impl Into<String>,
    status: HistoryStatus,
    at: DateTime<Utc>,
) -> HistoryEntry {
    HistoryEntry {
        id: Uuid::new_v4().to_string(),
        owner: owner.to_string(),
        kind,
        amount,
        description: description.into(),
        timestamp: at,
        status,
    }
}

/// Add `entry` to a pending commit. History keys are unique so no check is needed.
pub fn prepare_entry(write: &mut AtomicWrite, entry: &HistoryEntry) -> LedgerResult<()> {
    write.put_json(history_key(entry), entry)?;
    Ok(())
}

pub fn prepare_result(write: &mut AtomicWrite, result: &WinResult) -> LedgerResult<()> {
    write.put_json(result_key(result), result)?;
    Ok(())
}

fn decode_cursor(prefix: &[u8], cursor_hex: Option<&str>) -> LedgerResult<Option<Vec<u8>>> {
    let Some(cursor) = cursor_hex else {
        return Ok(None);
    };
    let bytes = hex::decode(cursor)
        .map_err(|e| ValidationError::InvalidCursor(format!("not hex: {}", e)))?;
    // A cursor from another listing would page through foreign keys
    if !bytes.starts_with(prefix) {
        return Err(ValidationError::InvalidCursor("cursor does not belong to this listing".to_string()).into());
    }
    Ok(Some(bytes))
}

/// Read access to the audit logs
pub struct AuditLog {
    store: SharedStore,
}

impl AuditLog {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// An account's history, newest first
    pub fn history_page(
        &self,
        owner: &str,
        cursor_hex: Option<&str>,
        limit: usize,
    ) -> LedgerResult<Page<HistoryEntry>> {
        self.page(&history_prefix(owner), cursor_hex, limit)
    }

    /// Declared results, newest first
    pub fn results_page(&self, cursor_hex: Option<&str>, limit: usize) -> LedgerResult<Page<WinResult>> {
        self.page(RESULT_PREFIX, cursor_hex, limit)
    }

    fn page<T: serde::de::DeserializeOwned>(
        &self,
        prefix: &[u8],
        cursor_hex: Option<&str>,
        limit: usize,
    ) -> LedgerResult<Page<T>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let cursor = decode_cursor(prefix, cursor_hex)?;
        let rows = self.store.scan_prefix(prefix, cursor.as_deref(), limit)?;

        let mut items = Vec::with_capacity(rows.len());
        let mut last_key = None;
        for (key, raw) in &rows {
            items.push(decode_json(key, &raw.value)?);
            last_key = Some(key);
        }

        // Only hand out a cursor when the page was full
        let next_cursor = if rows.len() >= limit {
            last_key.map(hex::encode)
        } else {
            None
        };

        tracing::debug!(
            prefix = %String::from_utf8_lossy(prefix),
            returned = items.len(),
            has_more = next_cursor.is_some(),
            "Audit page loaded"
        );
        Ok(Page { items, next_cursor })
    }
}
