//! Append-only document store over sled.
//!
//! Records key as `doc/{booking_id}/{class}/` plus the big-endian sequence
//! number, so a prefix scan yields a booking's letters of one class in
//! issuance order. Inserts go through compare-and-swap on the empty slot,
//! which makes (booking, class, sequence) unique at the storage layer; a
//! lost race reports back as a conflict and the caller re-reads the latest
//! sequence and retries.
use crate::record::{DocumentClass, DocumentRecord};
use std::sync::Arc;

pub struct DocumentStore {
    instance: Arc<sled::Db>,
}

/// Outcome of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer already holds this (booking, class, sequence) slot.
    Conflict,
}

fn class_prefix(booking_id: &str, class: DocumentClass) -> Vec<u8> {
    format!("doc/{booking_id}/{class}/").into_bytes()
}

fn record_key(booking_id: &str, class: DocumentClass, sequence_no: u32) -> Vec<u8> {
    let mut key = class_prefix(booking_id, class);
    key.extend_from_slice(&sequence_no.to_be_bytes());
    key
}

impl DocumentStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    /// The baseline letter for a booking, if one was ever issued. At most
    /// one exists; lowest sequence wins if legacy data carries extras.
    pub fn baseline(&self, booking_id: &str) -> anyhow::Result<Option<DocumentRecord>> {
        let prefix = class_prefix(booking_id, DocumentClass::Placement);
        match self.instance.scan_prefix(prefix).next() {
            Some(kv) => {
                let (_, value) = kv?;
                Ok(Some(minicbor::decode(&value)?))
            }
            None => Ok(None),
        }
    }

    /// All amendments for a booking in sequence order.
    pub fn amendments(&self, booking_id: &str) -> anyhow::Result<Vec<DocumentRecord>> {
        let prefix = class_prefix(booking_id, DocumentClass::PlacementMod);
        let mut records = vec![];
        for kv in self.instance.scan_prefix(prefix) {
            let (_, value) = kv?;
            records.push(minicbor::decode(&value)?);
        }
        Ok(records)
    }

    /// Next sequence number for (booking, class): one past the highest
    /// issued, or 1 when nothing exists yet.
    pub fn next_sequence(&self, booking_id: &str, class: DocumentClass) -> anyhow::Result<u32> {
        let prefix = class_prefix(booking_id, class);
        match self.instance.scan_prefix(prefix).last() {
            Some(kv) => {
                let (key, _) = kv?;
                let tail: [u8; 4] = key[key.len() - 4..]
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("malformed document key in store"))?;
                Ok(u32::from_be_bytes(tail) + 1)
            }
            None => Ok(1),
        }
    }

    /// Persist a new record into its sequence slot. Atomic with the
    /// numbering: the slot is claimed and written in one compare-and-swap,
    /// so a number is never issued and then abandoned.
    pub fn insert(&self, record: &DocumentRecord) -> anyhow::Result<InsertOutcome> {
        let key = record_key(&record.booking_id, record.class, record.sequence_no);
        let bytes = minicbor::to_vec(record)?;

        match self
            .instance
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(_) => Ok(InsertOutcome::Conflict),
        }
    }
}
