//! Unit tests for the document store: sequence allocation, slot
//! uniqueness, and ordered retrieval.

use booking_letters::booking::{Booking, Day};
use booking_letters::canonical::project;
use booking_letters::record::{BaseRef, DocumentClass, DocumentRecord, new_document_id};
use booking_letters::store::{DocumentStore, InsertOutcome};
use sled::open;
use std::sync::Arc;
use tempfile::tempdir;

fn test_store(name: &str) -> anyhow::Result<(tempfile::TempDir, DocumentStore)> {
    let temp_dir = tempdir()?;
    let db = open(temp_dir.path().join(name))?;
    Ok((temp_dir, DocumentStore::new(Arc::new(db))))
}

fn record(booking_id: &str, class: DocumentClass, sequence_no: u32) -> DocumentRecord {
    let payload = project(
        &Booking::new(booking_id, "agr_1").set_route("rt_1", 100 + sequence_no),
        Day::from_ymd(2024, 1, 8).unwrap(),
    );
    let digest = payload.digest().unwrap();

    DocumentRecord {
        document_id: new_document_id().unwrap(),
        booking_id: booking_id.into(),
        class,
        sequence_no,
        letter_date: payload.letter_date,
        payload_cbor: minicbor::to_vec(&payload).unwrap(),
        digest,
        base: if class == DocumentClass::PlacementMod {
            Some(BaseRef {
                document_id: "letter_base".into(),
                digest: "basedigest".into(),
            })
        } else {
            None
        },
        diffs: vec![],
        signed_by: None,
        signed_for: None,
        artifact_ref: None,
    }
}

#[test]
fn sequence_starts_at_one_and_increments_per_class() -> anyhow::Result<()> {
    let (_tmp, store) = test_store("seq.db")?;

    assert_eq!(store.next_sequence("bkg_1", DocumentClass::Placement)?, 1);
    assert_eq!(store.next_sequence("bkg_1", DocumentClass::PlacementMod)?, 1);

    store.insert(&record("bkg_1", DocumentClass::Placement, 1))?;
    assert_eq!(store.next_sequence("bkg_1", DocumentClass::Placement)?, 2);
    // The amendment counter is independent of the baseline counter.
    assert_eq!(store.next_sequence("bkg_1", DocumentClass::PlacementMod)?, 1);

    store.insert(&record("bkg_1", DocumentClass::PlacementMod, 1))?;
    store.insert(&record("bkg_1", DocumentClass::PlacementMod, 2))?;
    assert_eq!(store.next_sequence("bkg_1", DocumentClass::PlacementMod)?, 3);

    Ok(())
}

#[test]
fn occupied_sequence_slot_reports_conflict() -> anyhow::Result<()> {
    let (_tmp, store) = test_store("conflict.db")?;

    let first = record("bkg_1", DocumentClass::PlacementMod, 1);
    let rival = record("bkg_1", DocumentClass::PlacementMod, 1);

    assert_eq!(store.insert(&first)?, InsertOutcome::Inserted);
    assert_eq!(store.insert(&rival)?, InsertOutcome::Conflict);

    // The loser did not clobber the winner.
    let stored = store.amendments("bkg_1")?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].document_id, first.document_id);

    Ok(())
}

#[test]
fn amendments_come_back_in_sequence_order() -> anyhow::Result<()> {
    let (_tmp, store) = test_store("ordering.db")?;

    // Insert out of order; the key layout orders the scan.
    store.insert(&record("bkg_1", DocumentClass::PlacementMod, 3))?;
    store.insert(&record("bkg_1", DocumentClass::PlacementMod, 1))?;
    store.insert(&record("bkg_1", DocumentClass::PlacementMod, 2))?;

    let seqs: Vec<u32> = store
        .amendments("bkg_1")?
        .iter()
        .map(|r| r.sequence_no)
        .collect();
    assert_eq!(seqs, vec![1, 2, 3]);

    Ok(())
}

#[test]
fn baseline_and_amendments_do_not_cross_bookings() -> anyhow::Result<()> {
    let (_tmp, store) = test_store("crosstalk.db")?;

    store.insert(&record("bkg_1", DocumentClass::Placement, 1))?;
    store.insert(&record("bkg_2", DocumentClass::Placement, 1))?;
    store.insert(&record("bkg_2", DocumentClass::PlacementMod, 1))?;

    let one = store.baseline("bkg_1")?.unwrap();
    assert_eq!(one.booking_id, "bkg_1");
    assert!(store.amendments("bkg_1")?.is_empty());
    assert_eq!(store.amendments("bkg_2")?.len(), 1);
    assert!(store.baseline("bkg_3")?.is_none());

    Ok(())
}
