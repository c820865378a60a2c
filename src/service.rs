//! Issuance state machine for placement letters.
//!
//! One exposed operation: [`LetterService::issue_or_amend_letter`]. Every
//! call resolves to exactly one of five outcomes (first issuance, baseline
//! served with detection degraded, baseline served unchanged, existing
//! amendment reused, new amendment minted) and only the first and last of
//! those write anything.
use crate::booking::{Booking, Day};
use crate::canonical::{self, CanonicalPayload, ChangeOutcome};
use crate::diff::{self, DiffEntry};
use crate::error::IssueError;
use crate::record::{self, BaseRef, DocumentClass, DocumentRecord, Signatory, letter_number};
use crate::store::{DocumentStore, InsertOutcome};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of booking state, implemented by the surrounding application.
pub trait BookingReader {
    fn get_booking(&self, booking_id: &str) -> anyhow::Result<Booking>;
}

/// Who signs the requested letter.
#[derive(Debug, Clone, Default)]
pub struct SignerContext {
    pub signed_by: Option<Signatory>,
    pub signed_for: Option<Signatory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueStatus {
    FirstIssued,
    ServedUnchanged,
    ServedExistingAmendment,
    NewAmendmentIssued,
}

/// Result of one issuance request.
#[derive(Debug, Clone)]
pub struct LetterIssue {
    pub status: IssueStatus,
    pub record: DocumentRecord,
    /// Formal letter number for the served record, derived from the
    /// booking's current agreement facts.
    pub letter_no: String,
    /// False only when the stored baseline payload could not be read back,
    /// in which case the baseline is served verbatim and no amendment is
    /// attempted.
    pub change_detection_available: bool,
}

impl LetterIssue {
    pub fn diffs(&self) -> &[DiffEntry] {
        &self.record.diffs
    }
}

/// Decision table over an issuance request. Computed read-only, then acted
/// on in a single match so each branch's side-effect footprint stays
/// auditable: only `First` and `Mint` write.
enum Decision {
    First,
    Degraded(DocumentRecord),
    Unchanged(DocumentRecord),
    Reuse(DocumentRecord),
    Mint {
        baseline: DocumentRecord,
        base_digest: String,
    },
}

/// Bounded retry for lost compare-and-swap races on a sequence slot.
const MAX_SEQUENCE_ATTEMPTS: u32 = 5;

pub struct LetterService<R> {
    reader: R,
    store: DocumentStore,
}

impl<R: BookingReader> LetterService<R> {
    pub fn new(reader: R, instance: Arc<sled::Db>) -> Self {
        Self {
            reader,
            store: DocumentStore::new(instance),
        }
    }

    /// Issue the placement advice for a booking, or amend it if the
    /// booking's facts moved since the baseline was frozen.
    ///
    /// `letter_date` is ISO `YYYY-MM-DD`; it dates the letter but never
    /// participates in change detection. Retrying with no intervening
    /// booking mutation always returns the already-issued record.
    pub fn issue_or_amend_letter(
        &self,
        booking_id: &str,
        letter_date: &str,
        signer: SignerContext,
    ) -> anyhow::Result<LetterIssue> {
        // Reject the date before any projection or hashing work.
        let letter_day = Day::parse_iso(letter_date)
            .ok_or_else(|| IssueError::InvalidLetterDate(letter_date.to_string()))?;

        let booking = self.reader.get_booking(booking_id)?;
        if booking.cancelled {
            return Err(IssueError::BlockedByCancellation(booking.booking_id).into());
        }

        let current = canonical::project(&booking, letter_day);
        let current_digest = current.digest()?;

        // Which class the most recent lost race was on; only read after
        // exhaustion, and exhaustion implies at least one conflict set it.
        let mut contested = DocumentClass::Placement;
        for _ in 0..MAX_SEQUENCE_ATTEMPTS {
            match self.decide(booking_id, &current_digest)? {
                Decision::First => {
                    let record =
                        self.build_record(&current, &current_digest, 1, None, vec![], &signer)?;
                    if self.store.insert(&record)? == InsertOutcome::Inserted {
                        info!(booking_id = %booking_id, digest = %current_digest,
                              "issued baseline placement advice");
                        return Ok(self.issue(IssueStatus::FirstIssued, record, &current, true));
                    }
                    // Lost the race for sequence 1; re-run the decision
                    // against the record that won.
                    contested = DocumentClass::Placement;
                    debug!(booking_id = %booking_id, "baseline slot taken, re-deciding");
                }
                Decision::Degraded(baseline) => {
                    warn!(booking_id = %booking_id, document_id = %baseline.document_id,
                          "stored baseline payload unreadable; change detection unavailable");
                    return Ok(self.issue(IssueStatus::ServedUnchanged, baseline, &current, false));
                }
                Decision::Unchanged(baseline) => {
                    debug!(booking_id = %booking_id, "booking unchanged, serving baseline");
                    return Ok(self.issue(IssueStatus::ServedUnchanged, baseline, &current, true));
                }
                Decision::Reuse(amendment) => {
                    debug!(booking_id = %booking_id, sequence_no = amendment.sequence_no,
                           "current state already amended, serving existing amendment");
                    return Ok(self.issue(
                        IssueStatus::ServedExistingAmendment,
                        amendment,
                        &current,
                        true,
                    ));
                }
                Decision::Mint {
                    baseline,
                    base_digest,
                } => {
                    let base_payload = baseline.payload()?;
                    let diffs = diff::compute_diff(base_payload.facts(), current.facts());
                    let sequence_no = self
                        .store
                        .next_sequence(booking_id, DocumentClass::PlacementMod)?;
                    let base = BaseRef {
                        document_id: baseline.document_id.clone(),
                        digest: base_digest,
                    };
                    let record = self.build_record(
                        &current,
                        &current_digest,
                        sequence_no,
                        Some(base),
                        diffs,
                        &signer,
                    )?;
                    if self.store.insert(&record)? == InsertOutcome::Inserted {
                        info!(booking_id = %booking_id, sequence_no, digest = %current_digest,
                              "issued modification advice");
                        return Ok(self.issue(
                            IssueStatus::NewAmendmentIssued,
                            record,
                            &current,
                            true,
                        ));
                    }
                    // A concurrent writer took this sequence; it may even
                    // have minted our exact digest, which the next decision
                    // pass resolves as a reuse.
                    contested = DocumentClass::PlacementMod;
                    debug!(booking_id = %booking_id, sequence_no,
                           "amendment sequence conflict, retrying");
                }
            }
        }

        Err(IssueError::SequenceConflict {
            booking_id: booking_id.to_string(),
            class: contested,
            attempts: MAX_SEQUENCE_ATTEMPTS,
        }
        .into())
    }

    /// Classify the request without side effects.
    fn decide(&self, booking_id: &str, current_digest: &str) -> anyhow::Result<Decision> {
        let Some(baseline) = self.store.baseline(booking_id)? else {
            return Ok(Decision::First);
        };

        // Never trust the cached digest blindly: re-derive it from the
        // stored payload so offline corruption surfaces here.
        let base_digest = match baseline.payload() {
            Ok(payload) => payload.digest()?,
            Err(_) => return Ok(Decision::Degraded(baseline)),
        };

        if canonical::detect(&base_digest, current_digest) == ChangeOutcome::Unchanged {
            return Ok(Decision::Unchanged(baseline));
        }

        if let Some(existing) = self
            .store
            .amendments(booking_id)?
            .into_iter()
            .find(|m| m.digest == current_digest)
        {
            return Ok(Decision::Reuse(existing));
        }

        Ok(Decision::Mint {
            baseline,
            base_digest,
        })
    }

    fn build_record(
        &self,
        current: &CanonicalPayload,
        current_digest: &str,
        sequence_no: u32,
        base: Option<BaseRef>,
        diffs: Vec<DiffEntry>,
        signer: &SignerContext,
    ) -> anyhow::Result<DocumentRecord> {
        let class = if base.is_some() {
            DocumentClass::PlacementMod
        } else {
            DocumentClass::Placement
        };

        let mut record = DocumentRecord {
            document_id: record::new_document_id()?,
            booking_id: current.facts().booking_id.clone(),
            class,
            sequence_no,
            letter_date: current.letter_date,
            payload_cbor: minicbor::to_vec(current)?,
            digest: current_digest.to_string(),
            base,
            diffs,
            signed_by: signer.signed_by.clone(),
            signed_for: signer.signed_for.clone(),
            artifact_ref: None,
        };
        record.artifact_ref = Some(format!(
            "letters/{}/{}",
            record.booking_id,
            record.artifact_name()
        ));
        Ok(record)
    }

    fn issue(
        &self,
        status: IssueStatus,
        record: DocumentRecord,
        current: &CanonicalPayload,
        change_detection_available: bool,
    ) -> LetterIssue {
        let letter_no = letter_number(current.facts(), record.class, record.sequence_no);
        LetterIssue {
            status,
            record,
            letter_no,
            change_detection_available,
        }
    }
}
