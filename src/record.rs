//! The persisted, immutable unit: one issued letter.
use crate::booking::Day;
use crate::canonical::{CanonicalPayload, HashableFacts};
use crate::diff::DiffEntry;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentClass {
    #[n(0)]
    Placement,
    #[n(1)]
    PlacementMod,
}

impl fmt::Display for DocumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            DocumentClass::Placement => "PLACEMENT",
            DocumentClass::PlacementMod => "PLACEMENT_MOD",
        };
        f.write_str(tag)
    }
}

/// Back-reference from an amendment to the baseline it amends, carrying the
/// baseline's digest as it stood at issue time.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct BaseRef {
    #[n(0)]
    pub document_id: String,
    #[n(1)]
    pub digest: String,
}

/// Who signs the letter and on whose behalf.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Signatory {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub designation: String,
}

/// One issued letter for a booking. Created once, never updated or deleted.
///
/// The canonical payload is kept as the raw CBOR bytes it was frozen with;
/// the digest is a cache over those bytes' facts, always re-derivable. Bytes
/// that no longer decode are the data-integrity condition that degrades
/// change detection for the booking.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    #[n(0)]
    pub document_id: String,
    #[n(1)]
    pub booking_id: String,
    #[n(2)]
    pub class: DocumentClass,
    #[n(3)]
    pub sequence_no: u32,
    #[n(4)]
    pub letter_date: Day,
    #[cbor(n(5), with = "minicbor::bytes")]
    pub payload_cbor: Vec<u8>,
    #[n(6)]
    pub digest: String,
    #[n(7)]
    pub base: Option<BaseRef>,
    #[n(8)]
    pub diffs: Vec<DiffEntry>,
    #[n(9)]
    pub signed_by: Option<Signatory>,
    #[n(10)]
    pub signed_for: Option<Signatory>,
    /// Opaque pointer to the rendered artifact; the renderer itself lives
    /// outside this core.
    #[n(11)]
    pub artifact_ref: Option<String>,
}

impl DocumentRecord {
    /// Decode the frozen canonical payload. Failure here means the stored
    /// bytes are corrupted or from an unreadable legacy shape.
    pub fn payload(&self) -> anyhow::Result<CanonicalPayload> {
        if self.payload_cbor.is_empty() {
            anyhow::bail!(
                "document {} has no stored canonical payload",
                self.document_id
            );
        }
        Ok(minicbor::decode(&self.payload_cbor)?)
    }

    /// Deterministic artifact name the renderer writes to, mirroring the
    /// per-booking letters directory layout.
    pub fn artifact_name(&self) -> String {
        match self.class {
            DocumentClass::Placement => format!("placement_advice_v{:03}.pdf", self.sequence_no),
            DocumentClass::PlacementMod => format!("placement_mod_v{:03}.pdf", self.sequence_no),
        }
    }
}

/// Mint a fresh document identifier: a uuid7 carried under the `letter_`
/// prefix, bech32m-encoded so ids stay safe in log lines and file names.
pub fn new_document_id() -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse("letter_")?;
    Ok(bech32::encode::<bech32::Bech32m>(hrp, uuid7::uuid7().as_bytes())?)
}

/// Formal letter number printed on the document head.
pub fn letter_number(facts: &HashableFacts, class: DocumentClass, sequence_no: u32) -> String {
    let prefix = facts
        .placement_ref_prefix
        .as_deref()
        .unwrap_or("")
        .trim()
        .trim_matches('/');

    match class {
        DocumentClass::Placement => {
            format!("No.{}/Transport/Placement/{}", prefix, facts.trip_serial)
        }
        DocumentClass::PlacementMod => format!(
            "No.{}/Transport/Placement/Mod/{}/{}",
            prefix, facts.trip_serial, sequence_no
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::Booking;
    use crate::canonical::project;

    #[test]
    fn record_encoding() {
        let payload = project(
            &Booking::new("bkg_1", "agr_1"),
            Day::from_ymd(2024, 1, 8).unwrap(),
        );
        let original = DocumentRecord {
            document_id: "letter_1abc".into(),
            booking_id: "bkg_1".into(),
            class: DocumentClass::Placement,
            sequence_no: 1,
            letter_date: payload.letter_date,
            payload_cbor: minicbor::to_vec(&payload).unwrap(),
            digest: payload.digest().unwrap(),
            base: None,
            diffs: vec![],
            signed_by: Some(Signatory {
                name: "R. Iyer".into(),
                designation: "Transport Officer".into(),
            }),
            signed_for: None,
            artifact_ref: None,
        };

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: DocumentRecord = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
        assert_eq!(decode.payload().unwrap(), payload);
    }

    #[test]
    fn stored_digest_is_rederivable_from_stored_payload() {
        let payload = project(
            &Booking::new("bkg_1", "agr_1").set_route("rt_9", 300),
            Day::from_ymd(2024, 1, 8).unwrap(),
        );
        let record = DocumentRecord {
            document_id: "letter_1xyz".into(),
            booking_id: "bkg_1".into(),
            class: DocumentClass::Placement,
            sequence_no: 1,
            letter_date: payload.letter_date,
            payload_cbor: minicbor::to_vec(&payload).unwrap(),
            digest: payload.digest().unwrap(),
            base: None,
            diffs: vec![],
            signed_by: None,
            signed_for: None,
            artifact_ref: None,
        };

        let rederived = record.payload().unwrap().digest().unwrap();
        assert_eq!(rederived, record.digest);
    }

    #[test]
    fn corrupted_payload_fails_loudly() {
        let record = DocumentRecord {
            document_id: "letter_1bad".into(),
            booking_id: "bkg_1".into(),
            class: DocumentClass::Placement,
            sequence_no: 1,
            letter_date: Day::from_ymd(2024, 1, 8).unwrap(),
            payload_cbor: vec![0xff, 0x00, 0x13],
            digest: String::new(),
            base: None,
            diffs: vec![],
            signed_by: None,
            signed_for: None,
            artifact_ref: None,
        };

        assert!(record.payload().is_err());
    }

    #[test]
    fn document_ids_are_prefixed_and_never_repeat() {
        let one = new_document_id().unwrap();
        let two = new_document_id().unwrap();

        assert!(one.starts_with("letter_"));
        assert_ne!(one, two);
    }

    #[test]
    fn letter_numbers_follow_the_reference_prefix() {
        let mut facts = project(
            &Booking::new("bkg_1", "agr_1")
                .set_placement_ref_prefix("SA/A/RS/ED/OT/")
                .set_trip_serial(4),
            Day::from_ymd(2024, 1, 8).unwrap(),
        )
        .facts;

        assert_eq!(
            letter_number(&facts, DocumentClass::Placement, 1),
            "No.SA/A/RS/ED/OT/Transport/Placement/4"
        );
        assert_eq!(
            letter_number(&facts, DocumentClass::PlacementMod, 2),
            "No.SA/A/RS/ED/OT/Transport/Placement/Mod/4/2"
        );

        facts.placement_ref_prefix = None;
        assert_eq!(
            letter_number(&facts, DocumentClass::Placement, 1),
            "No./Transport/Placement/4"
        );
    }
}
