//! Canonical projection and content hashing.
//!
//! A booking is flattened into [`HashableFacts`]: a plain, order-normalized
//! value with no volatile fields. The letter date lives one level up on
//! [`CanonicalPayload`] and never reaches the hasher, so two letters dated
//! differently over the same booking state carry the same digest. The digest
//! is SHA-256 over the deterministic CBOR encoding of the facts; the typed
//! shape fixes both the key set and the key order at every nesting level.
use crate::booking::{AuthorityRole, Booking, Day, MaterialMode, MaterialTable};

/// Authority reduced to the fields a letter cares about.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct CanonAuthority {
    #[n(0)]
    pub authority_id: String,
    #[n(1)]
    pub role: AuthorityRole,
    #[n(2)]
    pub sequence_index: u32,
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub location_code: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct CanonMaterialLine {
    #[n(0)]
    pub sequence_index: u32,
    #[n(1)]
    pub description: String,
    #[n(2)]
    pub unit: String,
    #[n(3)]
    pub quantity: Option<f64>,
    #[n(4)]
    pub rate: Option<f64>,
    #[n(5)]
    pub amount: Option<f64>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct CanonMaterial {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub sequence_index: u32,
    #[n(2)]
    pub booking_authority_id: Option<String>,
    #[n(3)]
    pub mode: MaterialMode,
    #[n(4)]
    pub total_quantity: Option<f64>,
    #[n(5)]
    pub total_quantity_unit: String,
    #[n(6)]
    pub total_amount: Option<f64>,
    #[n(7)]
    pub lines: Vec<CanonMaterialLine>,
}

/// The hashing input: everything change detection compares, nothing it
/// must ignore. The letter date is structurally absent.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct HashableFacts {
    #[n(0)]
    pub booking_id: String,
    #[n(1)]
    pub agreement_id: String,
    #[n(2)]
    pub trip_serial: u32,
    #[n(3)]
    pub placement_date: Day,
    #[n(4)]
    pub loa_number: String,
    #[n(5)]
    pub placement_ref_prefix: Option<String>,
    #[n(6)]
    pub company_name: String,
    #[n(7)]
    pub route_id: String,
    #[n(8)]
    pub route_total_km: u32,
    #[n(9)]
    pub lorry_capacity: u32,
    #[n(10)]
    pub lorry_carrier_size: String,
    #[n(11)]
    pub loading: Vec<CanonAuthority>,
    #[n(12)]
    pub unloading: Vec<CanonAuthority>,
    #[n(13)]
    pub materials: Vec<CanonMaterial>,
    #[n(14)]
    pub requires_attachment: bool,
}

/// What a letter freezes: the hashed facts plus the date the letter bears.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct CanonicalPayload {
    #[n(0)]
    pub letter_date: Day,
    #[n(1)]
    pub facts: HashableFacts,
}

impl HashableFacts {
    /// Content identity of these facts: SHA-256 hex over the CBOR encoding.
    pub fn digest(&self) -> anyhow::Result<String> {
        let cbor = minicbor::to_vec(self)?;
        Ok(sha256::digest(&cbor))
    }
}

impl CanonicalPayload {
    pub fn facts(&self) -> &HashableFacts {
        &self.facts
    }

    pub fn digest(&self) -> anyhow::Result<String> {
        self.facts.digest()
    }
}

/// Verdict of comparing a baseline's digest against a fresh projection's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    Unchanged,
    Changed,
}

/// The single decision point gating amendment side effects: no new record
/// is ever written on `Unchanged`.
pub fn detect(baseline_digest: &str, current_digest: &str) -> ChangeOutcome {
    if baseline_digest == current_digest {
        ChangeOutcome::Unchanged
    } else {
        ChangeOutcome::Changed
    }
}

// -0.0 and 0.0 compare equal but CBOR-encode to different bytes, which
// would let two structurally equal payloads digest apart. Fold the sign
// out of zero before anything is hashed.
fn canon_amount(value: Option<f64>) -> Option<f64> {
    value.map(|v| if v == 0.0 { 0.0 } else { v })
}

fn canon_authorities(booking: &Booking, role: AuthorityRole) -> Vec<CanonAuthority> {
    let mut list: Vec<CanonAuthority> = booking
        .authorities
        .iter()
        .filter(|ba| ba.role == role)
        .map(|ba| CanonAuthority {
            authority_id: ba.authority_id.clone(),
            role: ba.role,
            sequence_index: ba.sequence_index,
            title: {
                let t = ba.title.trim();
                if t.is_empty() { "-".to_string() } else { t.to_string() }
            },
            location_code: ba.location_code.trim().to_string(),
        })
        .collect();

    list.sort_by_key(|a| (a.sequence_index, a.authority_id.clone()));
    list
}

fn canon_material(mt: &MaterialTable) -> CanonMaterial {
    let mut lines: Vec<CanonMaterialLine> = mt
        .lines
        .iter()
        .map(|ln| CanonMaterialLine {
            sequence_index: ln.sequence_index,
            description: ln.description.trim().to_string(),
            unit: ln.unit.as_deref().unwrap_or("").trim().to_string(),
            quantity: canon_amount(ln.quantity),
            rate: canon_amount(ln.rate),
            amount: canon_amount(ln.amount),
        })
        .collect();
    lines.sort_by_key(|ln| ln.sequence_index);

    CanonMaterial {
        id: mt.id.clone(),
        sequence_index: mt.sequence_index,
        booking_authority_id: mt.booking_authority_id.clone(),
        mode: mt.mode,
        total_quantity: canon_amount(mt.total_quantity),
        total_quantity_unit: mt.total_quantity_unit.as_deref().unwrap_or("").trim().to_string(),
        total_amount: canon_amount(mt.total_amount),
        lines,
    }
}

/// Flatten the booking's current state into the canonical payload.
///
/// Pure function of booking state: authorities sort by role then explicit
/// sequence index (id as tiebreak), material tables by sequence index then
/// id, material lines by their own sequence index. The supplied letter date
/// lands only on the payload envelope, never inside the facts.
pub fn project(booking: &Booking, letter_date: Day) -> CanonicalPayload {
    let mut materials: Vec<CanonMaterial> = booking.materials.iter().map(canon_material).collect();
    materials.sort_by(|a, b| (a.sequence_index, &a.id).cmp(&(b.sequence_index, &b.id)));

    let facts = HashableFacts {
        booking_id: booking.booking_id.clone(),
        agreement_id: booking.agreement_id.clone(),
        trip_serial: booking.trip_serial,
        placement_date: booking.placement_date,
        loa_number: booking.loa_number.trim().to_string(),
        placement_ref_prefix: booking
            .placement_ref_prefix
            .as_deref()
            .map(|p| p.trim().to_string()),
        company_name: booking.company_name.trim().to_string(),
        route_id: booking.route_id.clone(),
        route_total_km: booking.route_total_km,
        lorry_capacity: booking.lorry_capacity,
        lorry_carrier_size: booking.lorry_carrier_size.trim().to_string(),
        loading: canon_authorities(booking, AuthorityRole::Loading),
        unloading: canon_authorities(booking, AuthorityRole::Unloading),
        materials,
        requires_attachment: booking.requires_attachment(),
    };

    CanonicalPayload { letter_date, facts }
}
