//! Field-level diff between two sets of canonical facts.
//!
//! The tracked field list and its order are fixed: Placement Date, the two
//! authority summaries, Materials Summary, Route (Km), Lorry Capacity,
//! Carrier Size. Materials never produce line-level entries; any difference
//! anywhere inside the materials structure collapses to the single
//! "Materials Summary" row, which tells the downstream letter to reprint
//! the material tables in full.
use crate::canonical::{CanonAuthority, CanonMaterial, HashableFacts};

/// One changed field: label plus old/new display values.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    #[n(0)]
    pub field: String,
    #[n(1)]
    pub old: String,
    #[n(2)]
    pub new: String,
}

fn dash_if_empty(s: String) -> String {
    if s.trim().is_empty() { "-".to_string() } else { s }
}

fn display_num(v: Option<f64>) -> String {
    match v {
        Some(n) => format!("{n}"),
        None => "-".to_string(),
    }
}

fn display_qty_unit(qty: Option<f64>, unit: &str) -> String {
    match (qty, unit.trim()) {
        (None, "") => "-".to_string(),
        (None, u) => u.to_string(),
        (Some(q), u) => dash_if_empty(format!("{q} {u}").trim().to_string()),
    }
}

/// Comma-joined location codes, falling back to the authority title when a
/// location has no code. Empty lists summarize to "-".
pub fn summarize_authorities(list: &[CanonAuthority]) -> String {
    let parts: Vec<String> = list
        .iter()
        .map(|a| {
            let code = a.location_code.trim();
            if code.is_empty() { a.title.trim().to_string() } else { code.to_string() }
        })
        .filter(|p| !p.is_empty())
        .collect();

    dash_if_empty(parts.join(", "))
}

/// Short stable summary per material table: mode, header quantity, amount.
/// Deliberately opaque; the letter reprints the tables when this row fires.
pub fn summarize_materials(list: &[CanonMaterial]) -> String {
    let chunks: Vec<String> = list
        .iter()
        .map(|mt| {
            format!(
                "{} | Qty: {} | Amt: {}",
                mt.mode,
                display_qty_unit(mt.total_quantity, &mt.total_quantity_unit),
                display_num(mt.total_amount),
            )
        })
        .collect();

    if chunks.is_empty() { "-".to_string() } else { chunks.join(" ; ") }
}

/// Ordered diff over the tracked fields. Only fields whose display value
/// actually differs produce an entry; equal fields are omitted entirely.
pub fn compute_diff(baseline: &HashableFacts, current: &HashableFacts) -> Vec<DiffEntry> {
    fn changed(diffs: &mut Vec<DiffEntry>, field: &str, old: String, new: String) {
        if old != new {
            diffs.push(DiffEntry {
                field: field.to_string(),
                old,
                new,
            });
        }
    }

    let mut diffs: Vec<DiffEntry> = vec![];

    changed(
        &mut diffs,
        "Placement Date",
        baseline.placement_date.to_string(),
        current.placement_date.to_string(),
    );
    changed(
        &mut diffs,
        "Loading Authorities",
        summarize_authorities(&baseline.loading),
        summarize_authorities(&current.loading),
    );
    changed(
        &mut diffs,
        "Unloading Authorities",
        summarize_authorities(&baseline.unloading),
        summarize_authorities(&current.unloading),
    );

    // The summaries can collide even when line items differ, so the atomic
    // materials row is gated on the structures themselves.
    if baseline.materials != current.materials {
        diffs.push(DiffEntry {
            field: "Materials Summary".to_string(),
            old: summarize_materials(&baseline.materials),
            new: summarize_materials(&current.materials),
        });
    }

    changed(
        &mut diffs,
        "Route (Km)",
        baseline.route_total_km.to_string(),
        current.route_total_km.to_string(),
    );
    changed(
        &mut diffs,
        "Lorry Capacity",
        baseline.lorry_capacity.to_string(),
        current.lorry_capacity.to_string(),
    );
    changed(
        &mut diffs,
        "Carrier Size",
        dash_if_empty(baseline.lorry_carrier_size.clone()),
        dash_if_empty(current.lorry_carrier_size.clone()),
    );

    diffs
}
