//! Booking model as handed to the letters core by the surrounding
//! application. The core never mutates a booking; it only projects it.
use chrono::{Datelike, NaiveDate};
use std::fmt;

/// Calendar date carried on bookings and letters.
///
/// Encoded in CBOR as days-from-CE so two equal dates always encode to the
/// same bytes. Displays in the letter format `DD-MM-YYYY`, parses the ISO
/// `YYYY-MM-DD` form callers submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Day(NaiveDate);

impl Day {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Day)
    }

    pub fn parse_iso(s: &str) -> Option<Self> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok().map(Day)
    }

    pub fn to_naive_date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%d-%m-%Y"))
    }
}

impl<C> minicbor::Encode<C> for Day {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Day {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(Day)
            .ok_or(minicbor::decode::Error::message(
                "days-from-ce out of range for a calendar date",
            ))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthorityRole {
    #[n(0)]
    Loading,
    #[n(1)]
    Unloading,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialMode {
    #[n(0)]
    Item,
    #[n(1)]
    Lumpsum,
    #[n(2)]
    Attached,
}

impl fmt::Display for MaterialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            MaterialMode::Item => "ITEM",
            MaterialMode::Lumpsum => "LUMPSUM",
            MaterialMode::Attached => "ATTACHED",
        };
        f.write_str(tag)
    }
}

/// One authority attached to a booking, either end of the trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingAuthority {
    pub authority_id: String,
    pub role: AuthorityRole,
    pub sequence_index: u32,
    pub title: String,
    pub location_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialLine {
    pub sequence_index: u32,
    pub description: String,
    pub unit: Option<String>,
    pub quantity: Option<f64>,
    pub rate: Option<f64>,
    pub amount: Option<f64>,
}

/// A material table on the booking: header totals plus ordered lines.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialTable {
    pub id: String,
    pub sequence_index: u32,
    pub booking_authority_id: Option<String>,
    pub mode: MaterialMode,
    pub total_quantity: Option<f64>,
    pub total_quantity_unit: Option<String>,
    pub total_amount: Option<f64>,
    pub lines: Vec<MaterialLine>,
}

/// A single lorry trip under an agreement. Mutable up until cancellation;
/// cancellation is terminal and blocks letter issuance.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub booking_id: String,
    pub agreement_id: String,
    pub loa_number: String,
    pub placement_ref_prefix: Option<String>,
    pub company_name: String,
    /// Position of this booking within its agreement, supplied by the
    /// caller rather than derived from sibling queries.
    pub trip_serial: u32,
    pub route_id: String,
    pub route_total_km: u32,
    pub lorry_capacity: u32,
    pub lorry_carrier_size: String,
    pub placement_date: Day,
    pub booking_date: Day,
    pub cancelled: bool,
    pub cancel_reason: Option<String>,
    pub authorities: Vec<BookingAuthority>,
    pub materials: Vec<MaterialTable>,
}

impl Booking {
    pub fn new(booking_id: impl Into<String>, agreement_id: impl Into<String>) -> Self {
        Self {
            booking_id: booking_id.into(),
            agreement_id: agreement_id.into(),
            loa_number: String::new(),
            placement_ref_prefix: None,
            company_name: String::new(),
            trip_serial: 1,
            route_id: String::new(),
            route_total_km: 0,
            lorry_capacity: 0,
            lorry_carrier_size: String::new(),
            placement_date: Day(NaiveDate::default()),
            booking_date: Day(NaiveDate::default()),
            cancelled: false,
            cancel_reason: None,
            authorities: vec![],
            materials: vec![],
        }
    }

    pub fn set_loa_number(mut self, loa: &str) -> Self {
        self.loa_number = loa.trim().to_string();
        self
    }

    pub fn set_placement_ref_prefix(mut self, prefix: &str) -> Self {
        self.placement_ref_prefix = Some(prefix.trim().to_string());
        self
    }

    pub fn set_company_name(mut self, name: &str) -> Self {
        self.company_name = name.trim().to_string();
        self
    }

    pub fn set_trip_serial(mut self, serial: u32) -> Self {
        self.trip_serial = serial;
        self
    }

    pub fn set_route(mut self, route_id: &str, total_km: u32) -> Self {
        self.route_id = route_id.trim().to_string();
        self.route_total_km = total_km;
        self
    }

    pub fn set_lorry(mut self, capacity: u32, carrier_size: &str) -> Self {
        self.lorry_capacity = capacity;
        self.lorry_carrier_size = carrier_size.trim().to_string();
        self
    }

    pub fn set_placement_date(mut self, date: Day) -> Self {
        self.placement_date = date;
        self
    }

    pub fn set_booking_date(mut self, date: Day) -> Self {
        self.booking_date = date;
        self
    }

    pub fn add_authority(mut self, authority: BookingAuthority) -> Self {
        self.authorities.push(authority);
        self
    }

    pub fn add_material(mut self, material: MaterialTable) -> Self {
        self.materials.push(material);
        self
    }

    pub fn cancel(mut self, reason: Option<&str>) -> Self {
        self.cancelled = true;
        self.cancel_reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from);
        self
    }

    /// Attachment pages are required when any material table is ATTACHED.
    pub fn requires_attachment(&self) -> bool {
        self.materials
            .iter()
            .any(|mt| mt.mode == MaterialMode::Attached)
    }
}
