//! Built-in fallback catalog
//!
//! Shown until the ledger has been read, and merged underneath ledger
//! records afterwards.

use crate::error::RegistryError;
use crate::id::{Did, PropertyId};
use crate::property::{Property, PropertyRecord, PropertyStatus, Provenance};
use chrono::NaiveDate;

/// The registry's sample properties, tagged [`Provenance::Fallback`]
#[must_use]
pub fn builtin_catalog() -> Vec<Property> {
    let entries = [
        (
            "H1234",
            "21 Queen Street, AKL",
            3,
            1,
            PropertyStatus::occupied_by(Did::new("[0x...A3B1]")),
            Some((2025, 1, 10)),
            &[][..],
        ),
        (
            "H1235",
            "55 Willis Street, WLG",
            3,
            1,
            PropertyStatus::Available,
            None,
            &["Ground floor", "Close to schools", "Public transport nearby"][..],
        ),
        ("H1236", "14 Colombo St, CHC", 2, 1, PropertyStatus::Pending, None, &[][..]),
        (
            "H1237",
            "8 Victoria Avenue, HLZ",
            3,
            2,
            PropertyStatus::Available,
            None,
            &["Wheelchair accessible", "Recently renovated", "Community garden"][..],
        ),
        (
            "H1238",
            "42 George Street, DUD",
            2,
            1,
            PropertyStatus::occupied_by(Did::new("[0x...F2D9]")),
            Some((2025, 2, 15)),
            &[][..],
        ),
        (
            "H1240",
            "12 Kauri Street, AKL",
            2,
            1,
            PropertyStatus::Available,
            None,
            &["Pet friendly", "Fenced yard", "Heat pump"][..],
        ),
        (
            "H1242",
            "45 Miro Road, WLG",
            4,
            2,
            PropertyStatus::Available,
            None,
            &["Large family home", "Double garage", "Close to hospital"][..],
        ),
    ];

    entries
        .into_iter()
        .filter_map(|(id, address, bedrooms, bathrooms, status, move_in, features)| {
            let id = PropertyId::new(id).ok()?;
            let mut property = Property::new(id, address, bedrooms, bathrooms)
                .with_features(features.iter().copied())
                .with_status(status)
                .with_provenance(Provenance::Fallback);
            property.move_in_date = move_in.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
            Some(property)
        })
        .collect()
}

/// Parse a catalog file (JSON array of property records)
///
/// # Errors
/// - `RegistryError::InvalidRecord` on malformed JSON or an invalid record
pub fn parse_catalog(json: &str) -> Result<Vec<Property>, RegistryError> {
    let records: Vec<PropertyRecord> =
        serde_json::from_str(json).map_err(|e| RegistryError::invalid(format!("catalog: {e}")))?;
    records
        .into_iter()
        .map(|r| Property::from_record(r, Provenance::Fallback))
        .collect()
}
