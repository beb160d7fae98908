//! Property data model
//!
//! [`Property`] is the in-memory record used by the reconciler and the
//! optimistic layer. Its status carries the offered-to applicant or the
//! occupant, so the two can never be set together. [`PropertyRecord`] is
//! the flat serde shape that crosses the ledger and catalog-file
//! boundaries; converting it back validates the same rule.

use crate::error::RegistryError;
use crate::id::{Did, PropertyId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status discriminant, as shown to users and stored on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    /// Can be offered
    Available,
    /// Offer outstanding
    Offered,
    /// Tenanted
    Occupied,
    /// Held back (maintenance, verification, ...)
    Pending,
}

impl StatusKind {
    /// Display label
    #[inline]
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Offered => "Offered",
            Self::Occupied => "Occupied",
            Self::Pending => "Pending",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Property status with its associated applicant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyStatus {
    /// Can be offered
    Available,
    /// Offer outstanding
    Offered {
        /// Applicant holding the offer, when known
        to: Option<Did>,
    },
    /// Tenanted
    Occupied {
        /// Current occupant, when known
        occupant: Option<Did>,
    },
    /// Held back
    Pending,
}

impl PropertyStatus {
    /// Offered to a known applicant
    #[inline]
    #[must_use]
    pub fn offered_to(applicant: Did) -> Self {
        Self::Offered {
            to: Some(applicant),
        }
    }

    /// Occupied by a known applicant
    #[inline]
    #[must_use]
    pub fn occupied_by(occupant: Did) -> Self {
        Self::Occupied {
            occupant: Some(occupant),
        }
    }

    /// Status discriminant
    #[must_use]
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Available => StatusKind::Available,
            Self::Offered { .. } => StatusKind::Offered,
            Self::Occupied { .. } => StatusKind::Occupied,
            Self::Pending => StatusKind::Pending,
        }
    }
}

/// Where a record in the merged view came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Read from (or written to) the ledger
    Ledger,
    /// Static fallback catalog
    Fallback,
}

/// A registry property
#[derive(Debug, Clone)]
pub struct Property {
    /// Canonical id
    pub id: PropertyId,
    /// Street address
    pub address: String,
    /// Bedroom count
    pub bedrooms: u32,
    /// Bathroom count
    pub bathrooms: u32,
    /// Display-ordered features
    pub features: Vec<String>,
    /// Current status
    pub status: PropertyStatus,
    /// Move-in date of the current occupant
    pub move_in_date: Option<NaiveDate>,
    /// Source tag, never displayed
    pub provenance: Provenance,
}

impl Property {
    /// New available ledger property with no features
    #[must_use]
    pub fn new(id: PropertyId, address: impl Into<String>, bedrooms: u32, bathrooms: u32) -> Self {
        Self {
            id,
            address: address.into(),
            bedrooms,
            bathrooms,
            features: Vec::new(),
            status: PropertyStatus::Available,
            move_in_date: None,
            provenance: Provenance::Ledger,
        }
    }

    /// With features
    #[must_use]
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: PropertyStatus) -> Self {
        self.status = status;
        self
    }

    /// With move-in date
    #[inline]
    #[must_use]
    pub fn with_move_in(mut self, date: NaiveDate) -> Self {
        self.move_in_date = Some(date);
        self
    }

    /// With provenance tag
    #[inline]
    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Status discriminant
    #[inline]
    #[must_use]
    pub fn status_kind(&self) -> StatusKind {
        self.status.kind()
    }

    /// Applicant the property is offered to
    #[must_use]
    pub fn offered_to(&self) -> Option<&Did> {
        match &self.status {
            PropertyStatus::Offered { to } => to.as_ref(),
            _ => None,
        }
    }

    /// Current occupant
    #[must_use]
    pub fn occupant(&self) -> Option<&Did> {
        match &self.status {
            PropertyStatus::Occupied { occupant } => occupant.as_ref(),
            _ => None,
        }
    }

    /// Presentation id
    #[inline]
    #[must_use]
    pub fn display_id(&self, prefix: &str) -> String {
        self.id.display_with(prefix)
    }

    /// Convert a wire record, tagging it with its source
    ///
    /// # Errors
    /// - `RegistryError::InvalidRecord` for a bad id, or when `offeredTo` /
    ///   `occupant` is set against the status
    pub fn from_record(
        record: PropertyRecord,
        provenance: Provenance,
    ) -> Result<Self, RegistryError> {
        let id = PropertyId::new(&record.id)?;

        if record.offered_to.is_some() && record.status != StatusKind::Offered {
            return Err(RegistryError::invalid(format!(
                "{id}: offeredTo set on {} property",
                record.status
            )));
        }
        if record.occupant.is_some() && record.status != StatusKind::Occupied {
            return Err(RegistryError::invalid(format!(
                "{id}: occupant set on {} property",
                record.status
            )));
        }

        let status = match record.status {
            StatusKind::Available => PropertyStatus::Available,
            StatusKind::Offered => PropertyStatus::Offered {
                to: record.offered_to.map(Did::new),
            },
            StatusKind::Occupied => PropertyStatus::Occupied {
                occupant: record.occupant.map(Did::new),
            },
            StatusKind::Pending => PropertyStatus::Pending,
        };

        Ok(Self {
            id,
            address: record.address,
            bedrooms: record.bedrooms,
            bathrooms: record.bathrooms,
            features: record.features,
            status,
            move_in_date: record.move_in_date,
            provenance,
        })
    }

    /// Flat wire record
    #[must_use]
    pub fn to_record(&self) -> PropertyRecord {
        PropertyRecord {
            id: self.id.to_string(),
            address: self.address.clone(),
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            features: self.features.clone(),
            status: self.status_kind(),
            offered_to: self.offered_to().map(|d| d.as_str().to_string()),
            occupant: self.occupant().map(|d| d.as_str().to_string()),
            move_in_date: self.move_in_date,
        }
    }

    fn sorted_features(&self) -> Vec<&str> {
        let mut features: Vec<&str> = self.features.iter().map(String::as_str).collect();
        features.sort_unstable();
        features
    }
}

// Feature order is display-only
impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.address == other.address
            && self.bedrooms == other.bedrooms
            && self.bathrooms == other.bathrooms
            && self.status == other.status
            && self.move_in_date == other.move_in_date
            && self.provenance == other.provenance
            && self.sorted_features() == other.sorted_features()
    }
}

impl Eq for Property {}

/// Ledger records convert directly; catalog files use [`Property::from_record`]
impl TryFrom<PropertyRecord> for Property {
    type Error = RegistryError;

    fn try_from(record: PropertyRecord) -> Result<Self, Self::Error> {
        Self::from_record(record, Provenance::Ledger)
    }
}

/// Flat property shape used on the ledger and in catalog files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    /// Raw id, prefix allowed
    pub id: String,
    /// Street address
    pub address: String,
    /// Bedroom count
    #[serde(default)]
    pub bedrooms: u32,
    /// Bathroom count
    #[serde(default)]
    pub bathrooms: u32,
    /// Features
    #[serde(default)]
    pub features: Vec<String>,
    /// Status
    pub status: StatusKind,
    /// Offered-to applicant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offered_to: Option<String>,
    /// Occupant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupant: Option<String>,
    /// Move-in date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_in_date: Option<NaiveDate>,
}

/// Split comma-separated feature input, trimming and dropping empties
#[must_use]
pub fn parse_features(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}
