//! Waitlist of applicants awaiting housing

use crate::book::OfferBook;
use crate::error::LifecycleError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use whare_registry::Did;

/// Housing need category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HousingNeed {
    /// Needs housing now
    Urgent,
    /// Standard need
    Medium,
    /// Lower need
    Low,
}

impl fmt::Display for HousingNeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Urgent => "Urgent",
            Self::Medium => "Medium",
            Self::Low => "Low",
        })
    }
}

/// Waitlist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    /// Applicant identifier
    pub did: Did,
    /// Queue position, 1 is served first
    pub position: u32,
    /// 0 to 100, informational
    pub priority_score: u8,
    /// Need category
    pub housing_need: HousingNeed,
    /// People in the household
    pub household_size: u32,
    /// Free text, empty when none
    #[serde(default)]
    pub special_requirements: String,
}

impl Applicant {
    /// New entry with a medium need, household of one and no requirements
    #[must_use]
    pub fn new(did: impl Into<Did>, position: u32, priority_score: u8) -> Self {
        Self {
            did: did.into(),
            position,
            priority_score,
            housing_need: HousingNeed::Medium,
            household_size: 1,
            special_requirements: String::new(),
        }
    }

    /// With a housing need
    #[inline]
    #[must_use]
    pub fn with_need(mut self, need: HousingNeed) -> Self {
        self.housing_need = need;
        self
    }

    /// With a household size
    #[inline]
    #[must_use]
    pub fn with_household(mut self, size: u32) -> Self {
        self.household_size = size;
        self
    }

    /// With special requirements
    #[inline]
    #[must_use]
    pub fn with_requirements(mut self, text: impl Into<String>) -> Self {
        self.special_requirements = text.into();
        self
    }
}

/// Applicants ordered by position
///
/// Positions are unique and positive. Removing an applicant leaves a gap;
/// positions are never renumbered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Waitlist {
    entries: Vec<Applicant>,
}

impl Waitlist {
    /// Build from entries in any order
    ///
    /// # Errors
    /// - `LifecycleError::InvalidWaitlist` on a zero or duplicate position, a
    ///   duplicate DID, a score above 100 or an empty household
    pub fn new(mut entries: Vec<Applicant>) -> Result<Self, LifecycleError> {
        let mut positions = HashSet::new();
        let mut dids = HashSet::new();
        for a in &entries {
            if a.position == 0 {
                return Err(invalid(format!("{}: position must be positive", a.did)));
            }
            if !positions.insert(a.position) {
                return Err(invalid(format!("duplicate position {}", a.position)));
            }
            if !dids.insert(a.did.clone()) {
                return Err(invalid(format!("duplicate applicant {}", a.did)));
            }
            if a.priority_score > 100 {
                return Err(invalid(format!(
                    "{}: priority score {} above 100",
                    a.did, a.priority_score
                )));
            }
            if a.household_size == 0 {
                return Err(invalid(format!("{}: household size must be positive", a.did)));
            }
        }
        entries.sort_by_key(|a| a.position);
        Ok(Self { entries })
    }

    /// Entries in position order
    #[inline]
    #[must_use]
    pub fn ordered(&self) -> &[Applicant] {
        &self.entries
    }

    /// Entry count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nobody is waiting
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an applicant
    #[must_use]
    pub fn get(&self, did: &Did) -> Option<&Applicant> {
        self.entries.iter().find(|a| &a.did == did)
    }

    /// Check if an applicant is waiting
    #[must_use]
    pub fn contains(&self, did: &Did) -> bool {
        self.get(did).is_some()
    }

    /// Remove an applicant (housed)
    pub fn remove(&mut self, did: &Did) -> Option<Applicant> {
        let idx = self.entries.iter().position(|a| &a.did == did)?;
        Some(self.entries.remove(idx))
    }

    /// Lowest-position applicant without a pending offer
    #[must_use]
    pub fn next_eligible(&self, book: &OfferBook) -> Option<&Applicant> {
        self.entries
            .iter()
            .find(|a| book.pending_for_applicant(&a.did).is_none())
    }

    /// Case-insensitive search over DID, need and special requirements
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<&Applicant> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.entries.iter().collect();
        }
        self.entries
            .iter()
            .filter(|a| {
                a.did.as_str().to_lowercase().contains(&needle)
                    || a.housing_need.to_string().to_lowercase().contains(&needle)
                    || a.special_requirements.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

fn invalid(reason: String) -> LifecycleError {
    LifecycleError::InvalidWaitlist { reason }
}

/// The registry's sample waitlist
#[must_use]
pub fn builtin_waitlist() -> Waitlist {
    let entries = vec![
        Applicant::new("[0x...B8F2]", 1, 92)
            .with_household(4)
            .with_requirements("Accessibility features needed"),
        Applicant::new("[0x...9E1A]", 2, 87).with_household(3),
        Applicant::new("[0x...5D3C]", 3, 84)
            .with_need(HousingNeed::Urgent)
            .with_household(5)
            .with_requirements("Ground floor only"),
        Applicant::new("[0x...7F2B]", 4, 79)
            .with_need(HousingNeed::Low)
            .with_household(2),
        Applicant::new("[0x...3A9D]", 5, 75)
            .with_need(HousingNeed::Low)
            .with_household(3)
            .with_requirements("Close to schools"),
    ];
    Waitlist { entries }
}
