// 🔎 Directory Search - multi-criteria filtering over profile collections
//
// Semantics (both filters):
// - AND across criteria: a profile must pass every criterion that is set
// - OR within a criterion: any overlap with the selected values is enough
// - An absent criterion, or an empty selection, does not filter
// - Results keep the input order

use crate::entities::clinic::Clinic;
use crate::entities::practitioner::Practitioner;
use crate::entities::tags::{
    Availability, ClinicTreatmentType, CoverageType, InsuranceType, Modality, PractitionerRole,
    ServiceType, Specialty, VerificationTier,
};
use serde::{Deserialize, Serialize};

/// Who is searching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    /// Someone seeking treatment
    #[default]
    Client,
    /// A practitioner looking for collaborators
    Practitioner,
}

// ============================================================================
// PRACTITIONER FILTER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PractitionerFilter {
    #[serde(default)]
    pub user_type: UserType,

    /// Case-insensitive substring of "city state"
    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub modalities: Vec<Modality>,

    #[serde(default)]
    pub specialties: Vec<Specialty>,

    #[serde(default)]
    pub roles: Vec<PractitionerRole>,

    #[serde(default)]
    pub verification_tiers: Vec<VerificationTier>,

    #[serde(default)]
    pub availability: Vec<Availability>,

    #[serde(default)]
    pub service_types: Vec<ServiceType>,

    #[serde(default)]
    pub coverage: Vec<CoverageType>,

    /// Only honoured when `user_type` is `Practitioner`
    #[serde(default)]
    pub looking_to_collaborate: bool,
}

impl PractitionerFilter {
    pub fn matches(&self, p: &Practitioner) -> bool {
        matches_location(self.location.as_deref(), &p.location_string())
            && any_overlap(&self.modalities, &p.modalities)
            && any_overlap(&self.specialties, &p.specialties)
            && one_of(&self.roles, &p.role)
            && one_of(&self.verification_tiers, &p.verification_tier)
            && one_of(&self.availability, &p.availability)
            && any_overlap(&self.service_types, &p.service_types)
            && any_overlap(&self.coverage, &p.coverage)
            && self.matches_collaboration(p)
    }

    fn matches_collaboration(&self, p: &Practitioner) -> bool {
        if self.user_type == UserType::Practitioner && self.looking_to_collaborate {
            p.looking_to_collaborate
        } else {
            true
        }
    }

    pub fn has_active_filters(&self) -> bool {
        self.location.as_deref().is_some_and(|l| !l.trim().is_empty())
            || !self.modalities.is_empty()
            || !self.specialties.is_empty()
            || !self.roles.is_empty()
            || !self.verification_tiers.is_empty()
            || !self.availability.is_empty()
            || !self.service_types.is_empty()
            || !self.coverage.is_empty()
    }
}

pub fn search_practitioners<'a>(
    practitioners: &'a [Practitioner],
    filter: &PractitionerFilter,
) -> Vec<&'a Practitioner> {
    practitioners.iter().filter(|p| filter.matches(p)).collect()
}

// ============================================================================
// CLINIC FILTER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicFilter {
    /// Case-insensitive substring of "city state postcode"
    #[serde(default)]
    pub location: Option<String>,

    /// Exact state code, case-insensitive
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub modalities: Vec<Modality>,

    #[serde(default)]
    pub treatment_types: Vec<ClinicTreatmentType>,

    #[serde(default)]
    pub insurance_accepted: Vec<InsuranceType>,

    #[serde(default)]
    pub verification_tiers: Vec<VerificationTier>,

    /// `Some(true)` keeps only bulk-billing clinics
    #[serde(default)]
    pub bulk_billing: Option<bool>,
}

impl ClinicFilter {
    pub fn matches(&self, c: &Clinic) -> bool {
        matches_location(self.location.as_deref(), &c.location_string())
            && self.matches_state(c)
            && any_overlap(&self.modalities, &c.modalities)
            && any_overlap(&self.treatment_types, &c.treatment_types)
            && any_overlap(&self.insurance_accepted, &c.insurance_accepted)
            && one_of(&self.verification_tiers, &c.verification_tier)
            && self.bulk_billing.map_or(true, |b| c.bulk_billing_available == b)
    }

    fn matches_state(&self, c: &Clinic) -> bool {
        match self.state.as_deref().map(str::trim) {
            Some(state) if !state.is_empty() => c.state.eq_ignore_ascii_case(state),
            _ => true,
        }
    }

    pub fn has_active_filters(&self) -> bool {
        self.location.as_deref().is_some_and(|l| !l.trim().is_empty())
            || self.state.as_deref().is_some_and(|s| !s.trim().is_empty())
            || !self.modalities.is_empty()
            || !self.treatment_types.is_empty()
            || !self.insurance_accepted.is_empty()
            || !self.verification_tiers.is_empty()
            || self.bulk_billing.is_some()
    }
}

pub fn search_clinics<'a>(clinics: &'a [Clinic], filter: &ClinicFilter) -> Vec<&'a Clinic> {
    clinics.iter().filter(|c| filter.matches(c)).collect()
}

// ============================================================================
// PREDICATES
// ============================================================================

fn matches_location(needle: Option<&str>, haystack: &str) -> bool {
    match needle.map(str::trim) {
        Some(needle) if !needle.is_empty() => haystack
            .to_lowercase()
            .contains(&needle.to_lowercase()),
        _ => true,
    }
}

/// Multi-valued field: any selected value present
fn any_overlap<T: PartialEq>(selected: &[T], values: &[T]) -> bool {
    selected.is_empty() || selected.iter().any(|s| values.contains(s))
}

/// Single-valued field: value is one of the selection
fn one_of<T: PartialEq>(selected: &[T], value: &T) -> bool {
    selected.is_empty() || selected.contains(value)
}
