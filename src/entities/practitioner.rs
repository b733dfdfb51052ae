// 🩺 Practitioner Entity - a listed professional in the directory
//
// Identity: UUID + slug (slug is what public links use)
// Trust: verification tier, only raised by an approved verification request

use super::tags::{
    Availability, CoverageType, Modality, PractitionerRole, ServiceType, Specialty,
    VerificationTier,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// PRACTITIONER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Practitioner {
    /// Stable identity (UUID)
    pub id: String,

    /// URL-safe handle, unique across practitioners
    pub slug: String,

    /// Display name including post-nominals ("Dr. Sarah Martinez, MD")
    pub name: String,

    pub bio: String,

    // ========================================================================
    // LOCATION
    // ========================================================================
    pub city: String,
    pub state: String,
    pub country: String,

    // ========================================================================
    // PROFESSIONAL
    // ========================================================================
    pub role: PractitionerRole,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_experience: Option<u32>,

    /// Professional registry number (e.g. AHPRA), set when verified against it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_number: Option<String>,

    // ========================================================================
    // STATUS
    // ========================================================================
    pub verification_tier: VerificationTier,
    pub availability: Availability,

    // ========================================================================
    // TAG SETS
    // ========================================================================
    #[serde(default)]
    pub modalities: Vec<Modality>,

    #[serde(default)]
    pub specialties: Vec<Specialty>,

    #[serde(default)]
    pub service_types: Vec<ServiceType>,

    #[serde(default)]
    pub coverage: Vec<CoverageType>,

    // ========================================================================
    // COLLABORATION
    // ========================================================================
    #[serde(default)]
    pub looking_to_collaborate: bool,

    #[serde(default)]
    pub collaboration_roles: Vec<PractitionerRole>,

    // ========================================================================
    // CONTACT
    // ========================================================================
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_url: Option<String>,

    #[serde(default)]
    pub languages: Vec<String>,

    /// Clinic affiliation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,

    /// Only published profiles appear in search
    #[serde(default)]
    pub is_published: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Practitioner {
    /// Create an unpublished profile at the `listed` tier
    pub fn new(name: &str, role: PractitionerRole, city: &str, state: &str, country: &str) -> Self {
        let now = Utc::now();

        Practitioner {
            id: uuid::Uuid::new_v4().to_string(),
            slug: slugify(name),
            name: name.to_string(),
            bio: String::new(),
            city: city.to_string(),
            state: state.to_string(),
            country: country.to_string(),
            role,
            license_type: None,
            years_experience: None,
            registry_number: None,
            verification_tier: VerificationTier::Listed,
            availability: Availability::Accepting,
            modalities: Vec::new(),
            specialties: Vec::new(),
            service_types: Vec::new(),
            coverage: Vec::new(),
            looking_to_collaborate: false,
            collaboration_roles: Vec::new(),
            website: None,
            booking_url: None,
            languages: Vec::new(),
            clinic_id: None,
            is_published: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Text the location filter matches against
    pub fn location_string(&self) -> String {
        format!("{} {}", self.city, self.state)
    }

    pub fn is_accepting_clients(&self) -> bool {
        self.availability == Availability::Accepting
    }
}

/// Lowercase, collapse every run of non `[a-z0-9]` into a single `-`,
/// and trim dashes from both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars().flat_map(|c| c.to_lowercase()) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_practitioner_starts_listed_and_unpublished() {
        let p = Practitioner::new(
            "Dr. Sarah Martinez, MD",
            PractitionerRole::Psychiatrist,
            "San Francisco",
            "CA",
            "US",
        );

        assert!(!p.id.is_empty());
        assert_eq!(p.slug, "dr-sarah-martinez-md");
        assert_eq!(p.verification_tier, VerificationTier::Listed);
        assert!(!p.is_published);
        assert!(p.is_accepting_clients());
        assert_eq!(p.location_string(), "San Francisco CA");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Michael Chen, LCSW"), "michael-chen-lcsw");
        assert_eq!(slugify("  --Mind & Body Clinic--  "), "mind-body-clinic");
        assert_eq!(slugify("Zoë O'Brien"), "zo-o-brien");
        assert_eq!(slugify("!!!"), "");
    }
}
