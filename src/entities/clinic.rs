// 🏥 Clinic Entity - a practice location with its own listing and badge

use super::practitioner::slugify;
use super::tags::{ClinicTreatmentType, InsuranceType, Modality, VerificationTier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clinic {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: String,

    // ========================================================================
    // LOCATION
    // ========================================================================
    pub address: String,
    pub city: String,
    pub state: String,
    pub postcode: String,
    pub country: String,

    // ========================================================================
    // CONTACT
    // ========================================================================
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_url: Option<String>,

    // ========================================================================
    // SERVICES & PAYMENT
    // ========================================================================
    #[serde(default)]
    pub modalities: Vec<Modality>,

    #[serde(default)]
    pub treatment_types: Vec<ClinicTreatmentType>,

    #[serde(default)]
    pub insurance_accepted: Vec<InsuranceType>,

    #[serde(default)]
    pub bulk_billing_available: bool,

    // ========================================================================
    // VERIFICATION
    // ========================================================================
    pub verification_tier: VerificationTier,

    /// Australian Business Number, 11 digits once verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abn_number: Option<String>,

    #[serde(default)]
    pub is_published: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Clinic {
    pub fn new(name: &str, city: &str, state: &str, postcode: &str) -> Self {
        let now = Utc::now();

        Clinic {
            id: uuid::Uuid::new_v4().to_string(),
            slug: slugify(name),
            name: name.to_string(),
            description: String::new(),
            address: String::new(),
            city: city.to_string(),
            state: state.to_string(),
            postcode: postcode.to_string(),
            country: "AU".to_string(),
            phone: None,
            email: None,
            website: None,
            booking_url: None,
            modalities: Vec::new(),
            treatment_types: Vec::new(),
            insurance_accepted: Vec::new(),
            bulk_billing_available: false,
            verification_tier: VerificationTier::Listed,
            abn_number: None,
            is_published: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Text the location filter matches against
    pub fn location_string(&self) -> String {
        format!("{} {} {}", self.city, self.state, self.postcode)
    }
}
