// 📐 Input validation - what a submission must look like before it is stored
//
// Validators collect every problem instead of stopping at the first one,
// so a caller can report all bad fields at once.

use crate::entities::review::{ConditionTreated, OutcomeRating, ReviewTreatment};
use crate::entities::tags::VerificationTier;
use crate::entities::verification::{VerificationEvidence, VerificationMethod};
use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MAX_REVIEW_TEXT_CHARS: usize = 5000;
pub const EARLIEST_TREATMENT_YEAR: i32 = 1950;

// ============================================================================
// VALIDATION ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: &str) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// REVIEW INPUT
// ============================================================================

/// An anonymous review as submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewInput {
    pub rating: i64,
    pub outcome_rating: OutcomeRating,
    pub treatment_type: ReviewTreatment,
    pub condition_treated: ConditionTreated,

    #[serde(default)]
    pub review_text: Option<String>,

    pub would_recommend: bool,

    #[serde(default)]
    pub treatment_month: Option<u32>,

    #[serde(default)]
    pub treatment_year: Option<i32>,

    /// Optional review token handed out by the practitioner
    #[serde(default)]
    pub token: Option<String>,
}

impl ReviewInput {
    /// Check ranges and normalise blank strings to `None`
    pub fn validate(mut self, now: DateTime<Utc>) -> Result<ReviewInput, Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !(1..=5).contains(&self.rating) {
            errors.push(ValidationError::new("rating", "must be between 1 and 5"));
        }

        if let Some(month) = self.treatment_month {
            if !(1..=12).contains(&month) {
                errors.push(ValidationError::new("treatment_month", "must be between 1 and 12"));
            }
        }

        if let Some(year) = self.treatment_year {
            if year < EARLIEST_TREATMENT_YEAR || year > now.year() {
                errors.push(ValidationError::new(
                    "treatment_year",
                    "must not be in the future or before 1950",
                ));
            }
        }

        self.review_text = non_blank(self.review_text);
        if let Some(text) = &self.review_text {
            if text.chars().count() > MAX_REVIEW_TEXT_CHARS {
                errors.push(ValidationError::new(
                    "review_text",
                    "must be at most 5000 characters",
                ));
            }
        }

        self.token = non_blank(self.token);

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(errors)
        }
    }
}

// ============================================================================
// VERIFICATION INPUT
// ============================================================================

/// Raw proof as submitted with a verification request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationInput {
    #[serde(default)]
    pub registry_number: Option<String>,

    #[serde(default)]
    pub professional_email: Option<String>,

    #[serde(default)]
    pub profile_url: Option<String>,

    #[serde(default)]
    pub document_ref: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,

    /// Defaults to `verified`
    #[serde(default)]
    pub target_tier: Option<VerificationTier>,
}

impl VerificationInput {
    /// Produce the evidence record and the tier an approval would grant
    pub fn validate(
        self,
        method: VerificationMethod,
    ) -> Result<(VerificationEvidence, VerificationTier), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut evidence = VerificationEvidence {
            notes: non_blank(self.notes),
            ..Default::default()
        };

        match method {
            VerificationMethod::Registry => match non_blank(self.registry_number) {
                Some(number) => evidence.registry_number = Some(number.to_uppercase()),
                None => errors.push(ValidationError::new(
                    "registry_number",
                    "registry number is required",
                )),
            },
            VerificationMethod::BusinessRegistry => {
                let digits: String = self
                    .registry_number
                    .unwrap_or_default()
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect();
                if digits.len() == 11 {
                    evidence.registry_number = Some(digits);
                } else {
                    errors.push(ValidationError::new(
                        "registry_number",
                        "business number must have 11 digits",
                    ));
                }
            }
            VerificationMethod::ProfessionalEmail => match non_blank(self.professional_email) {
                Some(email) => match email_domain(&email) {
                    Some(domain) => {
                        evidence.professional_email_domain = Some(domain.to_lowercase());
                        evidence.professional_email = Some(email);
                    }
                    None => errors.push(ValidationError::new(
                        "professional_email",
                        "invalid email format",
                    )),
                },
                None => errors.push(ValidationError::new(
                    "professional_email",
                    "professional email is required",
                )),
            },
            VerificationMethod::SocialProfile => match non_blank(self.profile_url) {
                Some(url) if url.to_lowercase().contains("linkedin.com") => {
                    evidence.profile_url = Some(url)
                }
                Some(_) => errors.push(ValidationError::new(
                    "profile_url",
                    "must be a linkedin.com profile",
                )),
                None => errors.push(ValidationError::new("profile_url", "profile URL is required")),
            },
            VerificationMethod::Resume => match non_blank(self.document_ref) {
                Some(doc) => evidence.document_ref = Some(doc),
                None => errors.push(ValidationError::new(
                    "document_ref",
                    "an uploaded resume is required",
                )),
            },
            VerificationMethod::Manual => {
                if evidence.notes.is_none() {
                    errors.push(ValidationError::new(
                        "notes",
                        "manual verification needs notes",
                    ));
                }
            }
        }

        let target = self.target_tier.unwrap_or(VerificationTier::Verified);
        if target == VerificationTier::Listed {
            errors.push(ValidationError::new(
                "target_tier",
                "must be verified or certified",
            ));
        } else if target > method.max_tier() {
            errors.push(ValidationError::new(
                "target_tier",
                "certified requires registry or manual verification",
            ));
        }

        if errors.is_empty() {
            Ok((evidence, target))
        } else {
            Err(errors)
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

// compiled once; `None` only if the literal pattern were malformed
static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email))
}

/// Domain part of a loosely-checked address ("x@y" is enough)
fn email_domain(email: &str) -> Option<&str> {
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(domain)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
