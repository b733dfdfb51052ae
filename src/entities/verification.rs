// ✅ Verification Request - proof submitted to raise a profile's badge
//
// Lifecycle:
//   pending ──► under_review ──► approved | rejected
//      └────────────────────────► approved | rejected
//
// Approval is the ONLY way a practitioner or clinic climbs the tier ladder.

use super::tags::{tag_enum, VerificationTier};
use crate::error::TransitionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

tag_enum! {
    VerificationMethod {
        /// Professional registry number checked against the public register
        Registry => ("registry", "Registry Number"),
        Resume => ("resume", "Resume / CV"),
        ProfessionalEmail => ("professional_email", "Professional Email"),
        SocialProfile => ("social_profile", "Professional Social Profile"),
        /// Business number checked against the business register (clinics)
        BusinessRegistry => ("business_registry", "Business Registry Number"),
        Manual => ("manual", "Manual Review"),
    }
}

impl VerificationMethod {
    /// Highest tier a request of this method may grant
    pub fn max_tier(&self) -> VerificationTier {
        match self {
            VerificationMethod::Registry | VerificationMethod::Manual => {
                VerificationTier::Certified
            }
            _ => VerificationTier::Verified,
        }
    }
}

tag_enum! {
    VerificationStatus {
        Pending => ("pending", "Pending"),
        UnderReview => ("under_review", "Under Review"),
        Approved => ("approved", "Approved"),
        Rejected => ("rejected", "Rejected"),
    }
}

impl VerificationStatus {
    pub fn can_transition_to(&self, next: VerificationStatus) -> bool {
        use VerificationStatus::*;
        matches!(
            (self, next),
            (Pending, UnderReview) | (Pending, Approved) | (Pending, Rejected)
                | (UnderReview, Approved) | (UnderReview, Rejected)
        )
    }

    /// Still waiting on a decision
    pub fn is_open(&self) -> bool {
        matches!(self, VerificationStatus::Pending | VerificationStatus::UnderReview)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// Whose badge the request is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum VerificationSubject {
    Practitioner(String),
    Clinic(String),
}

impl VerificationSubject {
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationSubject::Practitioner(_) => "practitioner",
            VerificationSubject::Clinic(_) => "clinic",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            VerificationSubject::Practitioner(id) | VerificationSubject::Clinic(id) => id,
        }
    }

    pub fn from_parts(kind: &str, id: String) -> Option<Self> {
        match kind {
            "practitioner" => Some(VerificationSubject::Practitioner(id)),
            "clinic" => Some(VerificationSubject::Clinic(id)),
            _ => None,
        }
    }
}

/// Normalised, method-specific proof
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationEvidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub professional_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub professional_email_domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,

    /// Reference to an uploaded document (storage itself lives elsewhere)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ============================================================================
// VERIFICATION REQUEST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: String,
    pub subject: VerificationSubject,
    pub method: VerificationMethod,
    pub status: VerificationStatus,
    pub evidence: VerificationEvidence,

    /// Tier granted on approval
    pub target_tier: VerificationTier,

    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub review_notes: Option<String>,
    pub rejection_reason: Option<String>,
}

impl VerificationRequest {
    pub fn new(
        subject: VerificationSubject,
        method: VerificationMethod,
        evidence: VerificationEvidence,
        target_tier: VerificationTier,
        now: DateTime<Utc>,
    ) -> Self {
        VerificationRequest {
            id: uuid::Uuid::new_v4().to_string(),
            subject,
            method,
            status: VerificationStatus::Pending,
            evidence,
            target_tier,
            submitted_at: now,
            reviewed_at: None,
            reviewed_by: None,
            review_notes: None,
            rejection_reason: None,
        }
    }

    /// pending → under_review
    pub fn start_review(
        &mut self,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(VerificationStatus::UnderReview)?;
        self.reviewed_by = Some(reviewer.to_string());
        self.reviewed_at = Some(now);
        Ok(())
    }

    pub fn decide(
        &mut self,
        decision: Decision,
        reviewer: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let next = match decision {
            Decision::Approve => VerificationStatus::Approved,
            Decision::Reject => VerificationStatus::Rejected,
        };
        self.transition(next)?;

        self.reviewed_by = Some(reviewer.to_string());
        self.reviewed_at = Some(now);
        if decision == Decision::Reject {
            self.rejection_reason = notes.clone();
        }
        self.review_notes = notes;
        Ok(())
    }

    /// Tier the subject ends up with after approval; never lower than today
    pub fn granted_tier(&self, current: VerificationTier) -> VerificationTier {
        current.max(self.target_tier)
    }

    fn transition(&mut self, next: VerificationStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::new("verification", self.status, next));
        }
        self.status = next;
        Ok(())
    }
}
