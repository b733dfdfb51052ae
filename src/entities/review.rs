// ⭐ Review Entity - anonymous outcome feedback on a practitioner
//
// Lifecycle (moderation):
//   pending ──► approved
//      │   ──► rejected
//      └─► flagged ──► approved | rejected
//
// approved and rejected are terminal. Only approved reviews are public
// and only approved reviews feed the aggregate stats.

use super::tags::tag_enum;
use crate::error::TransitionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

tag_enum! {
    /// Self-reported treatment effect, worst first
    OutcomeRating {
        GotWorse => ("got_worse", "Got worse"),
        NoChange => ("no_change", "No change"),
        SlightImprovement => ("slight_improvement", "Slight improvement"),
        ModerateImprovement => ("moderate_improvement", "Moderate improvement"),
        SignificantImprovement => ("significant_improvement", "Significant improvement"),
        LifeChanging => ("life_changing", "Life-changing"),
    }
}

impl OutcomeRating {
    /// Outcomes counted in the positive-outcome rate
    pub const POSITIVE: [OutcomeRating; 3] = [
        OutcomeRating::LifeChanging,
        OutcomeRating::SignificantImprovement,
        OutcomeRating::ModerateImprovement,
    ];

    pub fn is_positive(&self) -> bool {
        *self >= OutcomeRating::ModerateImprovement
    }
}

tag_enum! {
    /// Treatment received, as reported by the reviewer
    ReviewTreatment {
        Mdma => ("mdma", "MDMA"),
        Psilocybin => ("psilocybin", "Psilocybin"),
        Ketamine => ("ketamine", "Ketamine"),
        Lsd => ("lsd", "LSD"),
        Cannabis => ("cannabis", "Cannabis"),
        Ayahuasca => ("ayahuasca", "Ayahuasca"),
        Ibogaine => ("ibogaine", "Ibogaine"),
        FiveMeoDmt => ("5-meo-dmt", "5-MeO-DMT"),
        Other => ("other", "Other"),
    }
}

tag_enum! {
    ConditionTreated {
        Ptsd => ("ptsd", "PTSD"),
        Depression => ("depression", "Depression"),
        Anxiety => ("anxiety", "Anxiety"),
        Addiction => ("addiction", "Addiction"),
        Trauma => ("trauma", "Trauma"),
        EndOfLife => ("end_of_life", "End-of-Life Anxiety"),
        Ocd => ("ocd", "OCD"),
        EatingDisorder => ("eating_disorder", "Eating Disorder"),
        ChronicPain => ("chronic_pain", "Chronic Pain"),
        RelationshipIssues => ("relationship_issues", "Relationship Issues"),
        SpiritualExploration => ("spiritual_exploration", "Spiritual Exploration"),
        Other => ("other", "Other"),
    }
}

tag_enum! {
    ReviewStatus {
        Pending => ("pending", "Pending"),
        Flagged => ("flagged", "Flagged"),
        Approved => ("approved", "Approved"),
        Rejected => ("rejected", "Rejected"),
    }
}

impl ReviewStatus {
    pub fn can_transition_to(&self, next: ReviewStatus) -> bool {
        use ReviewStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending, Flagged)
                | (Flagged, Approved) | (Flagged, Rejected)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReviewStatus::Approved | ReviewStatus::Rejected)
    }
}

/// Moderator's call on a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationDecision {
    Approve,
    Reject,
    Flag,
}

impl ModerationDecision {
    pub fn target_status(&self) -> ReviewStatus {
        match self {
            ModerationDecision::Approve => ReviewStatus::Approved,
            ModerationDecision::Reject => ReviewStatus::Rejected,
            ModerationDecision::Flag => ReviewStatus::Flagged,
        }
    }
}

// ============================================================================
// REVIEW ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub practitioner_id: String,

    /// Star rating, 1-5
    pub rating: u8,
    pub outcome_rating: OutcomeRating,
    pub treatment_type: ReviewTreatment,
    pub condition_treated: ConditionTreated,
    pub review_text: Option<String>,
    pub would_recommend: bool,

    pub treatment_month: Option<u32>,
    pub treatment_year: Option<i32>,

    /// Token redeemed on submission, if any
    pub token_id: Option<String>,
    pub is_verified: bool,
    pub status: ReviewStatus,

    pub moderated_at: Option<DateTime<Utc>>,
    pub moderated_by: Option<String>,
    pub moderation_notes: Option<String>,

    pub practitioner_response: Option<String>,
    pub response_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    /// Apply a moderation decision
    pub fn moderate(
        &mut self,
        decision: ModerationDecision,
        moderator: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let next = decision.target_status();

        if !self.status.can_transition_to(next) {
            return Err(TransitionError::new("review", self.status, next));
        }

        self.status = next;
        self.moderated_at = Some(now);
        self.moderated_by = Some(moderator.to_string());
        self.moderation_notes = notes;
        self.updated_at = now;
        Ok(())
    }

    /// Attach the practitioner's public reply. Approved reviews only, once.
    pub fn respond(&mut self, text: &str, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != ReviewStatus::Approved || self.practitioner_response.is_some() {
            let from = if self.practitioner_response.is_some() {
                "responded"
            } else {
                self.status.as_str()
            };
            return Err(TransitionError::new(
                "review response",
                from,
                "responded",
            ));
        }

        self.practitioner_response = Some(text.to_string());
        self.response_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn is_public(&self) -> bool {
        self.status == ReviewStatus::Approved
    }

    pub fn treatment_date(&self) -> String {
        format_treatment_date(self.treatment_month, self.treatment_year)
    }
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// "March 2024", "2024", or "Date not provided"
pub fn format_treatment_date(month: Option<u32>, year: Option<i32>) -> String {
    let Some(year) = year else {
        return "Date not provided".to_string();
    };

    match month {
        Some(m) if (1..=12).contains(&m) => format!("{} {}", MONTH_NAMES[(m - 1) as usize], year),
        _ => year.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_review() -> Review {
        let now = Utc::now();
        Review {
            id: "r1".to_string(),
            practitioner_id: "p1".to_string(),
            rating: 5,
            outcome_rating: OutcomeRating::LifeChanging,
            treatment_type: ReviewTreatment::Psilocybin,
            condition_treated: ConditionTreated::Depression,
            review_text: None,
            would_recommend: true,
            treatment_month: None,
            treatment_year: None,
            token_id: None,
            is_verified: false,
            status: ReviewStatus::Pending,
            moderated_at: None,
            moderated_by: None,
            moderation_notes: None,
            practitioner_response: None,
            response_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_outcome_ordinal_scale() {
        assert!(OutcomeRating::GotWorse < OutcomeRating::NoChange);
        assert!(OutcomeRating::SignificantImprovement < OutcomeRating::LifeChanging);
        assert!(OutcomeRating::ModerateImprovement.is_positive());
        assert!(!OutcomeRating::SlightImprovement.is_positive());
        assert!(OutcomeRating::POSITIVE.iter().all(|o| o.is_positive()));
    }

    #[test]
    fn test_moderation_paths() {
        let now = Utc::now();

        let mut review = pending_review();
        review.moderate(ModerationDecision::Flag, "mod", None, now).unwrap();
        assert_eq!(review.status, ReviewStatus::Flagged);
        review
            .moderate(ModerationDecision::Approve, "mod", Some("ok".into()), now)
            .unwrap();
        assert_eq!(review.status, ReviewStatus::Approved);
        assert_eq!(review.moderated_by.as_deref(), Some("mod"));
        assert!(review.is_public());

        // Terminal
        let err = review
            .moderate(ModerationDecision::Reject, "mod", None, now)
            .unwrap_err();
        assert_eq!(err.from, "approved");
        assert_eq!(err.to, "rejected");
    }

    #[test]
    fn test_flag_is_not_repeatable() {
        let mut review = pending_review();
        review.status = ReviewStatus::Flagged;
        assert!(review
            .moderate(ModerationDecision::Flag, "mod", None, Utc::now())
            .is_err());
    }

    #[test]
    fn test_response_only_once_on_approved() {
        let now = Utc::now();
        let mut review = pending_review();

        assert!(review.respond("Thank you", now).is_err());

        review.status = ReviewStatus::Approved;
        review.respond("Thank you", now).unwrap();
        assert_eq!(review.practitioner_response.as_deref(), Some("Thank you"));

        assert!(review.respond("Again", now).is_err());
    }

    #[test]
    fn test_format_treatment_date() {
        assert_eq!(format_treatment_date(Some(8), Some(2024)), "August 2024");
        assert_eq!(format_treatment_date(Some(13), Some(2024)), "2024");
        assert_eq!(format_treatment_date(None, Some(2023)), "2023");
        assert_eq!(format_treatment_date(Some(3), None), "Date not provided");
    }
}
