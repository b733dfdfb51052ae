// Entity Models
//
// Each entity has:
// - Stable identity (UUID) that never changes
// - Enum-constrained fields for everything the directory filters on
// - Small, explicit lifecycle rules where the entity has a lifecycle

pub mod tags;
pub mod practitioner;
pub mod clinic;
pub mod review;
pub mod token;
pub mod verification;

pub use tags::{
    Availability, ClinicTreatmentType, CoverageType, InsuranceType, Modality, PractitionerRole,
    ServiceType, Specialty, UnknownTag, VerificationTier,
};
pub use practitioner::{slugify, Practitioner};
pub use clinic::Clinic;
pub use review::{
    ConditionTreated, ModerationDecision, OutcomeRating, Review, ReviewStatus, ReviewTreatment,
};
pub use token::{ReviewToken, TokenError, TokenState};
pub use verification::{
    Decision, VerificationEvidence, VerificationMethod, VerificationRequest, VerificationStatus,
    VerificationSubject,
};
