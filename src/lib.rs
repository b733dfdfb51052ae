// findpat - Directory Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod entities;      // Profiles, reviews, tokens, verification requests
pub mod validation;    // Submission checks
pub mod search;        // Multi-criteria directory filters
pub mod aggregation;   // Review stats
pub mod db;            // SQLite storage + audit trail
pub mod reviews;       // Tokens, submission, moderation
pub mod verifications; // Tier ladder decisions
pub mod config;

// Re-export commonly used types
pub use error::{DirectoryError, Result, TransitionError};
pub use db::{
    Event,
    setup_database, insert_event, get_events_for_entity,
    insert_practitioner, insert_practitioners, get_practitioner, get_practitioner_by_slug,
    find_practitioner, list_published_practitioners, publish_practitioner,
    insert_clinic, insert_clinics, get_clinic, get_clinic_by_slug, find_clinic,
    list_published_clinics, publish_clinic,
    load_practitioners_csv, load_clinics_csv,
    join_waitlist, waitlist_count,
};
pub use search::{
    ClinicFilter, PractitionerFilter, UserType,
    search_clinics, search_practitioners,
};
pub use aggregation::{
    DistributionEntry, ReviewStats,
    aggregate_reviews, distribution, positive_outcome_rate,
};
pub use reviews::{
    ReviewQuery,
    issue_review_token, list_review_tokens, submit_review, list_reviews,
    moderate_review, respond_to_review, review_stats, refresh_review_stats,
};
pub use verifications::{
    submit_verification, start_review, decide_verification,
    list_verifications, list_open_verifications,
};
pub use validation::{ReviewInput, ValidationError, VerificationInput};
pub use entities::{
    Clinic, Practitioner, Review, ReviewToken, VerificationRequest,
    VerificationSubject, VerificationTier,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
