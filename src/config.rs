//! Configuration for findpat
//!
//! CLI arguments and environment variable handling using clap.

use crate::entities::review::{
    ConditionTreated, ModerationDecision, OutcomeRating, ReviewStatus, ReviewTreatment,
};
use crate::entities::tags::{
    Availability, ClinicTreatmentType, CoverageType, InsuranceType, Modality, PractitionerRole,
    ServiceType, Specialty, VerificationTier,
};
use crate::entities::token::{DEFAULT_TOKEN_TTL_DAYS, MAX_TOKEN_TTL_DAYS};
use crate::entities::verification::{Decision, VerificationMethod, VerificationSubject};
use crate::reviews::DEFAULT_PAGE_SIZE;
use crate::search::{ClinicFilter, PractitionerFilter, UserType};
use crate::validation::{ReviewInput, VerificationInput};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// findpat - practitioner and clinic directory core
#[derive(Parser, Debug, Clone)]
#[command(name = "findpat")]
#[command(about = "Directory, reviews and verification for psychedelic-assisted therapy providers")]
pub struct Config {
    /// SQLite database file
    #[arg(long, env = "FINDPAT_DB", default_value = "findpat.db", global = true)]
    pub db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Public site URL, used to build review links
    #[arg(long, env = "APP_URL", default_value = "https://findpat.com.au", global = true)]
    pub app_url: String,

    /// Days a review token stays redeemable
    #[arg(
        long,
        env = "REVIEW_TOKEN_TTL_DAYS",
        default_value_t = DEFAULT_TOKEN_TTL_DAYS,
        global = true
    )]
    pub token_ttl_days: i64,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&self.token_ttl_days) {
            return Err(format!(
                "REVIEW_TOKEN_TTL_DAYS must be between 1 and {}",
                MAX_TOKEN_TTL_DAYS
            ));
        }

        if !(self.app_url.starts_with("http://") || self.app_url.starts_with("https://")) {
            return Err("APP_URL must start with http:// or https://".to_string());
        }

        Ok(())
    }

    /// Clamped to the accepted range, so an unvalidated config cannot overflow
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.token_ttl_days.clamp(1, MAX_TOKEN_TTL_DAYS))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the database schema
    Init,

    /// Import practitioner profiles from CSV
    ImportPractitioners { csv: PathBuf },

    /// Import clinic profiles from CSV
    ImportClinics { csv: PathBuf },

    /// Make a profile visible in search
    Publish {
        slug: String,

        /// The slug names a clinic
        #[arg(long)]
        clinic: bool,
    },

    /// Search published practitioners
    Search(SearchArgs),

    /// Search published clinics
    SearchClinics(ClinicSearchArgs),

    /// Review tokens
    #[command(subcommand)]
    Token(TokenCommand),

    /// Anonymous reviews
    #[command(subcommand)]
    Review(ReviewCommand),

    /// Aggregate review stats for a practitioner
    Stats {
        practitioner: String,

        /// Recompute instead of reading the cache
        #[arg(long)]
        refresh: bool,
    },

    /// Verification requests
    #[command(subcommand)]
    Verify(VerifyCommand),

    /// Pre-launch waitlist
    #[command(subcommand)]
    Waitlist(WaitlistCommand),

    /// Audit trail for one entity
    Events { entity_type: String, entity_id: String },
}

// ============================================================================
// SEARCH
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Substring of "city state"
    #[arg(long)]
    pub location: Option<String>,

    #[arg(long, value_delimiter = ',')]
    pub modalities: Vec<Modality>,

    #[arg(long, value_delimiter = ',')]
    pub specialties: Vec<Specialty>,

    #[arg(long, value_delimiter = ',')]
    pub roles: Vec<PractitionerRole>,

    #[arg(long, value_delimiter = ',')]
    pub tiers: Vec<VerificationTier>,

    #[arg(long, value_delimiter = ',')]
    pub availability: Vec<Availability>,

    #[arg(long, value_delimiter = ',')]
    pub service_types: Vec<ServiceType>,

    #[arg(long, value_delimiter = ',')]
    pub coverage: Vec<CoverageType>,

    /// Search as a practitioner looking for collaborators
    #[arg(long)]
    pub collaborators: bool,
}

impl From<SearchArgs> for PractitionerFilter {
    fn from(args: SearchArgs) -> Self {
        PractitionerFilter {
            user_type: if args.collaborators {
                UserType::Practitioner
            } else {
                UserType::Client
            },
            location: args.location,
            modalities: args.modalities,
            specialties: args.specialties,
            roles: args.roles,
            verification_tiers: args.tiers,
            availability: args.availability,
            service_types: args.service_types,
            coverage: args.coverage,
            looking_to_collaborate: args.collaborators,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ClinicSearchArgs {
    /// Substring of "city state postcode"
    #[arg(long)]
    pub location: Option<String>,

    /// Exact state, any case
    #[arg(long)]
    pub state: Option<String>,

    #[arg(long, value_delimiter = ',')]
    pub modalities: Vec<Modality>,

    #[arg(long, value_delimiter = ',')]
    pub treatment_types: Vec<ClinicTreatmentType>,

    #[arg(long, value_delimiter = ',')]
    pub insurance: Vec<InsuranceType>,

    #[arg(long, value_delimiter = ',')]
    pub tiers: Vec<VerificationTier>,

    #[arg(long)]
    pub bulk_billing: bool,
}

impl From<ClinicSearchArgs> for ClinicFilter {
    fn from(args: ClinicSearchArgs) -> Self {
        ClinicFilter {
            location: args.location,
            state: args.state,
            modalities: args.modalities,
            treatment_types: args.treatment_types,
            insurance_accepted: args.insurance,
            verification_tiers: args.tiers,
            bulk_billing: args.bulk_billing.then_some(true),
        }
    }
}

// ============================================================================
// TOKENS AND REVIEWS
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum TokenCommand {
    /// Issue a single-use review token
    Issue {
        practitioner: String,

        #[arg(long)]
        email: Option<String>,
    },

    /// List a practitioner's tokens
    List {
        practitioner: String,

        /// Include used and expired tokens
        #[arg(long)]
        include_used: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReviewCommand {
    /// Submit an anonymous review (stored pending)
    Submit(SubmitReviewArgs),

    /// List reviews newest first, for one practitioner or all of them
    List {
        /// Practitioner id or slug; omit for the directory-wide queue
        #[arg(long)]
        practitioner: Option<String>,

        #[arg(long, default_value = "approved")]
        status: ReviewStatus,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Approve, reject or flag a review
    Moderate {
        review_id: String,

        #[arg(value_enum)]
        decision: ModerationArg,

        #[arg(long, default_value = "admin")]
        moderator: String,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Public reply from the reviewed practitioner
    Respond {
        review_id: String,

        #[arg(long)]
        practitioner: String,

        text: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SubmitReviewArgs {
    pub practitioner: String,

    /// Star rating, 1-5
    #[arg(long)]
    pub rating: i64,

    #[arg(long)]
    pub outcome: OutcomeRating,

    #[arg(long)]
    pub treatment: ReviewTreatment,

    #[arg(long)]
    pub condition: ConditionTreated,

    #[arg(long)]
    pub text: Option<String>,

    #[arg(long)]
    pub recommend: bool,

    #[arg(long)]
    pub month: Option<u32>,

    #[arg(long)]
    pub year: Option<i32>,

    #[arg(long)]
    pub token: Option<String>,
}

impl From<SubmitReviewArgs> for ReviewInput {
    fn from(args: SubmitReviewArgs) -> Self {
        ReviewInput {
            rating: args.rating,
            outcome_rating: args.outcome,
            treatment_type: args.treatment,
            condition_treated: args.condition,
            review_text: args.text,
            would_recommend: args.recommend,
            treatment_month: args.month,
            treatment_year: args.year,
            token: args.token,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationArg {
    Approve,
    Reject,
    Flag,
}

impl From<ModerationArg> for ModerationDecision {
    fn from(arg: ModerationArg) -> Self {
        match arg {
            ModerationArg::Approve => ModerationDecision::Approve,
            ModerationArg::Reject => ModerationDecision::Reject,
            ModerationArg::Flag => ModerationDecision::Flag,
        }
    }
}

// ============================================================================
// VERIFICATION AND WAITLIST
// ============================================================================

/// Exactly one of --practitioner / --clinic
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct SubjectArgs {
    #[arg(long)]
    pub practitioner: Option<String>,

    #[arg(long)]
    pub clinic: Option<String>,
}

impl SubjectArgs {
    pub fn subject(&self) -> Option<VerificationSubject> {
        match (&self.practitioner, &self.clinic) {
            (Some(p), _) => Some(VerificationSubject::Practitioner(p.clone())),
            (None, Some(c)) => Some(VerificationSubject::Clinic(c.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum VerifyCommand {
    /// Submit proof for a practitioner or clinic
    Submit(SubmitVerificationArgs),

    /// Mark a pending request as under review
    Start {
        request_id: String,

        #[arg(long, default_value = "admin")]
        reviewer: String,
    },

    /// Approve or reject a request
    Decide {
        request_id: String,

        #[arg(value_enum)]
        decision: DecisionArg,

        #[arg(long, default_value = "admin")]
        reviewer: String,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Requests for one subject, or the open queue when none is given
    List {
        #[arg(long, conflicts_with = "clinic")]
        practitioner: Option<String>,

        #[arg(long)]
        clinic: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SubmitVerificationArgs {
    #[command(flatten)]
    pub subject: SubjectArgs,

    #[arg(long)]
    pub method: VerificationMethod,

    #[arg(long)]
    pub registry_number: Option<String>,

    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub profile_url: Option<String>,

    /// Reference to an already uploaded document
    #[arg(long)]
    pub document: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,

    #[arg(long)]
    pub target_tier: Option<VerificationTier>,
}

impl SubmitVerificationArgs {
    pub fn input(&self) -> VerificationInput {
        VerificationInput {
            registry_number: self.registry_number.clone(),
            professional_email: self.email.clone(),
            profile_url: self.profile_url.clone(),
            document_ref: self.document.clone(),
            notes: self.notes.clone(),
            target_tier: self.target_tier,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionArg {
    Approve,
    Reject,
}

impl From<DecisionArg> for Decision {
    fn from(arg: DecisionArg) -> Self {
        match arg {
            DecisionArg::Approve => Decision::Approve,
            DecisionArg::Reject => Decision::Reject,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum WaitlistCommand {
    Join { email: String },
    Count,
}
