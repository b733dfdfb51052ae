// 🎟️ Review Token - single-use, time-boxed capability
//
// A practitioner hands a token to a real client. Submitting a review with
// it marks the review as verified. The token moves unused → used exactly
// once; an expired token can never be redeemed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 30;
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token does not exist")]
    Unknown,

    #[error("token has already been used")]
    AlreadyUsed,

    #[error("token has expired")]
    Expired,

    #[error("token was issued for a different practitioner")]
    WrongPractitioner,

    #[error("token lifetime must be between 1 and {MAX_TOKEN_TTL_DAYS} days")]
    LifetimeOutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Unused,
    Used,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewToken {
    pub id: String,
    pub practitioner_id: String,
    pub token: String,
    pub client_email: Option<String>,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ReviewToken {
    pub fn issue(
        practitioner_id: &str,
        client_email: Option<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, TokenError> {
        if ttl <= Duration::zero() || ttl > Duration::days(MAX_TOKEN_TTL_DAYS) {
            return Err(TokenError::LifetimeOutOfRange);
        }
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(TokenError::LifetimeOutOfRange)?;
        let id = uuid::Uuid::new_v4();

        Ok(ReviewToken {
            id: id.to_string(),
            practitioner_id: practitioner_id.to_string(),
            token: generate_token_string(&id, practitioner_id),
            client_email,
            is_used: false,
            used_at: None,
            expires_at,
            created_at: now,
        })
    }

    /// A used token reports `Used` even after its expiry passes
    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        if self.is_used {
            TokenState::Used
        } else if now >= self.expires_at {
            TokenState::Expired
        } else {
            TokenState::Unused
        }
    }

    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == TokenState::Unused
    }

    /// unused → used
    pub fn redeem(&mut self, now: DateTime<Utc>) -> Result<(), TokenError> {
        match self.state(now) {
            TokenState::Used => Err(TokenError::AlreadyUsed),
            TokenState::Expired => Err(TokenError::Expired),
            TokenState::Unused => {
                self.is_used = true;
                self.used_at = Some(now);
                Ok(())
            }
        }
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days().max(0)
    }
}

/// 32 lowercase hex chars
fn generate_token_string(id: &uuid::Uuid, practitioner_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(practitioner_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

/// Link a client follows to leave a verified review
pub fn review_url(app_url: &str, practitioner_slug: &str, token: &str) -> String {
    format!(
        "{}/review/{}?token={}",
        app_url.trim_end_matches('/'),
        practitioner_slug,
        token
    )
}
