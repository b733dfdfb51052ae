// 📝 Reviews - tokens, submission, moderation and cached stats
//
// Flow:
//   practitioner issues token ──► client submits review (+ token)
//     ──► review stored pending ──► moderator approves / rejects
//     ──► approved reviews feed the practitioner's stats
//
// Token redemption and review insertion share one transaction: either the
// review exists and its token is used, or neither happened.

use crate::aggregation::{aggregate_reviews, ReviewStats};
use crate::db::{
    find_practitioner, get_json, get_opt_time, get_tag, get_time, record_event,
};
use crate::entities::review::{ModerationDecision, Review, ReviewStatus};
use crate::entities::token::{ReviewToken, TokenError};
use crate::error::{DirectoryError, Result};
use crate::validation::{is_valid_email, ReviewInput};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

// ============================================================================
// REVIEW TOKENS
// ============================================================================

fn token_from_row(row: &Row) -> rusqlite::Result<ReviewToken> {
    Ok(ReviewToken {
        id: row.get("id")?,
        practitioner_id: row.get("practitioner_id")?,
        token: row.get("token")?,
        client_email: row.get("client_email")?,
        is_used: row.get("is_used")?,
        used_at: get_opt_time(row, "used_at")?,
        expires_at: get_time(row, "expires_at")?,
        created_at: get_time(row, "created_at")?,
    })
}

const TOKEN_COLUMNS: &str =
    "id, practitioner_id, token, client_email, is_used, used_at, expires_at, created_at";

pub fn issue_review_token(
    conn: &Connection,
    practitioner_id: &str,
    client_email: Option<String>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<ReviewToken> {
    let practitioner = find_practitioner(conn, practitioner_id)?;

    let client_email = client_email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    if let Some(email) = &client_email {
        if !is_valid_email(email) {
            return Err(DirectoryError::invalid("client_email", "invalid email address"));
        }
    }

    let token = ReviewToken::issue(&practitioner.id, client_email, ttl, now)?;

    conn.execute(
        "INSERT INTO review_tokens (
            id, practitioner_id, token, client_email, is_used, used_at, expires_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            token.id,
            token.practitioner_id,
            token.token,
            token.client_email,
            token.is_used,
            token.used_at.map(|t| t.to_rfc3339()),
            token.expires_at.to_rfc3339(),
            token.created_at.to_rfc3339(),
        ],
    )?;

    record_event(
        conn,
        "review_token_issued",
        "review_token",
        &token.id,
        serde_json::json!({
            "practitioner_id": token.practitioner_id,
            "expires_at": token.expires_at.to_rfc3339(),
        }),
        &practitioner.id,
        now,
    )?;

    info!(
        practitioner = %practitioner.slug,
        expires_at = %token.expires_at,
        "review token issued"
    );
    Ok(token)
}

/// Newest first. Without `include_used` only tokens that can still be redeemed.
pub fn list_review_tokens(
    conn: &Connection,
    practitioner_id: &str,
    include_used: bool,
    now: DateTime<Utc>,
) -> Result<Vec<ReviewToken>> {
    let practitioner = find_practitioner(conn, practitioner_id)?;

    let sql = format!(
        "SELECT {} FROM review_tokens WHERE practitioner_id = ?1
         ORDER BY created_at DESC, rowid DESC",
        TOKEN_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let tokens = stmt
        .query_map([&practitioner.id], token_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(tokens
        .into_iter()
        .filter(|t| include_used || t.is_redeemable(now))
        .collect())
}

pub fn get_review_token(conn: &Connection, token: &str) -> Result<Option<ReviewToken>> {
    let sql = format!("SELECT {} FROM review_tokens WHERE token = ?1", TOKEN_COLUMNS);
    Ok(conn.query_row(&sql, [token], token_from_row).optional()?)
}

/// unused → used, checked against the practitioner the review is for
fn redeem_token(
    conn: &Connection,
    token: &str,
    practitioner_id: &str,
    now: DateTime<Utc>,
) -> Result<ReviewToken> {
    let mut record = get_review_token(conn, token)?.ok_or(TokenError::Unknown)?;

    if record.practitioner_id != practitioner_id {
        return Err(TokenError::WrongPractitioner.into());
    }
    record.redeem(now)?;

    // Guard on is_used so a concurrent redemption cannot win twice
    let changed = conn.execute(
        "UPDATE review_tokens SET is_used = 1, used_at = ?1 WHERE id = ?2 AND is_used = 0",
        params![now.to_rfc3339(), record.id],
    )?;
    if changed == 0 {
        return Err(TokenError::AlreadyUsed.into());
    }

    Ok(record)
}

// ============================================================================
// REVIEWS
// ============================================================================

const REVIEW_COLUMNS: &str = "id, practitioner_id, rating, outcome_rating, treatment_type,
    condition_treated, review_text, would_recommend, treatment_month, treatment_year,
    token_id, is_verified, status, moderated_at, moderated_by, moderation_notes,
    practitioner_response, response_at, created_at, updated_at";

fn review_from_row(row: &Row) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get("id")?,
        practitioner_id: row.get("practitioner_id")?,
        rating: row.get("rating")?,
        outcome_rating: get_tag(row, "outcome_rating")?,
        treatment_type: get_tag(row, "treatment_type")?,
        condition_treated: get_tag(row, "condition_treated")?,
        review_text: row.get("review_text")?,
        would_recommend: row.get("would_recommend")?,
        treatment_month: row.get("treatment_month")?,
        treatment_year: row.get("treatment_year")?,
        token_id: row.get("token_id")?,
        is_verified: row.get("is_verified")?,
        status: get_tag(row, "status")?,
        moderated_at: get_opt_time(row, "moderated_at")?,
        moderated_by: row.get("moderated_by")?,
        moderation_notes: row.get("moderation_notes")?,
        practitioner_response: row.get("practitioner_response")?,
        response_at: get_opt_time(row, "response_at")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

/// Store an anonymous review as `pending`.
///
/// A supplied token must belong to this practitioner and still be
/// redeemable; the review is then marked verified.
pub fn submit_review(
    conn: &mut Connection,
    practitioner_id: &str,
    input: ReviewInput,
    now: DateTime<Utc>,
) -> Result<Review> {
    let practitioner = find_practitioner(conn, practitioner_id)?;
    let input = input.validate(now)?;

    let tx = conn.transaction()?;

    let token = match input.token.as_deref() {
        Some(token) => match redeem_token(&tx, token, &practitioner.id, now) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(practitioner = %practitioner.slug, error = %e, "review token rejected");
                return Err(e);
            }
        },
        None => None,
    };

    let review = Review {
        id: uuid::Uuid::new_v4().to_string(),
        practitioner_id: practitioner.id.clone(),
        // validated to 1..=5
        rating: input.rating as u8,
        outcome_rating: input.outcome_rating,
        treatment_type: input.treatment_type,
        condition_treated: input.condition_treated,
        review_text: input.review_text,
        would_recommend: input.would_recommend,
        treatment_month: input.treatment_month,
        treatment_year: input.treatment_year,
        token_id: token.as_ref().map(|t| t.id.clone()),
        is_verified: token.is_some(),
        status: ReviewStatus::Pending,
        moderated_at: None,
        moderated_by: None,
        moderation_notes: None,
        practitioner_response: None,
        response_at: None,
        created_at: now,
        updated_at: now,
    };

    tx.execute(
        "INSERT INTO reviews (
            id, practitioner_id, rating, outcome_rating, treatment_type, condition_treated,
            review_text, would_recommend, treatment_month, treatment_year, token_id,
            is_verified, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            review.id,
            review.practitioner_id,
            review.rating,
            review.outcome_rating.as_str(),
            review.treatment_type.as_str(),
            review.condition_treated.as_str(),
            review.review_text,
            review.would_recommend,
            review.treatment_month,
            review.treatment_year,
            review.token_id,
            review.is_verified,
            review.status.as_str(),
            review.created_at.to_rfc3339(),
            review.updated_at.to_rfc3339(),
        ],
    )?;

    record_event(
        &tx,
        "review_submitted",
        "review",
        &review.id,
        serde_json::json!({
            "practitioner_id": review.practitioner_id,
            "rating": review.rating,
            "is_verified": review.is_verified,
        }),
        "anonymous",
        now,
    )?;

    refresh_review_stats(&tx, &practitioner.id, now)?;
    tx.commit()?;

    info!(
        practitioner = %practitioner.slug,
        verified = review.is_verified,
        "review submitted for moderation"
    );
    Ok(review)
}

pub fn get_review(conn: &Connection, id: &str) -> Result<Option<Review>> {
    let sql = format!("SELECT {} FROM reviews WHERE id = ?1", REVIEW_COLUMNS);
    Ok(conn.query_row(&sql, [id], review_from_row).optional()?)
}

/// Page of reviews, for one practitioner or across the whole directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewQuery {
    /// Id or slug. `None` lists every practitioner (the moderation queue).
    #[serde(default)]
    pub practitioner_id: Option<String>,

    #[serde(default = "default_status")]
    pub status: ReviewStatus,

    #[serde(default = "default_limit")]
    pub limit: u32,

    #[serde(default)]
    pub offset: u32,
}

fn default_status() -> ReviewStatus {
    ReviewStatus::Approved
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl ReviewQuery {
    pub fn new(practitioner_id: &str) -> Self {
        ReviewQuery {
            practitioner_id: Some(practitioner_id.to_string()),
            ..Self::all(default_status())
        }
    }

    /// Reviews in `status` across all practitioners
    pub fn all(status: ReviewStatus) -> Self {
        ReviewQuery {
            practitioner_id: None,
            status,
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// Newest first
pub fn list_reviews(conn: &Connection, query: &ReviewQuery) -> Result<Vec<Review>> {
    let practitioner_id = match &query.practitioner_id {
        Some(id) => Some(find_practitioner(conn, id)?.id),
        None => None,
    };

    let sql = format!(
        "SELECT {} FROM reviews
         WHERE (?1 IS NULL OR practitioner_id = ?1) AND status = ?2
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?3 OFFSET ?4",
        REVIEW_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let reviews = stmt
        .query_map(
            params![practitioner_id, query.status.as_str(), query.limit, query.offset],
            review_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(reviews)
}

/// Every review of a practitioner regardless of status
fn all_reviews_for(conn: &Connection, practitioner_id: &str) -> Result<Vec<Review>> {
    let sql = format!(
        "SELECT {} FROM reviews WHERE practitioner_id = ?1 ORDER BY created_at",
        REVIEW_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let reviews = stmt
        .query_map([practitioner_id], review_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(reviews)
}

fn save_review_state(conn: &Connection, review: &Review) -> Result<()> {
    conn.execute(
        "UPDATE reviews
         SET status = ?1, moderated_at = ?2, moderated_by = ?3, moderation_notes = ?4,
             practitioner_response = ?5, response_at = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            review.status.as_str(),
            review.moderated_at.map(|t| t.to_rfc3339()),
            review.moderated_by,
            review.moderation_notes,
            review.practitioner_response,
            review.response_at.map(|t| t.to_rfc3339()),
            review.updated_at.to_rfc3339(),
            review.id,
        ],
    )?;
    Ok(())
}

pub fn moderate_review(
    conn: &mut Connection,
    review_id: &str,
    decision: ModerationDecision,
    moderator: &str,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<Review> {
    let tx = conn.transaction()?;

    let mut review = get_review(&tx, review_id)?
        .ok_or_else(|| DirectoryError::not_found("review", review_id))?;
    let from = review.status;

    review.moderate(decision, moderator, notes, now)?;
    save_review_state(&tx, &review)?;

    record_event(
        &tx,
        "review_moderated",
        "review",
        &review.id,
        serde_json::json!({
            "from": from.as_str(),
            "to": review.status.as_str(),
            "notes": review.moderation_notes,
        }),
        moderator,
        now,
    )?;

    refresh_review_stats(&tx, &review.practitioner_id, now)?;
    tx.commit()?;

    info!(review = %review.id, from = %from, to = %review.status, "review moderated");
    Ok(review)
}

/// Public reply from the practitioner the review is about
pub fn respond_to_review(
    conn: &Connection,
    review_id: &str,
    practitioner_id: &str,
    text: &str,
    now: DateTime<Utc>,
) -> Result<Review> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DirectoryError::invalid("response", "response text is required"));
    }

    let practitioner = find_practitioner(conn, practitioner_id)?;
    let mut review = get_review(conn, review_id)?
        .filter(|r| r.practitioner_id == practitioner.id)
        .ok_or_else(|| DirectoryError::not_found("review", review_id))?;

    review.respond(text, now)?;
    save_review_state(conn, &review)?;

    record_event(
        conn,
        "review_response_added",
        "review",
        &review.id,
        serde_json::json!({ "practitioner_id": practitioner.id }),
        &practitioner.id,
        now,
    )?;

    Ok(review)
}

// ============================================================================
// STATS CACHE
// ============================================================================

/// Recompute from stored reviews and upsert the cached row
pub fn refresh_review_stats(
    conn: &Connection,
    practitioner_id: &str,
    now: DateTime<Utc>,
) -> Result<ReviewStats> {
    let reviews = all_reviews_for(conn, practitioner_id)?;
    let stats = aggregate_reviews(practitioner_id, &reviews, now);

    conn.execute(
        "INSERT INTO review_stats (practitioner_id, stats, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(practitioner_id) DO UPDATE SET
            stats = excluded.stats,
            updated_at = excluded.updated_at",
        params![practitioner_id, serde_json::to_string(&stats)?, now.to_rfc3339()],
    )?;

    debug!(practitioner = practitioner_id, approved = stats.approved_reviews, "stats refreshed");
    Ok(stats)
}

/// Cached stats when present, otherwise computed on the fly
pub fn review_stats(
    conn: &Connection,
    practitioner_id: &str,
    now: DateTime<Utc>,
) -> Result<ReviewStats> {
    let practitioner = find_practitioner(conn, practitioner_id)?;

    let cached: Option<ReviewStats> = conn
        .query_row(
            "SELECT stats FROM review_stats WHERE practitioner_id = ?1",
            [&practitioner.id],
            |row| get_json(row, "stats"),
        )
        .optional()?;

    match cached {
        Some(stats) => Ok(stats),
        None => {
            let reviews = all_reviews_for(conn, &practitioner.id)?;
            Ok(aggregate_reviews(&practitioner.id, &reviews, now))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_events_for_entity, insert_practitioner, setup_database};
    use crate::entities::review::{ConditionTreated, OutcomeRating, ReviewTreatment};
    use crate::entities::tags::PractitionerRole;
    use crate::entities::Practitioner;
    use chrono::TimeZone;

    fn test_db() -> (Connection, Practitioner) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut p = Practitioner::new(
            "Dr. Sarah Martinez",
            PractitionerRole::Psychiatrist,
            "Sydney",
            "NSW",
            "AU",
        );
        p.is_published = true;
        insert_practitioner(&conn, &p).unwrap();
        (conn, p)
    }

    fn add_practitioner(conn: &Connection, name: &str) -> Practitioner {
        let p = Practitioner::new(name, PractitionerRole::Therapist, "Hobart", "TAS", "AU");
        insert_practitioner(conn, &p).unwrap();
        p
    }

    fn input(rating: i64, token: Option<&str>) -> ReviewInput {
        ReviewInput {
            rating,
            outcome_rating: OutcomeRating::SignificantImprovement,
            treatment_type: ReviewTreatment::Psilocybin,
            condition_treated: ConditionTreated::Depression,
            review_text: Some("Careful preparation and integration.".to_string()),
            would_recommend: true,
            treatment_month: None,
            treatment_year: None,
            token: token.map(str::to_string),
        }
    }

    fn ttl() -> Duration {
        Duration::days(30)
    }

    fn review_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_submit_without_token_is_pending_and_unverified() {
        let (mut conn, p) = test_db();

        let review = submit_review(&mut conn, &p.slug, input(5, None), Utc::now()).unwrap();

        assert_eq!(review.status, ReviewStatus::Pending);
        assert!(!review.is_verified);
        assert_eq!(review.practitioner_id, p.id);

        let events = get_events_for_entity(&conn, "review", &review.id).unwrap();
        assert_eq!(events[0].event_type, "review_submitted");
    }

    #[test]
    fn test_submit_with_token_marks_verified_and_uses_token() {
        let (mut conn, p) = test_db();
        let now = Utc::now();
        let token = issue_review_token(&conn, &p.id, None, ttl(), now).unwrap();

        let review = submit_review(&mut conn, &p.id, input(4, Some(&token.token)), now).unwrap();
        assert!(review.is_verified);
        assert_eq!(review.token_id.as_deref(), Some(token.id.as_str()));

        let stored = get_review_token(&conn, &token.token).unwrap().unwrap();
        assert!(stored.is_used);
        assert_eq!(stored.used_at, Some(now));
    }

    #[test]
    fn test_token_cannot_be_reused() {
        let (mut conn, p) = test_db();
        let now = Utc::now();
        let token = issue_review_token(&conn, &p.id, None, ttl(), now).unwrap();

        submit_review(&mut conn, &p.id, input(5, Some(&token.token)), now).unwrap();
        let second = submit_review(&mut conn, &p.id, input(5, Some(&token.token)), now);

        assert!(matches!(second, Err(DirectoryError::Token(TokenError::AlreadyUsed))));
        assert_eq!(review_count(&conn), 1);
    }

    #[test]
    fn test_expired_token_rejected_and_nothing_stored() {
        let (mut conn, p) = test_db();
        let issued = Utc::now() - Duration::days(31);
        let token = issue_review_token(&conn, &p.id, None, ttl(), issued).unwrap();

        let result = submit_review(&mut conn, &p.id, input(5, Some(&token.token)), Utc::now());

        assert!(matches!(result, Err(DirectoryError::Token(TokenError::Expired))));
        assert_eq!(review_count(&conn), 0);
        assert!(!get_review_token(&conn, &token.token).unwrap().unwrap().is_used);
    }

    #[test]
    fn test_token_bound_to_practitioner() {
        let (mut conn, p) = test_db();
        let other = add_practitioner(&conn, "Other Person");
        let now = Utc::now();
        let token = issue_review_token(&conn, &p.id, None, ttl(), now).unwrap();

        let result = submit_review(&mut conn, &other.id, input(5, Some(&token.token)), now);
        assert!(matches!(
            result,
            Err(DirectoryError::Token(TokenError::WrongPractitioner))
        ));

        let unknown = submit_review(&mut conn, &p.id, input(5, Some("deadbeef")), now);
        assert!(matches!(unknown, Err(DirectoryError::Token(TokenError::Unknown))));
    }

    #[test]
    fn test_invalid_review_and_unknown_practitioner() {
        let (mut conn, p) = test_db();

        assert!(matches!(
            submit_review(&mut conn, &p.id, input(0, None), Utc::now()),
            Err(DirectoryError::Validation(_))
        ));
        assert!(matches!(
            submit_review(&mut conn, "nobody", input(5, None), Utc::now()),
            Err(DirectoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_tokens_hides_used_and_expired() {
        let (mut conn, p) = test_db();
        let now = Utc::now();

        let used = issue_review_token(&conn, &p.id, None, ttl(), now).unwrap();
        issue_review_token(&conn, &p.id, None, ttl(), now - Duration::days(40)).unwrap();
        let fresh =
            issue_review_token(&conn, &p.id, Some("Client@Example.com".into()), ttl(), now)
                .unwrap();
        assert_eq!(fresh.client_email.as_deref(), Some("client@example.com"));

        submit_review(&mut conn, &p.id, input(5, Some(&used.token)), now).unwrap();

        let open = list_review_tokens(&conn, &p.id, false, now).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, fresh.id);

        assert_eq!(list_review_tokens(&conn, &p.id, true, now).unwrap().len(), 3);
    }

    #[test]
    fn test_issue_token_rejects_bad_email() {
        let (conn, p) = test_db();
        assert!(matches!(
            issue_review_token(&conn, &p.id, Some("nope".into()), ttl(), Utc::now()),
            Err(DirectoryError::Validation(_))
        ));
    }

    #[test]
    fn test_issue_token_rejects_out_of_range_ttl() {
        let (conn, p) = test_db();
        let huge = Duration::days(100_000_000);
        let result = issue_review_token(&conn, &p.id, None, huge, Utc::now());

        assert!(matches!(
            result,
            Err(DirectoryError::Token(TokenError::LifetimeOutOfRange))
        ));
        assert!(list_review_tokens(&conn, &p.id, true, Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn test_list_reviews_defaults_to_approved_newest_first() {
        let (mut conn, p) = test_db();
        let start = Utc::now();

        let mut ids = Vec::new();
        for i in 0..3 {
            let r = submit_review(&mut conn, &p.id, input(5, None), start + Duration::minutes(i))
                .unwrap();
            ids.push(r.id);
        }
        for id in [&ids[0], &ids[2]] {
            moderate_review(&mut conn, id, ModerationDecision::Approve, "mod", None, start)
                .unwrap();
        }

        let approved = list_reviews(&conn, &ReviewQuery::new(&p.id)).unwrap();
        let listed: Vec<&str> = approved.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(listed, vec![ids[2].as_str(), ids[0].as_str()]);

        let mut pending = ReviewQuery::new(&p.slug);
        pending.status = ReviewStatus::Pending;
        assert_eq!(list_reviews(&conn, &pending).unwrap().len(), 1);

        let mut page = ReviewQuery::new(&p.id);
        page.limit = 1;
        page.offset = 1;
        let second_page = list_reviews(&conn, &page).unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].id, ids[0]);
    }

    #[test]
    fn test_pending_queue_spans_practitioners() {
        let (mut conn, p) = test_db();
        let other = add_practitioner(&conn, "Other Person");
        let start = Utc::now();

        let first = submit_review(&mut conn, &p.id, input(5, None), start).unwrap();
        let second =
            submit_review(&mut conn, &other.id, input(3, None), start + Duration::minutes(1))
                .unwrap();
        let approved =
            submit_review(&mut conn, &other.id, input(4, None), start + Duration::minutes(2))
                .unwrap();
        moderate_review(&mut conn, &approved.id, ModerationDecision::Approve, "mod", None, start)
            .unwrap();

        let queue = list_reviews(&conn, &ReviewQuery::all(ReviewStatus::Pending)).unwrap();
        let listed: Vec<&str> = queue.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(listed, vec![second.id.as_str(), first.id.as_str()]);

        let mut one = ReviewQuery::new(&other.slug);
        one.status = ReviewStatus::Pending;
        assert_eq!(list_reviews(&conn, &one).unwrap().len(), 1);
    }

    #[test]
    fn test_review_query_defaults_from_json() {
        let query: ReviewQuery =
            serde_json::from_str(r#"{"practitioner_id": "p1"}"#).unwrap();
        assert_eq!(query.practitioner_id.as_deref(), Some("p1"));
        assert_eq!(query.status, ReviewStatus::Approved);
        assert_eq!(query.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(query.offset, 0);

        let queue: ReviewQuery = serde_json::from_str(r#"{"status": "pending"}"#).unwrap();
        assert_eq!(queue, ReviewQuery::all(ReviewStatus::Pending));
    }

    #[test]
    fn test_moderation_refreshes_stats() {
        let (mut conn, p) = test_db();
        let now = Utc::now();

        let a = submit_review(&mut conn, &p.id, input(5, None), now).unwrap();
        let b = submit_review(&mut conn, &p.id, input(2, None), now).unwrap();

        let before = review_stats(&conn, &p.id, now).unwrap();
        assert_eq!(before.total_reviews, 2);
        assert_eq!(before.average_rating, None);

        moderate_review(&mut conn, &a.id, ModerationDecision::Approve, "mod", None, now).unwrap();
        let notes = Some("spam".to_string());
        moderate_review(&mut conn, &b.id, ModerationDecision::Reject, "mod", notes, now).unwrap();

        let after = review_stats(&conn, &p.id, now).unwrap();
        assert_eq!(after.approved_reviews, 1);
        assert_eq!(after.average_rating, Some(5.0));
        assert_eq!(after.recommendation_rate, Some(100));
    }

    #[test]
    fn test_terminal_review_cannot_be_remoderated() {
        let (mut conn, p) = test_db();
        let now = Utc::now();
        let r = submit_review(&mut conn, &p.id, input(5, None), now).unwrap();

        moderate_review(&mut conn, &r.id, ModerationDecision::Reject, "mod", None, now).unwrap();
        let again =
            moderate_review(&mut conn, &r.id, ModerationDecision::Approve, "mod", None, now);

        assert!(matches!(again, Err(DirectoryError::Transition(_))));
        let stored = get_review(&conn, &r.id).unwrap().unwrap();
        assert_eq!(stored.status, ReviewStatus::Rejected);
    }

    #[test]
    fn test_events_carry_supplied_time() {
        let (mut conn, p) = test_db();
        let submitted = Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap();
        let moderated = Utc.with_ymd_and_hms(2024, 5, 3, 16, 45, 0).unwrap();

        let r = submit_review(&mut conn, &p.id, input(5, None), submitted).unwrap();
        moderate_review(&mut conn, &r.id, ModerationDecision::Approve, "mod", None, moderated)
            .unwrap();

        // newest first
        let events = get_events_for_entity(&conn, "review", &r.id).unwrap();
        let stamps: Vec<_> = events.iter().map(|e| (e.event_type.as_str(), e.timestamp)).collect();
        assert_eq!(
            stamps,
            vec![("review_moderated", moderated), ("review_submitted", submitted)]
        );
    }

    #[test]
    fn test_stats_computed_without_cache() {
        let (mut conn, p) = test_db();
        let now = Utc::now();
        let r = submit_review(&mut conn, &p.id, input(4, None), now).unwrap();
        moderate_review(&mut conn, &r.id, ModerationDecision::Approve, "mod", None, now).unwrap();

        conn.execute("DELETE FROM review_stats", []).unwrap();

        let stats = review_stats(&conn, &p.id, now).unwrap();
        assert_eq!(stats.approved_reviews, 1);
        assert_eq!(stats.average_rating, Some(4.0));
    }

    #[test]
    fn test_respond_to_review() {
        let (mut conn, p) = test_db();
        let other = add_practitioner(&conn, "Someone Else");
        let now = Utc::now();
        let r = submit_review(&mut conn, &p.id, input(5, None), now).unwrap();

        // pending reviews cannot be answered
        assert!(matches!(
            respond_to_review(&conn, &r.id, &p.id, "Thanks", now),
            Err(DirectoryError::Transition(_))
        ));

        moderate_review(&mut conn, &r.id, ModerationDecision::Approve, "mod", None, now).unwrap();

        assert!(matches!(
            respond_to_review(&conn, &r.id, &other.id, "Not mine", now),
            Err(DirectoryError::NotFound { .. })
        ));
        assert!(matches!(
            respond_to_review(&conn, &r.id, &p.id, "   ", now),
            Err(DirectoryError::Validation(_))
        ));

        let answered = respond_to_review(&conn, &r.id, &p.id, " Thank you ", now).unwrap();
        assert_eq!(answered.practitioner_response.as_deref(), Some("Thank you"));
        assert!(respond_to_review(&conn, &r.id, &p.id, "Again", now).is_err());
    }
}
