// ✅ Verifications - submitting proof and deciding on it
//
// The tier ladder only moves here: an approved request lifts its subject
// to the request's target tier inside the same transaction that records
// the decision. A subject has at most one open request at a time.

use crate::db::{
    conversion_error, find_clinic, find_practitioner, get_json, get_opt_time, get_tag, get_time,
    record_event, set_clinic_tier, set_practitioner_tier,
};
use crate::entities::tags::{UnknownTag, VerificationTier};
use crate::entities::verification::{
    Decision, VerificationMethod, VerificationRequest, VerificationStatus, VerificationSubject,
};
use crate::error::{DirectoryError, Result};
use crate::validation::VerificationInput;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

const VERIFICATION_COLUMNS: &str = "id, subject_kind, subject_id, method, status, evidence,
    target_tier, submitted_at, reviewed_at, reviewed_by, review_notes, rejection_reason";

fn verification_from_row(row: &Row) -> rusqlite::Result<VerificationRequest> {
    let kind: String = row.get("subject_kind")?;
    let subject = VerificationSubject::from_parts(&kind, row.get("subject_id")?).ok_or_else(|| {
        conversion_error(
            row,
            "subject_kind",
            UnknownTag {
                kind: "verification subject",
                value: kind.clone(),
            },
        )
    })?;

    Ok(VerificationRequest {
        id: row.get("id")?,
        subject,
        method: get_tag(row, "method")?,
        status: get_tag(row, "status")?,
        evidence: get_json(row, "evidence")?,
        target_tier: get_tag(row, "target_tier")?,
        submitted_at: get_time(row, "submitted_at")?,
        reviewed_at: get_opt_time(row, "reviewed_at")?,
        reviewed_by: row.get("reviewed_by")?,
        review_notes: row.get("review_notes")?,
        rejection_reason: row.get("rejection_reason")?,
    })
}

/// Canonical subject (slugs resolved to ids) and its current tier
fn resolve_subject(
    conn: &Connection,
    subject: &VerificationSubject,
) -> Result<(VerificationSubject, VerificationTier)> {
    match subject {
        VerificationSubject::Practitioner(key) => {
            let p = find_practitioner(conn, key)?;
            Ok((VerificationSubject::Practitioner(p.id), p.verification_tier))
        }
        VerificationSubject::Clinic(key) => {
            let c = find_clinic(conn, key)?;
            Ok((VerificationSubject::Clinic(c.id), c.verification_tier))
        }
    }
}

fn method_applies(subject: &VerificationSubject, method: VerificationMethod) -> bool {
    match subject {
        VerificationSubject::Practitioner(_) => method != VerificationMethod::BusinessRegistry,
        VerificationSubject::Clinic(_) => matches!(
            method,
            VerificationMethod::BusinessRegistry
                | VerificationMethod::ProfessionalEmail
                | VerificationMethod::Manual
        ),
    }
}

fn open_request_count(conn: &Connection, subject: &VerificationSubject) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM verifications
         WHERE subject_kind = ?1 AND subject_id = ?2 AND status IN ('pending', 'under_review')",
        params![subject.kind(), subject.id()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn submit_verification(
    conn: &Connection,
    subject: &VerificationSubject,
    method: VerificationMethod,
    input: VerificationInput,
    now: DateTime<Utc>,
) -> Result<VerificationRequest> {
    let (subject, current_tier) = resolve_subject(conn, subject)?;

    if !method_applies(&subject, method) {
        return Err(DirectoryError::invalid(
            "method",
            &format!("{} verification is not available for a {}", method, subject.kind()),
        ));
    }

    let (evidence, target_tier) = input.validate(method)?;

    if target_tier <= current_tier {
        return Err(DirectoryError::Conflict(format!(
            "{} {} is already {}",
            subject.kind(),
            subject.id(),
            current_tier
        )));
    }

    if open_request_count(conn, &subject)? > 0 {
        return Err(DirectoryError::Conflict(format!(
            "{} {} already has an open verification request",
            subject.kind(),
            subject.id()
        )));
    }

    let request = VerificationRequest::new(subject, method, evidence, target_tier, now);

    conn.execute(
        "INSERT INTO verifications (
            id, subject_kind, subject_id, method, status, evidence, target_tier, submitted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            request.id,
            request.subject.kind(),
            request.subject.id(),
            request.method.as_str(),
            request.status.as_str(),
            serde_json::to_string(&request.evidence)?,
            request.target_tier.as_str(),
            request.submitted_at.to_rfc3339(),
        ],
    )?;

    record_event(
        conn,
        "verification_submitted",
        request.subject.kind(),
        request.subject.id(),
        serde_json::json!({
            "request_id": request.id,
            "method": request.method,
            "target_tier": request.target_tier,
        }),
        request.subject.id(),
        now,
    )?;

    info!(
        subject = request.subject.id(),
        method = %request.method,
        target = %request.target_tier,
        "verification submitted"
    );
    Ok(request)
}

pub fn get_verification(conn: &Connection, id: &str) -> Result<Option<VerificationRequest>> {
    let sql = format!("SELECT {} FROM verifications WHERE id = ?1", VERIFICATION_COLUMNS);
    Ok(conn.query_row(&sql, [id], verification_from_row).optional()?)
}

fn load(conn: &Connection, id: &str) -> Result<VerificationRequest> {
    get_verification(conn, id)?.ok_or_else(|| DirectoryError::not_found("verification", id))
}

fn save_decision_state(conn: &Connection, request: &VerificationRequest) -> Result<()> {
    conn.execute(
        "UPDATE verifications
         SET status = ?1, reviewed_at = ?2, reviewed_by = ?3, review_notes = ?4,
             rejection_reason = ?5
         WHERE id = ?6",
        params![
            request.status.as_str(),
            request.reviewed_at.map(|t| t.to_rfc3339()),
            request.reviewed_by,
            request.review_notes,
            request.rejection_reason,
            request.id,
        ],
    )?;
    Ok(())
}

/// pending → under_review
pub fn start_review(
    conn: &Connection,
    id: &str,
    reviewer: &str,
    now: DateTime<Utc>,
) -> Result<VerificationRequest> {
    let mut request = load(conn, id)?;
    request.start_review(reviewer, now)?;
    save_decision_state(conn, &request)?;

    record_event(
        conn,
        "verification_review_started",
        request.subject.kind(),
        request.subject.id(),
        serde_json::json!({ "request_id": request.id }),
        reviewer,
        now,
    )?;

    Ok(request)
}

/// Approve or reject. Approval lifts the subject's tier in the same transaction.
pub fn decide_verification(
    conn: &mut Connection,
    id: &str,
    decision: Decision,
    reviewer: &str,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<VerificationRequest> {
    let tx = conn.transaction()?;

    let mut request = load(&tx, id)?;
    request.decide(decision, reviewer, notes, now)?;
    save_decision_state(&tx, &request)?;

    let event_type = match decision {
        Decision::Approve => "verification_approved",
        Decision::Reject => "verification_rejected",
    };
    record_event(
        &tx,
        event_type,
        request.subject.kind(),
        request.subject.id(),
        serde_json::json!({
            "request_id": request.id,
            "method": request.method,
            "notes": request.review_notes,
        }),
        reviewer,
        now,
    )?;

    if decision == Decision::Approve {
        let (_, current) = resolve_subject(&tx, &request.subject)?;
        let granted = request.granted_tier(current);
        let registry_number = request.evidence.registry_number.as_deref();

        match &request.subject {
            VerificationSubject::Practitioner(pid) => {
                set_practitioner_tier(&tx, pid, granted, registry_number, now)?
            }
            VerificationSubject::Clinic(cid) => {
                set_clinic_tier(&tx, cid, granted, registry_number, now)?
            }
        }

        if granted != current {
            record_event(
                &tx,
                "tier_changed",
                request.subject.kind(),
                request.subject.id(),
                serde_json::json!({ "from": current, "to": granted, "request_id": request.id }),
                reviewer,
                now,
            )?;
            info!(subject = request.subject.id(), from = %current, to = %granted, "tier raised");
        }
    }

    tx.commit()?;
    info!(request = %request.id, status = %request.status, "verification decided");
    Ok(request)
}

/// All requests for one subject, newest first
pub fn list_verifications(
    conn: &Connection,
    subject: &VerificationSubject,
) -> Result<Vec<VerificationRequest>> {
    let (subject, _) = resolve_subject(conn, subject)?;

    let sql = format!(
        "SELECT {} FROM verifications
         WHERE subject_kind = ?1 AND subject_id = ?2
         ORDER BY submitted_at DESC, rowid DESC",
        VERIFICATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let requests = stmt
        .query_map(params![subject.kind(), subject.id()], verification_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(requests)
}

/// Moderation queue: pending and under-review requests, oldest first
pub fn list_open_verifications(conn: &Connection) -> Result<Vec<VerificationRequest>> {
    let sql = format!(
        "SELECT {} FROM verifications
         WHERE status IN (?1, ?2)
         ORDER BY submitted_at, rowid",
        VERIFICATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let requests = stmt
        .query_map(
            params![
                VerificationStatus::Pending.as_str(),
                VerificationStatus::UnderReview.as_str()
            ],
            verification_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(requests)
}
