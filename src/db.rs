use crate::entities::clinic::Clinic;
use crate::entities::practitioner::{slugify, Practitioner};
use crate::entities::tags::{
    parse_tag_list, Availability, ClinicTreatmentType, CoverageType, InsuranceType, Modality,
    PractitionerRole, ServiceType, Specialty, UnknownTag, VerificationTier,
};
use crate::error::{DirectoryError, Result};
use crate::validation::{is_valid_email, ValidationError};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Separator for tag lists in CSV cells ("mdma|ketamine")
pub const CSV_LIST_SEPARATOR: char = '|';

/// Event for audit trail: every state change is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Directory profiles (tag sets are JSON arrays of storage values)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS practitioners (
            id TEXT PRIMARY KEY,
            slug TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            bio TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL,
            state TEXT NOT NULL,
            country TEXT NOT NULL,
            role TEXT NOT NULL,
            license_type TEXT,
            years_experience INTEGER,
            registry_number TEXT,
            verification_tier TEXT NOT NULL DEFAULT 'listed',
            availability TEXT NOT NULL DEFAULT 'accepting',
            modalities TEXT NOT NULL DEFAULT '[]',
            specialties TEXT NOT NULL DEFAULT '[]',
            service_types TEXT NOT NULL DEFAULT '[]',
            coverage TEXT NOT NULL DEFAULT '[]',
            looking_to_collaborate INTEGER NOT NULL DEFAULT 0,
            collaboration_roles TEXT NOT NULL DEFAULT '[]',
            website TEXT,
            booking_url TEXT,
            languages TEXT NOT NULL DEFAULT '[]',
            clinic_id TEXT,
            is_published INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS clinics (
            id TEXT PRIMARY KEY,
            slug TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL,
            state TEXT NOT NULL,
            postcode TEXT NOT NULL,
            country TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            website TEXT,
            booking_url TEXT,
            modalities TEXT NOT NULL DEFAULT '[]',
            treatment_types TEXT NOT NULL DEFAULT '[]',
            insurance_accepted TEXT NOT NULL DEFAULT '[]',
            bulk_billing_available INTEGER NOT NULL DEFAULT 0,
            verification_tier TEXT NOT NULL DEFAULT 'listed',
            abn_number TEXT,
            is_published INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Reviews, tokens and cached stats
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS review_tokens (
            id TEXT PRIMARY KEY,
            practitioner_id TEXT NOT NULL REFERENCES practitioners(id),
            token TEXT UNIQUE NOT NULL,
            client_email TEXT,
            is_used INTEGER NOT NULL DEFAULT 0,
            used_at TEXT,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reviews (
            id TEXT PRIMARY KEY,
            practitioner_id TEXT NOT NULL REFERENCES practitioners(id),
            rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
            outcome_rating TEXT NOT NULL,
            treatment_type TEXT NOT NULL,
            condition_treated TEXT NOT NULL,
            review_text TEXT,
            would_recommend INTEGER NOT NULL,
            treatment_month INTEGER,
            treatment_year INTEGER,
            token_id TEXT UNIQUE REFERENCES review_tokens(id),
            is_verified INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            moderated_at TEXT,
            moderated_by TEXT,
            moderation_notes TEXT,
            practitioner_response TEXT,
            response_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS review_stats (
            practitioner_id TEXT PRIMARY KEY REFERENCES practitioners(id),
            stats TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Verification requests
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS verifications (
            id TEXT PRIMARY KEY,
            subject_kind TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            method TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            evidence TEXT NOT NULL,
            target_tier TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            reviewed_at TEXT,
            reviewed_by TEXT,
            review_notes TEXT,
            rejection_reason TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS waitlist (
            email TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_practitioners_published ON practitioners(is_published)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_clinics_published ON clinics(is_published)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reviews_practitioner
         ON reviews(practitioner_id, status, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tokens_practitioner
         ON review_tokens(practitioner_id, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_verifications_subject
         ON verifications(subject_kind, subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

pub(crate) fn record_event(
    conn: &Connection,
    event_type: &str,
    entity_type: &str,
    entity_id: &str,
    data: serde_json::Value,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    insert_event(conn, &Event::new(event_type, entity_type, entity_id, data, actor, now))
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok(Event {
                event_id: row.get("event_id")?,
                timestamp: get_time(row, "timestamp")?,
                event_type: row.get("event_type")?,
                entity_type: row.get("entity_type")?,
                entity_id: row.get("entity_id")?,
                data: get_json(row, "data")?,
                actor: row.get("actor")?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// ROW HELPERS
// ============================================================================

pub(crate) fn conversion_error<E>(row: &Row, column: &str, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let index = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

/// Enum column stored as its storage value
pub(crate) fn get_tag<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = UnknownTag>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e| conversion_error(row, column, e))
}

/// JSON text column
pub(crate) fn get_json<T: DeserializeOwned>(row: &Row, column: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(row, column, e))
}

/// RFC 3339 timestamp column
pub(crate) fn get_time(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(row, column, e))
}

pub(crate) fn get_opt_time(row: &Row, column: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(row, column, e))
    })
    .transpose()
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// PRACTITIONERS
// ============================================================================

/// Insert a new profile. Returns false when the slug is already taken.
///
/// New profiles always enter the directory at the `listed` tier; only an
/// approved verification request raises it.
pub fn insert_practitioner(conn: &Connection, p: &Practitioner) -> Result<bool> {
    if p.verification_tier != VerificationTier::Listed {
        debug!(slug = %p.slug, tier = %p.verification_tier, "ignoring tier on insert");
    }

    let result = conn.execute(
        "INSERT INTO practitioners (
            id, slug, name, bio, city, state, country, role, license_type,
            years_experience, registry_number, verification_tier, availability,
            modalities, specialties, service_types, coverage,
            looking_to_collaborate, collaboration_roles, website, booking_url,
            languages, clinic_id, is_published, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                  ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
        params![
            p.id,
            p.slug,
            p.name,
            p.bio,
            p.city,
            p.state,
            p.country,
            p.role.as_str(),
            p.license_type,
            p.years_experience,
            p.registry_number,
            VerificationTier::Listed.as_str(),
            p.availability.as_str(),
            serde_json::to_string(&p.modalities)?,
            serde_json::to_string(&p.specialties)?,
            serde_json::to_string(&p.service_types)?,
            serde_json::to_string(&p.coverage)?,
            p.looking_to_collaborate,
            serde_json::to_string(&p.collaboration_roles)?,
            p.website,
            p.booking_url,
            serde_json::to_string(&p.languages)?,
            p.clinic_id,
            p.is_published,
            p.created_at.to_rfc3339(),
            p.updated_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => {
            record_event(
                conn,
                "practitioner_added",
                "practitioner",
                &p.id,
                serde_json::json!({ "slug": p.slug, "role": p.role }),
                "directory",
                p.created_at,
            )?;
            Ok(true)
        }
        Err(e) if is_constraint_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

const PRACTITIONER_COLUMNS: &str = "id, slug, name, bio, city, state, country, role, license_type,
    years_experience, registry_number, verification_tier, availability, modalities,
    specialties, service_types, coverage, looking_to_collaborate, collaboration_roles,
    website, booking_url, languages, clinic_id, is_published, created_at, updated_at";

fn practitioner_from_row(row: &Row) -> rusqlite::Result<Practitioner> {
    Ok(Practitioner {
        id: row.get("id")?,
        slug: row.get("slug")?,
        name: row.get("name")?,
        bio: row.get("bio")?,
        city: row.get("city")?,
        state: row.get("state")?,
        country: row.get("country")?,
        role: get_tag(row, "role")?,
        license_type: row.get("license_type")?,
        years_experience: row.get("years_experience")?,
        registry_number: row.get("registry_number")?,
        verification_tier: get_tag(row, "verification_tier")?,
        availability: get_tag(row, "availability")?,
        modalities: get_json(row, "modalities")?,
        specialties: get_json(row, "specialties")?,
        service_types: get_json(row, "service_types")?,
        coverage: get_json(row, "coverage")?,
        looking_to_collaborate: row.get("looking_to_collaborate")?,
        collaboration_roles: get_json(row, "collaboration_roles")?,
        website: row.get("website")?,
        booking_url: row.get("booking_url")?,
        languages: get_json(row, "languages")?,
        clinic_id: row.get("clinic_id")?,
        is_published: row.get("is_published")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

pub fn get_practitioner(conn: &Connection, id: &str) -> Result<Option<Practitioner>> {
    let sql = format!("SELECT {} FROM practitioners WHERE id = ?1", PRACTITIONER_COLUMNS);
    Ok(conn.query_row(&sql, [id], practitioner_from_row).optional()?)
}

pub fn get_practitioner_by_slug(conn: &Connection, slug: &str) -> Result<Option<Practitioner>> {
    let sql = format!("SELECT {} FROM practitioners WHERE slug = ?1", PRACTITIONER_COLUMNS);
    Ok(conn.query_row(&sql, [slug], practitioner_from_row).optional()?)
}

/// Accepts either the UUID or the slug
pub fn find_practitioner(conn: &Connection, id_or_slug: &str) -> Result<Practitioner> {
    match get_practitioner(conn, id_or_slug)? {
        Some(p) => Ok(p),
        None => get_practitioner_by_slug(conn, id_or_slug)?
            .ok_or_else(|| DirectoryError::not_found("practitioner", id_or_slug)),
    }
}

/// Everything search runs over
pub fn list_published_practitioners(conn: &Connection) -> Result<Vec<Practitioner>> {
    let sql = format!(
        "SELECT {} FROM practitioners WHERE is_published = 1 ORDER BY name",
        PRACTITIONER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let practitioners = stmt
        .query_map([], practitioner_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(practitioners)
}

pub fn publish_practitioner(conn: &Connection, slug: &str, now: DateTime<Utc>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE practitioners SET is_published = 1, updated_at = ?1 WHERE slug = ?2",
        params![now.to_rfc3339(), slug],
    )?;
    if changed == 0 {
        return Err(DirectoryError::not_found("practitioner", slug));
    }
    info!(slug, "practitioner published");
    Ok(())
}

/// Only called when a verification request is approved
pub(crate) fn set_practitioner_tier(
    conn: &Connection,
    id: &str,
    tier: VerificationTier,
    registry_number: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE practitioners
         SET verification_tier = ?1,
             registry_number = COALESCE(?2, registry_number),
             updated_at = ?3
         WHERE id = ?4",
        params![tier.as_str(), registry_number, now.to_rfc3339(), id],
    )?;
    Ok(())
}

// ============================================================================
// CLINICS
// ============================================================================

/// Same rules as `insert_practitioner`
pub fn insert_clinic(conn: &Connection, c: &Clinic) -> Result<bool> {
    let result = conn.execute(
        "INSERT INTO clinics (
            id, slug, name, description, address, city, state, postcode, country,
            phone, email, website, booking_url, modalities, treatment_types,
            insurance_accepted, bulk_billing_available, verification_tier, abn_number,
            is_published, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                  ?17, ?18, ?19, ?20, ?21, ?22)",
        params![
            c.id,
            c.slug,
            c.name,
            c.description,
            c.address,
            c.city,
            c.state,
            c.postcode,
            c.country,
            c.phone,
            c.email,
            c.website,
            c.booking_url,
            serde_json::to_string(&c.modalities)?,
            serde_json::to_string(&c.treatment_types)?,
            serde_json::to_string(&c.insurance_accepted)?,
            c.bulk_billing_available,
            VerificationTier::Listed.as_str(),
            c.abn_number,
            c.is_published,
            c.created_at.to_rfc3339(),
            c.updated_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => {
            record_event(
                conn,
                "clinic_added",
                "clinic",
                &c.id,
                serde_json::json!({ "slug": c.slug, "state": c.state }),
                "directory",
                c.created_at,
            )?;
            Ok(true)
        }
        Err(e) if is_constraint_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

const CLINIC_COLUMNS: &str = "id, slug, name, description, address, city, state, postcode,
    country, phone, email, website, booking_url, modalities, treatment_types,
    insurance_accepted, bulk_billing_available, verification_tier, abn_number,
    is_published, created_at, updated_at";

fn clinic_from_row(row: &Row) -> rusqlite::Result<Clinic> {
    Ok(Clinic {
        id: row.get("id")?,
        slug: row.get("slug")?,
        name: row.get("name")?,
        description: row.get("description")?,
        address: row.get("address")?,
        city: row.get("city")?,
        state: row.get("state")?,
        postcode: row.get("postcode")?,
        country: row.get("country")?,
        phone: row.get("phone")?,
        email: row.get("email")?,
        website: row.get("website")?,
        booking_url: row.get("booking_url")?,
        modalities: get_json(row, "modalities")?,
        treatment_types: get_json(row, "treatment_types")?,
        insurance_accepted: get_json(row, "insurance_accepted")?,
        bulk_billing_available: row.get("bulk_billing_available")?,
        verification_tier: get_tag(row, "verification_tier")?,
        abn_number: row.get("abn_number")?,
        is_published: row.get("is_published")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

pub fn get_clinic(conn: &Connection, id: &str) -> Result<Option<Clinic>> {
    let sql = format!("SELECT {} FROM clinics WHERE id = ?1", CLINIC_COLUMNS);
    Ok(conn.query_row(&sql, [id], clinic_from_row).optional()?)
}

pub fn get_clinic_by_slug(conn: &Connection, slug: &str) -> Result<Option<Clinic>> {
    let sql = format!("SELECT {} FROM clinics WHERE slug = ?1", CLINIC_COLUMNS);
    Ok(conn.query_row(&sql, [slug], clinic_from_row).optional()?)
}

pub fn find_clinic(conn: &Connection, id_or_slug: &str) -> Result<Clinic> {
    match get_clinic(conn, id_or_slug)? {
        Some(c) => Ok(c),
        None => get_clinic_by_slug(conn, id_or_slug)?
            .ok_or_else(|| DirectoryError::not_found("clinic", id_or_slug)),
    }
}

pub fn list_published_clinics(conn: &Connection) -> Result<Vec<Clinic>> {
    let sql = format!(
        "SELECT {} FROM clinics WHERE is_published = 1 ORDER BY name",
        CLINIC_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let clinics = stmt
        .query_map([], clinic_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(clinics)
}

pub fn publish_clinic(conn: &Connection, slug: &str, now: DateTime<Utc>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE clinics SET is_published = 1, updated_at = ?1 WHERE slug = ?2",
        params![now.to_rfc3339(), slug],
    )?;
    if changed == 0 {
        return Err(DirectoryError::not_found("clinic", slug));
    }
    info!(slug, "clinic published");
    Ok(())
}

pub(crate) fn set_clinic_tier(
    conn: &Connection,
    id: &str,
    tier: VerificationTier,
    abn_number: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE clinics
         SET verification_tier = ?1,
             abn_number = COALESCE(?2, abn_number),
             updated_at = ?3
         WHERE id = ?4",
        params![tier.as_str(), abn_number, now.to_rfc3339(), id],
    )?;
    Ok(())
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One practitioner per CSV line; tag cells are `|`-separated
#[derive(Debug, Deserialize)]
struct PractitionerRow {
    name: String,
    #[serde(default)]
    slug: Option<String>,
    role: String,
    city: String,
    state: String,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    license_type: Option<String>,
    #[serde(default)]
    years_experience: Option<u32>,
    #[serde(default)]
    availability: Option<String>,
    #[serde(default)]
    modalities: Option<String>,
    #[serde(default)]
    specialties: Option<String>,
    #[serde(default)]
    service_types: Option<String>,
    #[serde(default)]
    coverage: Option<String>,
    #[serde(default)]
    looking_to_collaborate: Option<bool>,
    #[serde(default)]
    collaboration_roles: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    booking_url: Option<String>,
    #[serde(default)]
    languages: Option<String>,
    #[serde(default)]
    published: Option<bool>,
}

fn tag_cell<T>(cell: Option<&str>, field: &str, errors: &mut Vec<ValidationError>) -> Vec<T>
where
    T: std::str::FromStr<Err = UnknownTag> + PartialEq,
{
    match parse_tag_list(cell.unwrap_or(""), CSV_LIST_SEPARATOR) {
        Ok(tags) => tags,
        Err(e) => {
            errors.push(ValidationError::new(field, &e.to_string()));
            Vec::new()
        }
    }
}

impl PractitionerRow {
    fn into_practitioner(self) -> std::result::Result<Practitioner, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let role = match self.role.parse::<PractitionerRole>() {
            Ok(role) => role,
            Err(e) => {
                errors.push(ValidationError::new("role", &e.to_string()));
                PractitionerRole::Therapist
            }
        };

        let mut p = Practitioner::new(
            self.name.trim(),
            role,
            self.city.trim(),
            self.state.trim(),
            self.country.as_deref().unwrap_or("AU").trim(),
        );

        if let Some(slug) = self.slug.as_deref().map(slugify).filter(|s| !s.is_empty()) {
            p.slug = slug;
        }
        if p.slug.is_empty() {
            errors.push(ValidationError::new("name", "cannot derive a slug"));
        }

        if let Some(raw) = self.availability.as_deref() {
            match raw.parse::<Availability>() {
                Ok(a) => p.availability = a,
                Err(e) => errors.push(ValidationError::new("availability", &e.to_string())),
            }
        }

        p.modalities = tag_cell::<Modality>(self.modalities.as_deref(), "modalities", &mut errors);
        p.specialties =
            tag_cell::<Specialty>(self.specialties.as_deref(), "specialties", &mut errors);
        p.service_types =
            tag_cell::<ServiceType>(self.service_types.as_deref(), "service_types", &mut errors);
        p.coverage = tag_cell::<CoverageType>(self.coverage.as_deref(), "coverage", &mut errors);
        p.collaboration_roles = tag_cell::<PractitionerRole>(
            self.collaboration_roles.as_deref(),
            "collaboration_roles",
            &mut errors,
        );

        p.bio = self.bio.unwrap_or_default();
        p.license_type = self.license_type;
        p.years_experience = self.years_experience;
        p.looking_to_collaborate = self.looking_to_collaborate.unwrap_or(false);
        p.website = self.website;
        p.booking_url = self.booking_url;
        p.languages = self
            .languages
            .unwrap_or_default()
            .split(CSV_LIST_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        p.is_published = self.published.unwrap_or(false);

        if errors.is_empty() {
            Ok(p)
        } else {
            Err(errors)
        }
    }
}

/// One clinic per CSV line; tag cells are `|`-separated
#[derive(Debug, Deserialize)]
struct ClinicRow {
    name: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    address: Option<String>,
    city: String,
    state: String,
    postcode: String,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    booking_url: Option<String>,
    #[serde(default)]
    modalities: Option<String>,
    #[serde(default)]
    treatment_types: Option<String>,
    #[serde(default)]
    insurance_accepted: Option<String>,
    #[serde(default)]
    bulk_billing_available: Option<bool>,
    #[serde(default)]
    published: Option<bool>,
}

impl ClinicRow {
    fn into_clinic(self) -> std::result::Result<Clinic, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut c = Clinic::new(
            self.name.trim(),
            self.city.trim(),
            self.state.trim(),
            self.postcode.trim(),
        );

        if let Some(slug) = self.slug.as_deref().map(slugify).filter(|s| !s.is_empty()) {
            c.slug = slug;
        }
        if c.slug.is_empty() {
            errors.push(ValidationError::new("name", "cannot derive a slug"));
        }
        if let Some(country) = self.country.filter(|s| !s.trim().is_empty()) {
            c.country = country.trim().to_string();
        }

        c.modalities = tag_cell::<Modality>(self.modalities.as_deref(), "modalities", &mut errors);
        c.treatment_types = tag_cell::<ClinicTreatmentType>(
            self.treatment_types.as_deref(),
            "treatment_types",
            &mut errors,
        );
        c.insurance_accepted = tag_cell::<InsuranceType>(
            self.insurance_accepted.as_deref(),
            "insurance_accepted",
            &mut errors,
        );

        c.description = self.description.unwrap_or_default();
        c.address = self.address.unwrap_or_default();
        c.phone = self.phone;
        c.email = self.email;
        c.website = self.website;
        c.booking_url = self.booking_url;
        c.bulk_billing_available = self.bulk_billing_available.unwrap_or(false);
        c.is_published = self.published.unwrap_or(false);

        if errors.is_empty() {
            Ok(c)
        } else {
            Err(errors)
        }
    }
}

/// Prefix every row error with its CSV line so the whole file can be fixed in one go
fn with_line(line: usize, errors: Vec<ValidationError>) -> Vec<ValidationError> {
    errors
        .into_iter()
        .map(|e| ValidationError {
            field: format!("line {}: {}", line, e.field),
            message: e.message,
        })
        .collect()
}

pub fn load_practitioners_csv(csv_path: &Path) -> Result<Vec<Practitioner>> {
    let mut rdr = csv::Reader::from_path(csv_path)?;
    let mut practitioners = Vec::new();
    let mut errors = Vec::new();

    for (i, result) in rdr.deserialize::<PractitionerRow>().enumerate() {
        // header is line 1
        match result?.into_practitioner() {
            Ok(p) => practitioners.push(p),
            Err(row_errors) => errors.extend(with_line(i + 2, row_errors)),
        }
    }

    if !errors.is_empty() {
        warn!(count = errors.len(), path = %csv_path.display(), "rejected practitioner CSV");
        return Err(DirectoryError::Validation(errors));
    }

    Ok(practitioners)
}

pub fn load_clinics_csv(csv_path: &Path) -> Result<Vec<Clinic>> {
    let mut rdr = csv::Reader::from_path(csv_path)?;
    let mut clinics = Vec::new();
    let mut errors = Vec::new();

    for (i, result) in rdr.deserialize::<ClinicRow>().enumerate() {
        match result?.into_clinic() {
            Ok(c) => clinics.push(c),
            Err(row_errors) => errors.extend(with_line(i + 2, row_errors)),
        }
    }

    if !errors.is_empty() {
        warn!(count = errors.len(), path = %csv_path.display(), "rejected clinic CSV");
        return Err(DirectoryError::Validation(errors));
    }

    Ok(clinics)
}

/// Insert all profiles in one transaction, skipping slugs already present
pub fn insert_practitioners(
    conn: &mut Connection,
    practitioners: &[Practitioner],
) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0;
    let mut duplicates = 0;

    for p in practitioners {
        if insert_practitioner(&tx, p)? {
            inserted += 1;
        } else {
            duplicates += 1;
        }
    }

    tx.commit()?;
    info!(inserted, duplicates, "practitioner import finished");
    Ok(inserted)
}

pub fn insert_clinics(conn: &mut Connection, clinics: &[Clinic]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0;
    let mut duplicates = 0;

    for c in clinics {
        if insert_clinic(&tx, c)? {
            inserted += 1;
        } else {
            duplicates += 1;
        }
    }

    tx.commit()?;
    info!(inserted, duplicates, "clinic import finished");
    Ok(inserted)
}

// ============================================================================
// WAITLIST
// ============================================================================

/// Returns true when the address was newly added
pub fn join_waitlist(conn: &Connection, email: &str, now: DateTime<Utc>) -> Result<bool> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(DirectoryError::invalid("email", "email is required"));
    }
    if !is_valid_email(&email) {
        return Err(DirectoryError::invalid("email", "invalid email address"));
    }

    let added = conn.execute(
        "INSERT OR IGNORE INTO waitlist (email, created_at) VALUES (?1, ?2)",
        params![email, now.to_rfc3339()],
    )? == 1;

    if added {
        info!(total = waitlist_count(conn)?, "waitlist signup");
    }
    Ok(added)
}

pub fn waitlist_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM waitlist", [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn sample_practitioner() -> Practitioner {
        let mut p = Practitioner::new(
            "Dr. Sarah Martinez",
            PractitionerRole::Psychiatrist,
            "San Francisco",
            "CA",
            "US",
        );
        p.modalities = vec![Modality::Mdma, Modality::FiveMeoDmt];
        p.specialties = vec![Specialty::Trauma];
        p.languages = vec!["English".to_string(), "Spanish".to_string()];
        p.years_experience = Some(15);
        p.is_published = true;
        p
    }

    #[test]
    fn test_practitioner_round_trip() {
        let conn = test_db();
        let p = sample_practitioner();

        assert!(insert_practitioner(&conn, &p).unwrap());

        let loaded = get_practitioner(&conn, &p.id).unwrap().unwrap();
        assert_eq!(loaded.slug, "dr-sarah-martinez");
        assert_eq!(loaded.modalities, vec![Modality::Mdma, Modality::FiveMeoDmt]);
        assert_eq!(loaded.languages.len(), 2);
        assert_eq!(loaded.years_experience, Some(15));
        assert!(loaded.is_published);

        let by_slug = find_practitioner(&conn, "dr-sarah-martinez").unwrap();
        assert_eq!(by_slug.id, p.id);
    }

    #[test]
    fn test_insert_forces_listed_tier() {
        let conn = test_db();
        let mut p = sample_practitioner();
        p.verification_tier = VerificationTier::Certified;

        insert_practitioner(&conn, &p).unwrap();

        let loaded = get_practitioner(&conn, &p.id).unwrap().unwrap();
        assert_eq!(loaded.verification_tier, VerificationTier::Listed);
    }

    #[test]
    fn test_duplicate_slug_skipped() {
        let mut conn = test_db();
        let first = sample_practitioner();
        let second = sample_practitioner(); // new id, same slug

        let inserted = insert_practitioners(&mut conn, &[first, second]).unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(list_published_practitioners(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_only_published_are_listed() {
        let conn = test_db();
        let mut hidden = Practitioner::new(
            "Hidden Person",
            PractitionerRole::Nurse,
            "Perth",
            "WA",
            "AU",
        );
        hidden.is_published = false;
        insert_practitioner(&conn, &hidden).unwrap();
        insert_practitioner(&conn, &sample_practitioner()).unwrap();

        assert_eq!(list_published_practitioners(&conn).unwrap().len(), 1);

        publish_practitioner(&conn, "hidden-person", Utc::now()).unwrap();
        assert_eq!(list_published_practitioners(&conn).unwrap().len(), 2);

        assert!(matches!(
            publish_practitioner(&conn, "nobody", Utc::now()),
            Err(DirectoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_clinic_round_trip_and_tier_update() {
        let conn = test_db();
        let mut clinic = Clinic::new("Mind Medicine Clinic", "Melbourne", "VIC", "3000");
        clinic.insurance_accepted = vec![InsuranceType::Dva];
        clinic.bulk_billing_available = true;
        clinic.is_published = true;
        insert_clinic(&conn, &clinic).unwrap();

        set_clinic_tier(
            &conn,
            &clinic.id,
            VerificationTier::Verified,
            Some("51824753556"),
            Utc::now(),
        )
        .unwrap();

        let loaded = find_clinic(&conn, "mind-medicine-clinic").unwrap();
        assert_eq!(loaded.verification_tier, VerificationTier::Verified);
        assert_eq!(loaded.abn_number.as_deref(), Some("51824753556"));
        assert!(loaded.bulk_billing_available);
        assert_eq!(list_published_clinics(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_load_practitioners_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name,role,city,state,modalities,specialties,looking_to_collaborate,languages,published"
        )
        .unwrap();
        writeln!(
            file,
            "\"Michael Chen, LCSW\",therapist,Oakland,CA,ketamine|psilocybin,depression,\
             true,English,true"
        )
        .unwrap();
        writeln!(file, "Amara Okafor,integration_coach,Portland,OR,,,,,").unwrap();
        file.flush().unwrap();

        let practitioners = load_practitioners_csv(file.path()).unwrap();
        assert_eq!(practitioners.len(), 2);

        let chen = &practitioners[0];
        assert_eq!(chen.slug, "michael-chen-lcsw");
        assert_eq!(chen.modalities, vec![Modality::Ketamine, Modality::Psilocybin]);
        assert!(chen.looking_to_collaborate);
        assert!(chen.is_published);
        assert_eq!(chen.country, "AU");

        let okafor = &practitioners[1];
        assert!(okafor.modalities.is_empty());
        assert!(!okafor.is_published);
    }

    #[test]
    fn test_load_practitioners_csv_reports_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,role,city,state,modalities").unwrap();
        writeln!(file, "Good Name,therapist,Oakland,CA,ketamine").unwrap();
        writeln!(file, "Bad Name,shaman,Oakland,CA,peyote").unwrap();
        file.flush().unwrap();

        match load_practitioners_csv(file.path()) {
            Err(DirectoryError::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "line 3: role");
                assert_eq!(errors[1].field, "line 3: modalities");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_clinics_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name,city,state,postcode,treatment_types,insurance_accepted,bulk_billing_available"
        )
        .unwrap();
        writeln!(file, "Harbour Healing,Sydney,NSW,2000,group|retreat,medicare,true").unwrap();
        file.flush().unwrap();

        let clinics = load_clinics_csv(file.path()).unwrap();
        assert_eq!(clinics.len(), 1);
        assert_eq!(
            clinics[0].treatment_types,
            vec![ClinicTreatmentType::Group, ClinicTreatmentType::Retreat]
        );
        assert!(clinics[0].bulk_billing_available);
    }

    #[test]
    fn test_waitlist() {
        let conn = test_db();
        let now = Utc::now();

        assert!(join_waitlist(&conn, "Someone@Example.com", now).unwrap());
        assert!(!join_waitlist(&conn, "someone@example.com ", now).unwrap());
        assert_eq!(waitlist_count(&conn).unwrap(), 1);

        assert!(matches!(
            join_waitlist(&conn, "not-an-email", now),
            Err(DirectoryError::Validation(_))
        ));
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();

        let event = Event::new(
            "test_event",
            "practitioner",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
            at,
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "practitioner", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
        assert_eq!(events[0].data["test"], "data");
        assert_eq!(events[0].timestamp, at);
    }

    #[test]
    fn test_insert_records_event() {
        let conn = test_db();
        let p = sample_practitioner();
        insert_practitioner(&conn, &p).unwrap();

        let events = get_events_for_entity(&conn, "practitioner", &p.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "practitioner_added");
        // stamped with the profile's creation time, not the wall clock
        assert_eq!(events[0].timestamp, p.created_at);
    }
}
