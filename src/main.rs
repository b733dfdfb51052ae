use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use findpat::config::{
    Command, Config, ReviewCommand, TokenCommand, VerifyCommand, WaitlistCommand,
};
use findpat::entities::token::review_url;
use findpat::entities::VerificationSubject;
use findpat::{
    db, reviews, search, verifications, ClinicFilter, PractitionerFilter, ReviewQuery,
};

fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize tracing/logging (stderr; stdout carries JSON output)
    let log_level = config.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("findpat={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(2);
    }

    let mut conn = Connection::open(&config.db)
        .with_context(|| format!("opening database {}", config.db.display()))?;
    db::setup_database(&conn).context("setting up schema")?;

    run(&config, &mut conn)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(config: &Config, conn: &mut Connection) -> Result<()> {
    let now = Utc::now();

    match config.command.clone() {
        Command::Init => {
            info!(db = %config.db.display(), "database ready (WAL mode)");
            print_json(&serde_json::json!({
                "db": config.db.display().to_string(),
                "version": findpat::VERSION,
            }))
        }

        Command::ImportPractitioners { csv } => {
            let practitioners = db::load_practitioners_csv(&csv)
                .with_context(|| format!("loading {}", csv.display()))?;
            let inserted = db::insert_practitioners(conn, &practitioners)?;
            print_json(&serde_json::json!({
                "loaded": practitioners.len(),
                "inserted": inserted,
                "duplicates": practitioners.len() - inserted,
            }))
        }

        Command::ImportClinics { csv } => {
            let clinics = db::load_clinics_csv(&csv)
                .with_context(|| format!("loading {}", csv.display()))?;
            let inserted = db::insert_clinics(conn, &clinics)?;
            print_json(&serde_json::json!({
                "loaded": clinics.len(),
                "inserted": inserted,
                "duplicates": clinics.len() - inserted,
            }))
        }

        Command::Publish { slug, clinic } => {
            if clinic {
                db::publish_clinic(conn, &slug, now)?;
            } else {
                db::publish_practitioner(conn, &slug, now)?;
            }
            print_json(&serde_json::json!({ "published": slug }))
        }

        Command::Search(args) => {
            let filter = PractitionerFilter::from(args);
            let practitioners = db::list_published_practitioners(conn)?;
            let results = search::search_practitioners(&practitioners, &filter);
            info!(total = practitioners.len(), matched = results.len(), "practitioner search");
            print_json(&results)
        }

        Command::SearchClinics(args) => {
            let filter = ClinicFilter::from(args);
            let clinics = db::list_published_clinics(conn)?;
            let results = search::search_clinics(&clinics, &filter);
            info!(total = clinics.len(), matched = results.len(), "clinic search");
            print_json(&results)
        }

        Command::Token(TokenCommand::Issue { practitioner, email }) => {
            let profile = db::find_practitioner(conn, &practitioner)?;
            let token =
                reviews::issue_review_token(conn, &profile.id, email, config.token_ttl(), now)?;
            print_json(&serde_json::json!({
                "token": token.token,
                "review_url": review_url(&config.app_url, &profile.slug, &token.token),
                "expires_at": token.expires_at,
            }))
        }

        Command::Token(TokenCommand::List { practitioner, include_used }) => {
            let tokens = reviews::list_review_tokens(conn, &practitioner, include_used, now)?;
            let listed: Vec<_> = tokens
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "token": t.token,
                        "client_email": t.client_email,
                        "state": t.state(now),
                        "days_remaining": t.days_remaining(now),
                        "created_at": t.created_at,
                    })
                })
                .collect();
            print_json(&listed)
        }

        Command::Review(ReviewCommand::Submit(args)) => {
            let practitioner = args.practitioner.clone();
            let review = reviews::submit_review(conn, &practitioner, args.into(), now)?;
            print_json(&review)
        }

        Command::Review(ReviewCommand::List { practitioner, status, limit, offset }) => {
            let query = ReviewQuery {
                practitioner_id: practitioner,
                status,
                limit,
                offset,
            };
            print_json(&reviews::list_reviews(conn, &query)?)
        }

        Command::Review(ReviewCommand::Moderate { review_id, decision, moderator, notes }) => {
            let review = reviews::moderate_review(
                conn,
                &review_id,
                decision.into(),
                &moderator,
                notes,
                now,
            )?;
            print_json(&review)
        }

        Command::Review(ReviewCommand::Respond { review_id, practitioner, text }) => {
            let review = reviews::respond_to_review(conn, &review_id, &practitioner, &text, now)?;
            print_json(&review)
        }

        Command::Stats { practitioner, refresh } => {
            let stats = if refresh {
                let profile = db::find_practitioner(conn, &practitioner)?;
                reviews::refresh_review_stats(conn, &profile.id, now)?
            } else {
                reviews::review_stats(conn, &practitioner, now)?
            };
            print_json(&serde_json::json!({
                "stats": stats,
                "outcomes": findpat::distribution(&stats.outcome_counts),
                "conditions": findpat::distribution(&stats.condition_counts),
                "treatments": findpat::distribution(&stats.treatment_counts),
            }))
        }

        Command::Verify(VerifyCommand::Submit(args)) => {
            let subject = args
                .subject
                .subject()
                .context("either --practitioner or --clinic is required")?;
            let request =
                verifications::submit_verification(conn, &subject, args.method, args.input(), now)?;
            print_json(&request)
        }

        Command::Verify(VerifyCommand::Start { request_id, reviewer }) => {
            print_json(&verifications::start_review(conn, &request_id, &reviewer, now)?)
        }

        Command::Verify(VerifyCommand::Decide { request_id, decision, reviewer, notes }) => {
            let request = verifications::decide_verification(
                conn,
                &request_id,
                decision.into(),
                &reviewer,
                notes,
                now,
            )?;
            print_json(&request)
        }

        Command::Verify(VerifyCommand::List { practitioner, clinic }) => {
            let subject = match (practitioner, clinic) {
                (Some(p), _) => Some(VerificationSubject::Practitioner(p)),
                (None, Some(c)) => Some(VerificationSubject::Clinic(c)),
                (None, None) => None,
            };
            let requests = match subject {
                Some(subject) => verifications::list_verifications(conn, &subject)?,
                None => verifications::list_open_verifications(conn)?,
            };
            print_json(&requests)
        }

        Command::Waitlist(WaitlistCommand::Join { email }) => {
            let added = db::join_waitlist(conn, &email, now)?;
            let message = if added {
                "You're on the list!"
            } else {
                "You're already on the list!"
            };
            print_json(&serde_json::json!({ "added": added, "message": message }))
        }

        Command::Waitlist(WaitlistCommand::Count) => {
            print_json(&serde_json::json!({ "count": db::waitlist_count(conn)? }))
        }

        Command::Events { entity_type, entity_id } => {
            print_json(&db::get_events_for_entity(conn, &entity_type, &entity_id)?)
        }
    }
}
