//! # Certificates Module - Completion Credentials
//!
//! A learner who finishes every lecture of a course can claim a
//! certificate. The row snapshots the course title, instructor and
//! CPD points at issue time, so later course edits do not rewrite
//! anyone's credential. Claiming is idempotent and certificates carry
//! a public code that anyone can verify without logging in.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::catalog::Course;
use crate::shared::errors::ApiError;
use crate::shared::schema::{certificates, courses, enrollments};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

// ============================================================================
// DATA MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = certificates)]
pub struct Certificate {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub certificate_code: String,
    pub course_title: String,
    pub instructor_name: String,
    pub cpd_points: i32,
    pub issued_at: DateTime<Utc>,
}

/// Public view of a certificate, safe to return without
/// authentication. Holds the snapshot but not the holder's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedCertificate {
    pub certificate_code: String,
    pub course_title: String,
    pub instructor_name: String,
    pub cpd_points: i32,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateVerification {
    pub valid: bool,
    pub certificate: Option<VerifiedCertificate>,
}

/// Printable code stamped on each certificate, e.g.
/// `LRN-20260815-4F2A9C1B`.
pub fn generate_certificate_code() -> String {
    format!(
        "LRN-{}-{}",
        Utc::now().format("%Y%m%d"),
        &Uuid::new_v4().to_string()[..8].to_uppercase()
    )
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct CertificateEngine {
    db: DbPool,
}

impl CertificateEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Issue a certificate for a completed course, or return the one
    /// already issued. Eligibility and insert run in one transaction;
    /// two racing claims produce a single row and both callers get it.
    pub async fn claim(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<(Certificate, bool), ApiError> {
        let mut conn = self.db.get()?;

        conn.transaction::<_, ApiError, _>(|conn| {
            let completed_at = enrollments::table
                .filter(enrollments::user_id.eq(user_id))
                .filter(enrollments::course_id.eq(course_id))
                .select(enrollments::completed_at)
                .first::<Option<DateTime<Utc>>>(conn)
                .optional()?
                .ok_or(ApiError::NotFound("enrollment"))?;

            if completed_at.is_none() {
                return Err(ApiError::Conflict(
                    "course is not yet completed".to_string(),
                ));
            }

            let course = courses::table
                .filter(courses::id.eq(course_id))
                .first::<Course>(conn)
                .optional()?
                .ok_or(ApiError::NotFound("course"))?;

            let certificate = Certificate {
                id: Uuid::new_v4(),
                user_id,
                course_id,
                certificate_code: generate_certificate_code(),
                course_title: course.title,
                instructor_name: course.instructor_name,
                cpd_points: course.cpd_points,
                issued_at: Utc::now(),
            };

            let inserted = diesel::insert_into(certificates::table)
                .values(&certificate)
                .on_conflict((certificates::user_id, certificates::course_id))
                .do_nothing()
                .execute(conn)?;

            if inserted == 0 {
                let existing = certificates::table
                    .filter(certificates::user_id.eq(user_id))
                    .filter(certificates::course_id.eq(course_id))
                    .first::<Certificate>(conn)?;
                return Ok((existing, false));
            }

            log::info!(
                "certificate issued: code={} user={} course={}",
                certificate.certificate_code,
                user_id,
                course_id
            );

            Ok((certificate, true))
        })
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Certificate>, ApiError> {
        let mut conn = self.db.get()?;

        let rows = certificates::table
            .filter(certificates::user_id.eq(user_id))
            .order(certificates::issued_at.desc())
            .load::<Certificate>(&mut conn)?;

        Ok(rows)
    }

    /// Look up a certificate by its public code. Unknown codes are not
    /// an error, they verify as invalid.
    pub async fn verify(&self, code: &str) -> Result<CertificateVerification, ApiError> {
        let mut conn = self.db.get()?;

        let found = certificates::table
            .filter(certificates::certificate_code.eq(code))
            .first::<Certificate>(&mut conn)
            .optional()?;

        Ok(CertificateVerification {
            valid: found.is_some(),
            certificate: found.map(|c| VerifiedCertificate {
                certificate_code: c.certificate_code,
                course_title: c.course_title,
                instructor_name: c.instructor_name,
                cpd_points: c.cpd_points,
                issued_at: c.issued_at,
            }),
        })
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn claim_certificate(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(course_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Certificate>), ApiError> {
    let engine = CertificateEngine::new(state.conn.clone());
    let (certificate, created) = engine.claim(user.user_id, course_id).await?;
    let code = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((code, Json(certificate)))
}

pub async fn list_my_certificates(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Certificate>>, ApiError> {
    let engine = CertificateEngine::new(state.conn.clone());
    let certificates = engine.list_for_user(user.user_id).await?;
    Ok(Json(certificates))
}

pub async fn verify_certificate(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<CertificateVerification>, ApiError> {
    let engine = CertificateEngine::new(state.conn.clone());
    let verification = engine.verify(&code).await?;
    Ok(Json(verification))
}

// ============================================================================
// ROUTE CONFIGURATION
// ============================================================================

/// Configure certificate routes requiring authentication
pub fn configure_certificate_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courses/:id/certificate", post(claim_certificate))
        .route("/certificates", get(list_my_certificates))
}

/// Configure public certificate routes (no authentication)
pub fn configure_certificate_public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/certificates/verify/:code", get(verify_certificate))
}
