//! # Enrollment Module - Joining Courses
//!
//! Three ways into a course: free self-enrollment, a completed
//! checkout reported by the payment provider, and corporate
//! assignment. All three land in the same `enrollments` table, one
//! row per learner and course, enforced by a unique index and
//! `ON CONFLICT` inserts. The checkout callback is idempotent because
//! payment providers retry webhooks.

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
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, Roles};
use crate::catalog::Course;
use crate::shared::errors::ApiError;
use crate::shared::schema::{courses, enrollments};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

// ============================================================================
// DATA MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = enrollments)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub source: String,
    pub progress_percent: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub assigned_by: Option<Uuid>,
    pub enrolled_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentSource {
    Free,
    Purchase,
    Assignment,
}

impl From<&str> for EnrollmentSource {
    fn from(s: &str) -> Self {
        match s {
            "purchase" => Self::Purchase,
            "assignment" => Self::Assignment,
            _ => Self::Free,
        }
    }
}

impl std::fmt::Display for EnrollmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Free => "free",
            Self::Purchase => "purchase",
            Self::Assignment => "assignment",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutCompleteRequest {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub course_category: String,
    pub instructor_name: String,
    pub source: String,
    pub progress_percent: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

fn to_response(enrollment: Enrollment, course: &Course) -> EnrollmentResponse {
    EnrollmentResponse {
        id: enrollment.id,
        course_id: enrollment.course_id,
        course_title: course.title.clone(),
        course_category: course.category.clone(),
        instructor_name: course.instructor_name.clone(),
        source: enrollment.source,
        progress_percent: enrollment.progress_percent,
        completed_at: enrollment.completed_at,
        deadline: enrollment.deadline,
        enrolled_at: enrollment.enrolled_at,
        last_accessed_at: enrollment.last_accessed_at,
    }
}

fn new_enrollment(user_id: Uuid, course_id: Uuid, source: EnrollmentSource) -> Enrollment {
    let now = Utc::now();
    Enrollment {
        id: Uuid::new_v4(),
        user_id,
        course_id,
        source: source.to_string(),
        progress_percent: 0,
        completed_at: None,
        deadline: None,
        assigned_by: None,
        enrolled_at: now,
        last_accessed_at: now,
    }
}

/// Enrollment backing a corporate assignment. Upserts so a learner who
/// already enrolled on their own picks up the deadline and assigner.
pub fn ensure_assignment_enrollment(
    conn: &mut PgConnection,
    learner_id: Uuid,
    course_id: Uuid,
    deadline: Option<DateTime<Utc>>,
    assigned_by: Uuid,
) -> Result<(), ApiError> {
    let mut row = new_enrollment(learner_id, course_id, EnrollmentSource::Assignment);
    row.deadline = deadline;
    row.assigned_by = Some(assigned_by);

    diesel::insert_into(enrollments::table)
        .values(&row)
        .on_conflict((enrollments::user_id, enrollments::course_id))
        .do_update()
        .set((
            enrollments::deadline.eq(deadline),
            enrollments::assigned_by.eq(Some(assigned_by)),
        ))
        .execute(conn)?;

    Ok(())
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct EnrollmentEngine {
    db: DbPool,
}

impl EnrollmentEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Self-enrollment, free courses only. Paid courses must go
    /// through checkout.
    pub async fn enroll_free(&self, user_id: Uuid, course_id: Uuid) -> Result<Enrollment, ApiError> {
        let mut conn = self.db.get()?;

        let course = courses::table
            .filter(courses::id.eq(course_id))
            .first::<Course>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("course"))?;

        if !course.is_published {
            return Err(ApiError::NotFound("course"));
        }

        if course.price_cents > 0 {
            return Err(ApiError::Conflict(
                "course requires purchase, complete checkout to enroll".to_string(),
            ));
        }

        let enrollment = new_enrollment(user_id, course_id, EnrollmentSource::Free);
        let inserted = diesel::insert_into(enrollments::table)
            .values(&enrollment)
            .on_conflict((enrollments::user_id, enrollments::course_id))
            .do_nothing()
            .execute(&mut conn)?;

        if inserted == 0 {
            return Err(ApiError::Conflict(
                "already enrolled in this course".to_string(),
            ));
        }

        Ok(enrollment)
    }

    /// Payment provider callback. Returns the enrollment and whether
    /// this call created it; retries of the same checkout find the
    /// existing row.
    pub async fn checkout_complete(
        &self,
        req: CheckoutCompleteRequest,
    ) -> Result<(Enrollment, bool), ApiError> {
        let mut conn = self.db.get()?;

        let course = courses::table
            .filter(courses::id.eq(req.course_id))
            .first::<Course>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("course"))?;

        if let Some(reference) = &req.payment_reference {
            log::info!(
                "checkout completed: user={} course={} reference={}",
                req.user_id,
                course.id,
                reference
            );
        }

        let enrollment = new_enrollment(req.user_id, req.course_id, EnrollmentSource::Purchase);
        let inserted = diesel::insert_into(enrollments::table)
            .values(&enrollment)
            .on_conflict((enrollments::user_id, enrollments::course_id))
            .do_nothing()
            .execute(&mut conn)?;

        if inserted == 0 {
            let existing = enrollments::table
                .filter(enrollments::user_id.eq(req.user_id))
                .filter(enrollments::course_id.eq(req.course_id))
                .first::<Enrollment>(&mut conn)?;
            return Ok((existing, false));
        }

        Ok((enrollment, true))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<EnrollmentResponse>, ApiError> {
        let mut conn = self.db.get()?;

        let rows = enrollments::table
            .filter(enrollments::user_id.eq(user_id))
            .order(enrollments::enrolled_at.desc())
            .load::<Enrollment>(&mut conn)?;

        let course_ids: Vec<Uuid> = rows.iter().map(|e| e.course_id).collect();
        let course_map: HashMap<Uuid, Course> = courses::table
            .filter(courses::id.eq_any(&course_ids))
            .load::<Course>(&mut conn)?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(rows
            .into_iter()
            .filter_map(|enrollment| {
                course_map
                    .get(&enrollment.course_id)
                    .map(|course| to_response(enrollment, course))
            })
            .collect())
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn enroll_in_course(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(course_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Enrollment>), ApiError> {
    let engine = EnrollmentEngine::new(state.conn.clone());
    let enrollment = engine.enroll_free(user.user_id, course_id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

pub async fn checkout_complete(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CheckoutCompleteRequest>,
) -> Result<(StatusCode, Json<Enrollment>), ApiError> {
    user.require_any_role(&[Roles::SERVICE, Roles::STAFF])?;
    let engine = EnrollmentEngine::new(state.conn.clone());
    let (enrollment, created) = engine.checkout_complete(req).await?;
    let code = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((code, Json(enrollment)))
}

pub async fn list_my_enrollments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<EnrollmentResponse>>, ApiError> {
    let engine = EnrollmentEngine::new(state.conn.clone());
    let enrollments = engine.list_for_user(user.user_id).await?;
    Ok(Json(enrollments))
}

// ============================================================================
// ROUTE CONFIGURATION
// ============================================================================

/// Configure enrollment routes
pub fn configure_enrollment_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courses/:id/enroll", post(enroll_in_course))
        .route("/checkout/complete", post(checkout_complete))
        .route("/enrollments", get(list_my_enrollments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrollment_source_conversion() {
        assert_eq!(EnrollmentSource::from("free"), EnrollmentSource::Free);
        assert_eq!(
            EnrollmentSource::from("purchase"),
            EnrollmentSource::Purchase
        );
        assert_eq!(
            EnrollmentSource::from("assignment"),
            EnrollmentSource::Assignment
        );
        assert_eq!(EnrollmentSource::from("unknown"), EnrollmentSource::Free);
    }

    #[test]
    fn test_enrollment_source_display() {
        assert_eq!(EnrollmentSource::Free.to_string(), "free");
        assert_eq!(EnrollmentSource::Purchase.to_string(), "purchase");
        assert_eq!(EnrollmentSource::Assignment.to_string(), "assignment");
    }

    #[test]
    fn test_new_enrollment_starts_at_zero() {
        let enrollment = new_enrollment(Uuid::new_v4(), Uuid::new_v4(), EnrollmentSource::Free);
        assert_eq!(enrollment.progress_percent, 0);
        assert!(enrollment.completed_at.is_none());
        assert!(enrollment.deadline.is_none());
        assert_eq!(enrollment.source, "free");
    }

    #[test]
    fn test_checkout_request_deserializes_without_reference() {
        let json = format!(
            r#"{{"user_id": "{}", "course_id": "{}"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let req: CheckoutCompleteRequest = serde_json::from_str(&json).unwrap();
        assert!(req.payment_reference.is_none());
    }
}
