//! # Progress Module - Lecture Progress and Course Completion
//!
//! Learners report per-lecture progress; the enrollment percentage is
//! never edited anywhere else. [`sync_enrollment`] is the only code
//! path that writes `enrollments.progress_percent` and
//! `enrollments.completed_at`, and it also moves any paired corporate
//! assignment through its stored lifecycle. Catalog edits that change
//! a course's lecture total go through [`sync_course_enrollments`] so
//! every learner's percentage stays consistent with the same formula.
//!
//! Completion is sticky: once `completed_at` is set it never clears,
//! even if new lectures later drop the percentage below 100.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, put},
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::assignments::AssignmentStatus;
use crate::auth::AuthenticatedUser;
use crate::shared::errors::ApiError;
use crate::shared::schema::{course_assignments, enrollments, lecture_progress, lectures};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

// ============================================================================
// DATA MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = lecture_progress)]
pub struct LectureProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lecture_id: Uuid,
    pub course_id: Uuid,
    pub is_completed: bool,
    pub watched_seconds: i32,
    pub last_position_seconds: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LectureProgressUpdate {
    pub is_completed: Option<bool>,
    pub watched_seconds: Option<i32>,
    pub last_position_seconds: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub course_id: Uuid,
    pub total_lectures: i64,
    pub completed_lectures: i64,
    pub progress_percent: i32,
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// PROGRESS MATH
// ============================================================================

/// Percentage of completed lectures, rounded to the nearest integer.
/// A course with no lectures reports zero.
pub fn percent_complete(completed: i64, total: i64) -> i32 {
    if total <= 0 {
        return 0;
    }
    let percent = ((completed as f64) * 100.0 / (total as f64)).round() as i32;
    percent.clamp(0, 100)
}

/// Completion timestamp rule: set once at 100 percent, then keep it.
pub fn resolve_completed_at(
    percent: i32,
    existing: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if existing.is_some() {
        return existing;
    }
    if percent >= 100 {
        Some(now)
    } else {
        None
    }
}

// ============================================================================
// ENROLLMENT SYNC
// ============================================================================

/// Re-derive one enrollment from its lecture progress rows and persist
/// the result. Also advances the paired assignment, if any.
pub fn sync_enrollment(
    conn: &mut PgConnection,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<ProgressSnapshot, ApiError> {
    let total: i64 = lectures::table
        .filter(lectures::course_id.eq(course_id))
        .count()
        .get_result(conn)?;

    let completed: i64 = lecture_progress::table
        .filter(lecture_progress::user_id.eq(user_id))
        .filter(lecture_progress::course_id.eq(course_id))
        .filter(lecture_progress::is_completed.eq(true))
        .count()
        .get_result(conn)?;

    let percent = percent_complete(completed, total);

    let existing_completed_at: Option<DateTime<Utc>> = enrollments::table
        .filter(enrollments::user_id.eq(user_id))
        .filter(enrollments::course_id.eq(course_id))
        .select(enrollments::completed_at)
        .first::<Option<DateTime<Utc>>>(conn)
        .optional()?
        .ok_or(ApiError::NotFound("enrollment"))?;

    let now = Utc::now();
    let completed_at = resolve_completed_at(percent, existing_completed_at, now);

    diesel::update(
        enrollments::table
            .filter(enrollments::user_id.eq(user_id))
            .filter(enrollments::course_id.eq(course_id)),
    )
    .set((
        enrollments::progress_percent.eq(percent),
        enrollments::completed_at.eq(completed_at),
        enrollments::last_accessed_at.eq(now),
    ))
    .execute(conn)?;

    sync_assignment_status(conn, user_id, course_id, percent, completed_at)?;

    Ok(ProgressSnapshot {
        course_id,
        total_lectures: total,
        completed_lectures: completed,
        progress_percent: percent,
        completed_at,
    })
}

/// Advance the stored assignment status to match the learner's
/// percentage. Stored statuses only ever move forward; `overdue` is
/// derived at read time and never written here.
fn sync_assignment_status(
    conn: &mut PgConnection,
    user_id: Uuid,
    course_id: Uuid,
    percent: i32,
    completed_at: Option<DateTime<Utc>>,
) -> Result<(), ApiError> {
    let assignment: Option<(Uuid, String)> = course_assignments::table
        .filter(course_assignments::learner_id.eq(user_id))
        .filter(course_assignments::course_id.eq(course_id))
        .select((course_assignments::id, course_assignments::status))
        .first(conn)
        .optional()?;

    let Some((assignment_id, status)) = assignment else {
        return Ok(());
    };

    let current = AssignmentStatus::from(status.as_str());
    let next = current.advanced_by_progress(percent);
    if next == current {
        return Ok(());
    }

    if next == AssignmentStatus::Completed {
        diesel::update(course_assignments::table.filter(course_assignments::id.eq(assignment_id)))
            .set((
                course_assignments::status.eq(next.to_string()),
                course_assignments::completed_at.eq(completed_at.or(Some(Utc::now()))),
            ))
            .execute(conn)?;
    } else {
        diesel::update(course_assignments::table.filter(course_assignments::id.eq(assignment_id)))
            .set(course_assignments::status.eq(next.to_string()))
            .execute(conn)?;
    }

    Ok(())
}

/// Recompute every enrollment on a course after its lecture set
/// changed.
pub fn sync_course_enrollments(db: &DbPool, course_id: Uuid) -> Result<usize, ApiError> {
    let mut conn = db.get()?;

    let user_ids: Vec<Uuid> = enrollments::table
        .filter(enrollments::course_id.eq(course_id))
        .select(enrollments::user_id)
        .load(&mut conn)?;

    for user_id in &user_ids {
        sync_enrollment(&mut conn, *user_id, course_id)?;
    }

    Ok(user_ids.len())
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ProgressEngine {
    db: DbPool,
}

impl ProgressEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Upsert one lecture progress row, then re-derive the enrollment.
    /// Fields absent from the update keep their stored values.
    pub async fn record_lecture_progress(
        &self,
        user_id: Uuid,
        lecture_id: Uuid,
        update: LectureProgressUpdate,
    ) -> Result<ProgressSnapshot, ApiError> {
        if let Some(watched) = update.watched_seconds {
            if watched < 0 {
                return Err(ApiError::Validation(
                    "watched_seconds must not be negative".to_string(),
                ));
            }
        }
        if let Some(position) = update.last_position_seconds {
            if position < 0 {
                return Err(ApiError::Validation(
                    "last_position_seconds must not be negative".to_string(),
                ));
            }
        }

        let mut conn = self.db.get()?;

        let lecture = lectures::table
            .filter(lectures::id.eq(lecture_id))
            .first::<crate::catalog::Lecture>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("lecture"))?;

        let enrolled: i64 = enrollments::table
            .filter(enrollments::user_id.eq(user_id))
            .filter(enrollments::course_id.eq(lecture.course_id))
            .count()
            .get_result(&mut conn)?;
        if enrolled == 0 {
            return Err(ApiError::NotFound("enrollment"));
        }

        let existing = lecture_progress::table
            .filter(lecture_progress::user_id.eq(user_id))
            .filter(lecture_progress::lecture_id.eq(lecture_id))
            .first::<LectureProgress>(&mut conn)
            .optional()?;

        let now = Utc::now();
        let merged = LectureProgress {
            id: existing.as_ref().map(|p| p.id).unwrap_or_else(Uuid::new_v4),
            user_id,
            lecture_id,
            course_id: lecture.course_id,
            is_completed: update
                .is_completed
                .unwrap_or_else(|| existing.as_ref().map(|p| p.is_completed).unwrap_or(false)),
            watched_seconds: update
                .watched_seconds
                .unwrap_or_else(|| existing.as_ref().map(|p| p.watched_seconds).unwrap_or(0)),
            last_position_seconds: update.last_position_seconds.unwrap_or_else(|| {
                existing
                    .as_ref()
                    .map(|p| p.last_position_seconds)
                    .unwrap_or(0)
            }),
            updated_at: now,
        };

        diesel::insert_into(lecture_progress::table)
            .values(&merged)
            .on_conflict((lecture_progress::user_id, lecture_progress::lecture_id))
            .do_update()
            .set((
                lecture_progress::is_completed.eq(merged.is_completed),
                lecture_progress::watched_seconds.eq(merged.watched_seconds),
                lecture_progress::last_position_seconds.eq(merged.last_position_seconds),
                lecture_progress::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        sync_enrollment(&mut conn, user_id, lecture.course_id)
    }

    /// Read-only snapshot of a learner's standing on a course.
    pub async fn course_progress(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<ProgressSnapshot, ApiError> {
        let mut conn = self.db.get()?;

        let row: Option<(i32, Option<DateTime<Utc>>)> = enrollments::table
            .filter(enrollments::user_id.eq(user_id))
            .filter(enrollments::course_id.eq(course_id))
            .select((enrollments::progress_percent, enrollments::completed_at))
            .first(&mut conn)
            .optional()?;
        let (progress_percent, completed_at) = row.ok_or(ApiError::NotFound("enrollment"))?;

        let total: i64 = lectures::table
            .filter(lectures::course_id.eq(course_id))
            .count()
            .get_result(&mut conn)?;

        let completed: i64 = lecture_progress::table
            .filter(lecture_progress::user_id.eq(user_id))
            .filter(lecture_progress::course_id.eq(course_id))
            .filter(lecture_progress::is_completed.eq(true))
            .count()
            .get_result(&mut conn)?;

        Ok(ProgressSnapshot {
            course_id,
            total_lectures: total,
            completed_lectures: completed,
            progress_percent,
            completed_at,
        })
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn update_lecture_progress(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(lecture_id): Path<Uuid>,
    Json(update): Json<LectureProgressUpdate>,
) -> Result<Json<ProgressSnapshot>, ApiError> {
    let engine = ProgressEngine::new(state.conn.clone());
    let snapshot = engine
        .record_lecture_progress(user.user_id, lecture_id, update)
        .await?;
    Ok(Json(snapshot))
}

pub async fn get_course_progress(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(course_id): Path<Uuid>,
) -> Result<Json<ProgressSnapshot>, ApiError> {
    let engine = ProgressEngine::new(state.conn.clone());
    let snapshot = engine.course_progress(user.user_id, course_id).await?;
    Ok(Json(snapshot))
}

// ============================================================================
// ROUTE CONFIGURATION
// ============================================================================

/// Configure progress tracking routes
pub fn configure_progress_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lectures/:id/progress", put(update_lecture_progress))
        .route("/courses/:id/progress", get(get_course_progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_percent_complete_rounding() {
        assert_eq!(percent_complete(0, 3), 0);
        assert_eq!(percent_complete(1, 3), 33);
        assert_eq!(percent_complete(2, 3), 67);
        assert_eq!(percent_complete(3, 3), 100);
        assert_eq!(percent_complete(1, 6), 17);
        assert_eq!(percent_complete(5, 6), 83);
        assert_eq!(percent_complete(1, 2), 50);
    }

    #[test]
    fn test_percent_complete_empty_course_is_zero() {
        assert_eq!(percent_complete(0, 0), 0);
    }

    #[test]
    fn test_percent_complete_clamps_stale_counts() {
        assert_eq!(percent_complete(5, 3), 100);
    }

    #[test]
    fn test_resolve_completed_at_sets_on_full_completion() {
        let now = Utc::now();
        assert_eq!(resolve_completed_at(100, None, now), Some(now));
        assert_eq!(resolve_completed_at(99, None, now), None);
    }

    #[test]
    fn test_resolve_completed_at_is_sticky() {
        let earlier = Utc::now() - Duration::days(30);
        let now = Utc::now();

        // new lectures dropped the percentage, timestamp stays
        assert_eq!(resolve_completed_at(67, Some(earlier), now), Some(earlier));
        // repeat completion does not refresh the timestamp
        assert_eq!(resolve_completed_at(100, Some(earlier), now), Some(earlier));
    }

    #[test]
    fn test_progress_update_deserializes_partial_payload() {
        let update: LectureProgressUpdate =
            serde_json::from_str(r#"{"watched_seconds": 120}"#).unwrap();
        assert_eq!(update.watched_seconds, Some(120));
        assert_eq!(update.is_completed, None);
        assert_eq!(update.last_position_seconds, None);
    }
}
