//! # Assignments Module - Corporate Training
//!
//! Org admins assign courses to learners in their organization,
//! optionally with a deadline. Creating an assignment also enrolls
//! the learner, so assigned courses show up in their learning list
//! immediately. Stored status only ever moves forward (assigned,
//! in_progress, completed); overdue is derived from the deadline at
//! read time and never written, so a deadline extension un-flags a
//! learner without any repair job.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, post},
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::enrollment;
use crate::shared::errors::ApiError;
use crate::shared::schema::{course_assignments, courses, enrollments};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

// ============================================================================
// DATA MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = course_assignments)]
pub struct CourseAssignment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub learner_id: Uuid,
    pub organization_id: Uuid,
    pub assigned_by: Uuid,
    pub status: String,
    pub deadline: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStatus {
    Assigned,
    InProgress,
    Completed,
    Overdue,
}

impl From<&str> for AssignmentStatus {
    fn from(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "overdue" => Self::Overdue,
            _ => Self::Assigned,
        }
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
        };
        write!(f, "{}", s)
    }
}

impl AssignmentStatus {
    /// Next stored status after a progress change. Completed is
    /// terminal; otherwise any watched lecture moves the assignment
    /// to in_progress and full completion finishes it.
    pub fn advanced_by_progress(self, percent: i32) -> Self {
        if self == Self::Completed {
            return self;
        }
        if percent >= 100 {
            Self::Completed
        } else if percent > 0 {
            Self::InProgress
        } else {
            self
        }
    }
}

/// Status as reported to clients. Overdue exists only here: a stored
/// assigned or in_progress assignment past its deadline reads as
/// overdue, while completed assignments stay completed forever.
pub fn derived_status(
    stored: AssignmentStatus,
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> AssignmentStatus {
    if stored == AssignmentStatus::Completed {
        return stored;
    }
    match deadline {
        Some(due) if now > due => AssignmentStatus::Overdue,
        _ => stored,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssignmentRequest {
    pub course_id: Uuid,
    pub learner_id: Uuid,
    pub deadline: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkAssignmentRequest {
    pub course_id: Uuid,
    pub learner_ids: Vec<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkAssignmentResponse {
    pub assigned: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentFilters {
    pub course_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub learner_id: Uuid,
    pub status: String,
    pub is_overdue: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub days_until_due: Option<i64>,
    pub progress_percent: i32,
    pub notes: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn to_response(
    assignment: CourseAssignment,
    course_title: String,
    progress_percent: i32,
    now: DateTime<Utc>,
) -> AssignmentResponse {
    let stored = AssignmentStatus::from(assignment.status.as_str());
    let status = derived_status(stored, assignment.deadline, now);
    AssignmentResponse {
        id: assignment.id,
        course_id: assignment.course_id,
        course_title,
        learner_id: assignment.learner_id,
        status: status.to_string(),
        is_overdue: status == AssignmentStatus::Overdue,
        deadline: assignment.deadline,
        days_until_due: assignment.deadline.map(|due| (due - now).num_days()),
        progress_percent,
        notes: assignment.notes,
        assigned_at: assignment.assigned_at,
        completed_at: assignment.completed_at,
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct AssignmentEngine {
    db: DbPool,
}

impl AssignmentEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Assign a course to one learner. The assignment row and its
    /// backing enrollment are created in one transaction, so a learner
    /// can never hold an assignment without being enrolled.
    pub async fn create(
        &self,
        organization_id: Uuid,
        assigned_by: Uuid,
        req: CreateAssignmentRequest,
    ) -> Result<CourseAssignment, ApiError> {
        let mut conn = self.db.get()?;

        let is_published = courses::table
            .filter(courses::id.eq(req.course_id))
            .select(courses::is_published)
            .first::<bool>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("course"))?;

        if !is_published {
            return Err(ApiError::Validation(
                "cannot assign an unpublished course".to_string(),
            ));
        }

        let assignment = CourseAssignment {
            id: Uuid::new_v4(),
            course_id: req.course_id,
            learner_id: req.learner_id,
            organization_id,
            assigned_by,
            status: AssignmentStatus::Assigned.to_string(),
            deadline: req.deadline,
            notes: req.notes,
            assigned_at: Utc::now(),
            completed_at: None,
        };

        conn.transaction::<_, ApiError, _>(|conn| {
            let inserted = diesel::insert_into(course_assignments::table)
                .values(&assignment)
                .on_conflict((
                    course_assignments::learner_id,
                    course_assignments::course_id,
                ))
                .do_nothing()
                .execute(conn)?;

            if inserted == 0 {
                return Err(ApiError::Conflict(
                    "learner is already assigned to this course".to_string(),
                ));
            }

            enrollment::ensure_assignment_enrollment(
                conn,
                req.learner_id,
                req.course_id,
                req.deadline,
                assigned_by,
            )?;

            Ok(())
        })?;

        log::info!(
            "assignment created: course={} learner={} org={}",
            assignment.course_id,
            assignment.learner_id,
            organization_id
        );

        Ok(assignment)
    }

    /// Assign one course to many learners. Each learner is its own
    /// transaction; one duplicate does not roll back the rest.
    pub async fn create_bulk(
        &self,
        organization_id: Uuid,
        assigned_by: Uuid,
        req: BulkAssignmentRequest,
    ) -> Result<BulkAssignmentResponse, ApiError> {
        if req.learner_ids.is_empty() {
            return Err(ApiError::Validation(
                "learner_ids must not be empty".to_string(),
            ));
        }

        let mut assigned = 0;
        let mut failed = 0;

        for learner_id in req.learner_ids {
            let single = CreateAssignmentRequest {
                course_id: req.course_id,
                learner_id,
                deadline: req.deadline,
                notes: req.notes.clone(),
            };
            match self.create(organization_id, assigned_by, single).await {
                Ok(_) => assigned += 1,
                Err(e) => {
                    log::warn!(
                        "bulk assignment skipped learner {}: {}",
                        learner_id,
                        e
                    );
                    failed += 1;
                }
            }
        }

        Ok(BulkAssignmentResponse { assigned, failed })
    }

    /// Revoke an assignment. Only removes the training obligation; any
    /// enrollment and progress the learner already has stays intact.
    pub async fn revoke(
        &self,
        organization_id: Uuid,
        assignment_id: Uuid,
    ) -> Result<(), ApiError> {
        let mut conn = self.db.get()?;

        let deleted = diesel::delete(
            course_assignments::table
                .filter(course_assignments::id.eq(assignment_id))
                .filter(course_assignments::organization_id.eq(organization_id)),
        )
        .execute(&mut conn)?;

        if deleted == 0 {
            return Err(ApiError::NotFound("assignment"));
        }

        log::info!(
            "assignment revoked: id={} org={}",
            assignment_id,
            organization_id
        );
        Ok(())
    }

    /// Assignments visible to the caller: the whole organization for
    /// an org admin, the learner's own rows otherwise.
    pub async fn list(
        &self,
        user: &AuthenticatedUser,
        filters: AssignmentFilters,
    ) -> Result<Vec<AssignmentResponse>, ApiError> {
        let mut conn = self.db.get()?;

        let mut query = course_assignments::table.into_boxed();
        match user.require_org_admin() {
            Ok(organization_id) => {
                query = query.filter(course_assignments::organization_id.eq(organization_id));
            }
            Err(_) => {
                query = query.filter(course_assignments::learner_id.eq(user.user_id));
            }
        }
        if let Some(course_id) = filters.course_id {
            query = query.filter(course_assignments::course_id.eq(course_id));
        }

        let rows = query
            .order(course_assignments::assigned_at.desc())
            .load::<CourseAssignment>(&mut conn)?;

        let course_ids: Vec<Uuid> = rows.iter().map(|a| a.course_id).collect();
        let titles: HashMap<Uuid, String> = courses::table
            .filter(courses::id.eq_any(&course_ids))
            .select((courses::id, courses::title))
            .load::<(Uuid, String)>(&mut conn)?
            .into_iter()
            .collect();

        let learner_ids: Vec<Uuid> = rows.iter().map(|a| a.learner_id).collect();
        let progress: HashMap<(Uuid, Uuid), i32> = enrollments::table
            .filter(enrollments::user_id.eq_any(&learner_ids))
            .filter(enrollments::course_id.eq_any(&course_ids))
            .select((
                enrollments::user_id,
                enrollments::course_id,
                enrollments::progress_percent,
            ))
            .load::<(Uuid, Uuid, i32)>(&mut conn)?
            .into_iter()
            .map(|(user_id, course_id, percent)| ((user_id, course_id), percent))
            .collect();

        let now = Utc::now();
        Ok(rows
            .into_iter()
            .map(|assignment| {
                let title = titles
                    .get(&assignment.course_id)
                    .cloned()
                    .unwrap_or_default();
                let percent = progress
                    .get(&(assignment.learner_id, assignment.course_id))
                    .copied()
                    .unwrap_or(0);
                to_response(assignment, title, percent, now)
            })
            .collect())
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn create_assignment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateAssignmentRequest>,
) -> Result<(StatusCode, Json<CourseAssignment>), ApiError> {
    let organization_id = user.require_org_admin()?;
    let engine = AssignmentEngine::new(state.conn.clone());
    let assignment = engine.create(organization_id, user.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

pub async fn create_bulk_assignments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<BulkAssignmentRequest>,
) -> Result<Json<BulkAssignmentResponse>, ApiError> {
    let organization_id = user.require_org_admin()?;
    let engine = AssignmentEngine::new(state.conn.clone());
    let outcome = engine.create_bulk(organization_id, user.user_id, req).await?;
    Ok(Json(outcome))
}

pub async fn list_assignments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(filters): Query<AssignmentFilters>,
) -> Result<Json<Vec<AssignmentResponse>>, ApiError> {
    let engine = AssignmentEngine::new(state.conn.clone());
    let assignments = engine.list(&user, filters).await?;
    Ok(Json(assignments))
}

pub async fn revoke_assignment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(assignment_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let organization_id = user.require_org_admin()?;
    let engine = AssignmentEngine::new(state.conn.clone());
    engine.revoke(organization_id, assignment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ROUTE CONFIGURATION
// ============================================================================

/// Configure assignment routes
pub fn configure_assignment_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/assignments",
            post(create_assignment).get(list_assignments),
        )
        .route("/assignments/bulk", post(create_bulk_assignments))
        .route("/assignments/:id", delete(revoke_assignment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_conversion() {
        assert_eq!(
            AssignmentStatus::from("assigned"),
            AssignmentStatus::Assigned
        );
        assert_eq!(
            AssignmentStatus::from("in_progress"),
            AssignmentStatus::InProgress
        );
        assert_eq!(
            AssignmentStatus::from("completed"),
            AssignmentStatus::Completed
        );
        assert_eq!(
            AssignmentStatus::from("garbage"),
            AssignmentStatus::Assigned
        );
    }

    #[test]
    fn test_status_display_roundtrip() {
        for status in [
            AssignmentStatus::Assigned,
            AssignmentStatus::InProgress,
            AssignmentStatus::Completed,
            AssignmentStatus::Overdue,
        ] {
            assert_eq!(AssignmentStatus::from(status.to_string().as_str()), status);
        }
    }

    #[test]
    fn test_advanced_by_progress_transitions() {
        assert_eq!(
            AssignmentStatus::Assigned.advanced_by_progress(0),
            AssignmentStatus::Assigned
        );
        assert_eq!(
            AssignmentStatus::Assigned.advanced_by_progress(33),
            AssignmentStatus::InProgress
        );
        assert_eq!(
            AssignmentStatus::InProgress.advanced_by_progress(100),
            AssignmentStatus::Completed
        );
    }

    #[test]
    fn test_completed_is_terminal() {
        assert_eq!(
            AssignmentStatus::Completed.advanced_by_progress(0),
            AssignmentStatus::Completed
        );
        assert_eq!(
            AssignmentStatus::Completed.advanced_by_progress(50),
            AssignmentStatus::Completed
        );
    }

    #[test]
    fn test_derived_status_past_deadline() {
        let now = Utc::now();
        let due = now - Duration::hours(1);
        assert_eq!(
            derived_status(AssignmentStatus::Assigned, Some(due), now),
            AssignmentStatus::Overdue
        );
        assert_eq!(
            derived_status(AssignmentStatus::InProgress, Some(due), now),
            AssignmentStatus::Overdue
        );
    }

    #[test]
    fn test_derived_status_completed_never_overdue() {
        let now = Utc::now();
        let due = now - Duration::days(30);
        assert_eq!(
            derived_status(AssignmentStatus::Completed, Some(due), now),
            AssignmentStatus::Completed
        );
    }

    #[test]
    fn test_derived_status_future_or_missing_deadline() {
        let now = Utc::now();
        let due = now + Duration::days(7);
        assert_eq!(
            derived_status(AssignmentStatus::Assigned, Some(due), now),
            AssignmentStatus::Assigned
        );
        assert_eq!(
            derived_status(AssignmentStatus::InProgress, None, now),
            AssignmentStatus::InProgress
        );
    }
}
