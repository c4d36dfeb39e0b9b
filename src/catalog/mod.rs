//! # Catalog Module - Course Authoring and Browsing
//!
//! Courses own ordered sections, sections own ordered lectures.
//! Staff author the catalog; learners browse the published subset.
//! Structural edits to lectures feed back into enrollment progress
//! through the progress module, so adding or removing a lecture on a
//! live course immediately reshapes every learner's percentage.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::progress;
use crate::shared::errors::ApiError;
use crate::shared::schema::{course_sections, courses, enrollments, lecture_progress, lectures};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

// ============================================================================
// DATA MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = courses)]
pub struct Course {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub instructor_name: String,
    pub category: String,
    pub cpd_points: i32,
    pub price_cents: i32,
    pub is_published: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = course_sections)]
pub struct CourseSection {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = lectures)]
pub struct Lecture {
    pub id: Uuid,
    pub course_id: Uuid,
    pub section_id: Uuid,
    pub title: String,
    pub video_url: Option<String>,
    pub duration_seconds: i32,
    pub position: i32,
    pub is_preview: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: Option<String>,
    pub instructor_name: Option<String>,
    pub category: Option<String>,
    pub cpd_points: Option<i32>,
    pub price_cents: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub instructor_name: Option<String>,
    pub category: Option<String>,
    pub cpd_points: Option<i32>,
    pub price_cents: Option<i32>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseFilters {
    pub category: Option<String>,
    pub search: Option<String>,
    pub include_unpublished: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSectionRequest {
    pub title: String,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSectionRequest {
    pub title: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLectureRequest {
    pub section_id: Uuid,
    pub title: String,
    pub video_url: Option<String>,
    pub duration_seconds: Option<i32>,
    pub is_preview: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLectureRequest {
    pub title: Option<String>,
    pub video_url: Option<String>,
    pub duration_seconds: Option<i32>,
    pub position: Option<i32>,
    pub is_preview: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub instructor_name: String,
    pub category: String,
    pub cpd_points: i32,
    pub price_cents: i32,
    pub is_published: bool,
    pub lecture_count: i64,
    pub total_duration_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LectureResponse {
    pub id: Uuid,
    pub section_id: Uuid,
    pub title: String,
    pub video_url: Option<String>,
    pub duration_seconds: i32,
    pub position: i32,
    pub is_preview: bool,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionResponse {
    pub id: Uuid,
    pub title: String,
    pub position: i32,
    pub lectures: Vec<LectureResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentSummary {
    pub id: Uuid,
    pub progress_percent: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDetailResponse {
    pub course: CourseSummary,
    pub sections: Vec<SectionResponse>,
    pub enrollment: Option<EnrollmentSummary>,
}

// ============================================================================
// VALIDATION
// ============================================================================

fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::Validation("title must not be empty".to_string()));
    }
    Ok(())
}

fn validate_non_negative(value: i32, field: &str) -> Result<(), ApiError> {
    if value < 0 {
        return Err(ApiError::Validation(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(())
}

/// Group ordered lectures under their sections, flagging the ones the
/// current learner already completed.
fn build_sections(
    sections: Vec<CourseSection>,
    lectures: Vec<Lecture>,
    completed: &HashSet<Uuid>,
) -> Vec<SectionResponse> {
    let mut by_section: HashMap<Uuid, Vec<LectureResponse>> = HashMap::new();
    for lecture in lectures {
        by_section
            .entry(lecture.section_id)
            .or_default()
            .push(LectureResponse {
                id: lecture.id,
                section_id: lecture.section_id,
                title: lecture.title,
                video_url: lecture.video_url,
                duration_seconds: lecture.duration_seconds,
                position: lecture.position,
                is_preview: lecture.is_preview,
                is_completed: completed.contains(&lecture.id),
            });
    }

    let mut out: Vec<SectionResponse> = sections
        .into_iter()
        .map(|section| {
            let mut section_lectures = by_section.remove(&section.id).unwrap_or_default();
            section_lectures.sort_by_key(|l| l.position);
            SectionResponse {
                id: section.id,
                title: section.title,
                position: section.position,
                lectures: section_lectures,
            }
        })
        .collect();
    out.sort_by_key(|s| s.position);
    out
}

fn summarize(course: Course, lecture_count: i64, total_duration_seconds: i64) -> CourseSummary {
    CourseSummary {
        id: course.id,
        title: course.title,
        description: course.description,
        instructor_name: course.instructor_name,
        category: course.category,
        cpd_points: course.cpd_points,
        price_cents: course.price_cents,
        is_published: course.is_published,
        lecture_count,
        total_duration_seconds,
        created_at: course.created_at,
        updated_at: course.updated_at,
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct CatalogEngine {
    db: DbPool,
}

impl CatalogEngine {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    // ----- Course Operations -----

    pub async fn create_course(
        &self,
        req: CreateCourseRequest,
        created_by: Uuid,
        organization_id: Option<Uuid>,
    ) -> Result<Course, ApiError> {
        validate_title(&req.title)?;
        let cpd_points = req.cpd_points.unwrap_or(0);
        let price_cents = req.price_cents.unwrap_or(0);
        validate_non_negative(cpd_points, "cpd_points")?;
        validate_non_negative(price_cents, "price_cents")?;

        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            organization_id,
            title: req.title.trim().to_string(),
            description: req.description,
            instructor_name: req
                .instructor_name
                .unwrap_or_else(|| "Learnify Instructor".to_string()),
            category: req.category.unwrap_or_else(|| "general".to_string()),
            cpd_points,
            price_cents,
            is_published: false,
            created_by: Some(created_by),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.get()?;
        diesel::insert_into(courses::table)
            .values(&course)
            .execute(&mut conn)?;

        Ok(course)
    }

    pub async fn get_course(&self, course_id: Uuid) -> Result<Option<Course>, ApiError> {
        let mut conn = self.db.get()?;
        let course = courses::table
            .filter(courses::id.eq(course_id))
            .first::<Course>(&mut conn)
            .optional()?;
        Ok(course)
    }

    pub async fn list_courses(
        &self,
        filters: CourseFilters,
        include_unpublished: bool,
    ) -> Result<Vec<CourseSummary>, ApiError> {
        let mut conn = self.db.get()?;

        let mut query = courses::table.into_boxed();

        if !include_unpublished {
            query = query.filter(courses::is_published.eq(true));
        }

        if let Some(category) = filters.category {
            query = query.filter(courses::category.eq(category));
        }

        if let Some(search) = filters.search {
            let pattern = format!("%{}%", search.trim());
            query = query.filter(
                courses::title
                    .ilike(pattern.clone())
                    .or(courses::description.ilike(pattern)),
            );
        }

        query = query
            .order(courses::created_at.desc())
            .limit(filters.limit.unwrap_or(50).clamp(1, 200));

        if let Some(offset) = filters.offset {
            query = query.offset(offset.max(0));
        }

        let rows = query.load::<Course>(&mut conn)?;

        let ids: Vec<Uuid> = rows.iter().map(|c| c.id).collect();
        let lecture_rows: Vec<(Uuid, i32)> = lectures::table
            .filter(lectures::course_id.eq_any(&ids))
            .select((lectures::course_id, lectures::duration_seconds))
            .load(&mut conn)?;

        let mut totals: HashMap<Uuid, (i64, i64)> = HashMap::new();
        for (course_id, duration) in lecture_rows {
            let entry = totals.entry(course_id).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += i64::from(duration);
        }

        Ok(rows
            .into_iter()
            .map(|course| {
                let (count, duration) = totals.get(&course.id).copied().unwrap_or((0, 0));
                summarize(course, count, duration)
            })
            .collect())
    }

    pub async fn update_course(
        &self,
        course_id: Uuid,
        req: UpdateCourseRequest,
    ) -> Result<Course, ApiError> {
        let mut conn = self.db.get()?;

        let existing = courses::table
            .filter(courses::id.eq(course_id))
            .first::<Course>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("course"))?;

        if let Some(title) = &req.title {
            validate_title(title)?;
        }
        if let Some(cpd_points) = req.cpd_points {
            validate_non_negative(cpd_points, "cpd_points")?;
        }
        if let Some(price_cents) = req.price_cents {
            validate_non_negative(price_cents, "price_cents")?;
        }

        // A course with no lectures has nothing to learn from
        if req.is_published == Some(true) && !existing.is_published {
            let lecture_count: i64 = lectures::table
                .filter(lectures::course_id.eq(course_id))
                .count()
                .get_result(&mut conn)?;
            if lecture_count == 0 {
                return Err(ApiError::Validation(
                    "cannot publish a course with no lectures".to_string(),
                ));
            }
        }

        diesel::update(courses::table.filter(courses::id.eq(course_id)))
            .set(courses::updated_at.eq(Utc::now()))
            .execute(&mut conn)?;

        if let Some(title) = req.title {
            diesel::update(courses::table.filter(courses::id.eq(course_id)))
                .set(courses::title.eq(title.trim().to_string()))
                .execute(&mut conn)?;
        }

        if let Some(description) = req.description {
            diesel::update(courses::table.filter(courses::id.eq(course_id)))
                .set(courses::description.eq(description))
                .execute(&mut conn)?;
        }

        if let Some(instructor_name) = req.instructor_name {
            diesel::update(courses::table.filter(courses::id.eq(course_id)))
                .set(courses::instructor_name.eq(instructor_name))
                .execute(&mut conn)?;
        }

        if let Some(category) = req.category {
            diesel::update(courses::table.filter(courses::id.eq(course_id)))
                .set(courses::category.eq(category))
                .execute(&mut conn)?;
        }

        if let Some(cpd_points) = req.cpd_points {
            diesel::update(courses::table.filter(courses::id.eq(course_id)))
                .set(courses::cpd_points.eq(cpd_points))
                .execute(&mut conn)?;
        }

        if let Some(price_cents) = req.price_cents {
            diesel::update(courses::table.filter(courses::id.eq(course_id)))
                .set(courses::price_cents.eq(price_cents))
                .execute(&mut conn)?;
        }

        if let Some(is_published) = req.is_published {
            diesel::update(courses::table.filter(courses::id.eq(course_id)))
                .set(courses::is_published.eq(is_published))
                .execute(&mut conn)?;
        }

        courses::table
            .filter(courses::id.eq(course_id))
            .first::<Course>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("course"))
    }

    pub async fn delete_course(&self, course_id: Uuid) -> Result<(), ApiError> {
        let mut conn = self.db.get()?;

        let exists = courses::table
            .filter(courses::id.eq(course_id))
            .first::<Course>(&mut conn)
            .optional()?;
        if exists.is_none() {
            return Err(ApiError::NotFound("course"));
        }

        let enrolled: i64 = enrollments::table
            .filter(enrollments::course_id.eq(course_id))
            .count()
            .get_result(&mut conn)?;
        if enrolled > 0 {
            return Err(ApiError::Conflict(
                "course has active enrollments and cannot be deleted".to_string(),
            ));
        }

        diesel::delete(
            lecture_progress::table.filter(lecture_progress::course_id.eq(course_id)),
        )
        .execute(&mut conn)?;
        diesel::delete(lectures::table.filter(lectures::course_id.eq(course_id)))
            .execute(&mut conn)?;
        diesel::delete(course_sections::table.filter(course_sections::course_id.eq(course_id)))
            .execute(&mut conn)?;
        diesel::delete(courses::table.filter(courses::id.eq(course_id))).execute(&mut conn)?;

        Ok(())
    }

    pub async fn course_detail(
        &self,
        course_id: Uuid,
        user: &AuthenticatedUser,
    ) -> Result<CourseDetailResponse, ApiError> {
        let mut conn = self.db.get()?;

        let course = courses::table
            .filter(courses::id.eq(course_id))
            .first::<Course>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("course"))?;

        // Unpublished courses are invisible to learners
        if !course.is_published && !user.has_role(crate::auth::Roles::STAFF) {
            return Err(ApiError::NotFound("course"));
        }

        let sections = course_sections::table
            .filter(course_sections::course_id.eq(course_id))
            .order(course_sections::position.asc())
            .load::<CourseSection>(&mut conn)?;

        let course_lectures = lectures::table
            .filter(lectures::course_id.eq(course_id))
            .order(lectures::position.asc())
            .load::<Lecture>(&mut conn)?;

        let completed: HashSet<Uuid> = lecture_progress::table
            .filter(lecture_progress::user_id.eq(user.user_id))
            .filter(lecture_progress::course_id.eq(course_id))
            .filter(lecture_progress::is_completed.eq(true))
            .select(lecture_progress::lecture_id)
            .load::<Uuid>(&mut conn)?
            .into_iter()
            .collect();

        let enrollment = enrollments::table
            .filter(enrollments::user_id.eq(user.user_id))
            .filter(enrollments::course_id.eq(course_id))
            .select((
                enrollments::id,
                enrollments::progress_percent,
                enrollments::completed_at,
                enrollments::deadline,
            ))
            .first::<(Uuid, i32, Option<DateTime<Utc>>, Option<DateTime<Utc>>)>(&mut conn)
            .optional()?
            .map(|(id, progress_percent, completed_at, deadline)| EnrollmentSummary {
                id,
                progress_percent,
                completed_at,
                deadline,
            });

        let lecture_count = course_lectures.len() as i64;
        let total_duration: i64 = course_lectures
            .iter()
            .map(|l| i64::from(l.duration_seconds))
            .sum();

        Ok(CourseDetailResponse {
            course: summarize(course, lecture_count, total_duration),
            sections: build_sections(sections, course_lectures, &completed),
            enrollment,
        })
    }

    // ----- Section Operations -----

    pub async fn create_section(
        &self,
        course_id: Uuid,
        req: CreateSectionRequest,
    ) -> Result<CourseSection, ApiError> {
        validate_title(&req.title)?;
        let mut conn = self.db.get()?;

        let course = courses::table
            .filter(courses::id.eq(course_id))
            .first::<Course>(&mut conn)
            .optional()?;
        if course.is_none() {
            return Err(ApiError::NotFound("course"));
        }

        let position = match req.position {
            Some(position) => position,
            None => {
                let max: Option<i32> = course_sections::table
                    .filter(course_sections::course_id.eq(course_id))
                    .select(diesel::dsl::max(course_sections::position))
                    .first(&mut conn)?;
                max.unwrap_or(0) + 1
            }
        };

        let section = CourseSection {
            id: Uuid::new_v4(),
            course_id,
            title: req.title.trim().to_string(),
            position,
            created_at: Utc::now(),
        };

        diesel::insert_into(course_sections::table)
            .values(&section)
            .execute(&mut conn)?;

        Ok(section)
    }

    pub async fn update_section(
        &self,
        section_id: Uuid,
        req: UpdateSectionRequest,
    ) -> Result<CourseSection, ApiError> {
        let mut conn = self.db.get()?;

        if let Some(title) = &req.title {
            validate_title(title)?;
        }

        if let Some(title) = req.title {
            diesel::update(course_sections::table.filter(course_sections::id.eq(section_id)))
                .set(course_sections::title.eq(title.trim().to_string()))
                .execute(&mut conn)?;
        }

        if let Some(position) = req.position {
            diesel::update(course_sections::table.filter(course_sections::id.eq(section_id)))
                .set(course_sections::position.eq(position))
                .execute(&mut conn)?;
        }

        course_sections::table
            .filter(course_sections::id.eq(section_id))
            .first::<CourseSection>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("section"))
    }

    pub async fn delete_section(&self, section_id: Uuid) -> Result<(), ApiError> {
        let mut conn = self.db.get()?;

        let section = course_sections::table
            .filter(course_sections::id.eq(section_id))
            .first::<CourseSection>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("section"))?;

        let lecture_ids: Vec<Uuid> = lectures::table
            .filter(lectures::section_id.eq(section_id))
            .select(lectures::id)
            .load(&mut conn)?;

        if !lecture_ids.is_empty() {
            diesel::delete(
                lecture_progress::table.filter(lecture_progress::lecture_id.eq_any(&lecture_ids)),
            )
            .execute(&mut conn)?;
            diesel::delete(lectures::table.filter(lectures::section_id.eq(section_id)))
                .execute(&mut conn)?;
        }

        diesel::delete(course_sections::table.filter(course_sections::id.eq(section_id)))
            .execute(&mut conn)?;

        drop(conn);
        // Lecture totals changed, re-derive every learner's percentage
        if !lecture_ids.is_empty() {
            progress::sync_course_enrollments(&self.db, section.course_id)?;
        }

        Ok(())
    }

    // ----- Lecture Operations -----

    pub async fn create_lecture(
        &self,
        course_id: Uuid,
        req: CreateLectureRequest,
    ) -> Result<Lecture, ApiError> {
        validate_title(&req.title)?;
        let duration_seconds = req.duration_seconds.unwrap_or(0);
        validate_non_negative(duration_seconds, "duration_seconds")?;

        let mut conn = self.db.get()?;

        let section = course_sections::table
            .filter(course_sections::id.eq(req.section_id))
            .first::<CourseSection>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("section"))?;

        if section.course_id != course_id {
            return Err(ApiError::Validation(
                "section does not belong to this course".to_string(),
            ));
        }

        let max: Option<i32> = lectures::table
            .filter(lectures::section_id.eq(req.section_id))
            .select(diesel::dsl::max(lectures::position))
            .first(&mut conn)?;

        let now = Utc::now();
        let lecture = Lecture {
            id: Uuid::new_v4(),
            course_id,
            section_id: req.section_id,
            title: req.title.trim().to_string(),
            video_url: req.video_url,
            duration_seconds,
            position: max.unwrap_or(0) + 1,
            is_preview: req.is_preview.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(lectures::table)
            .values(&lecture)
            .execute(&mut conn)?;

        drop(conn);
        progress::sync_course_enrollments(&self.db, course_id)?;

        Ok(lecture)
    }

    pub async fn update_lecture(
        &self,
        lecture_id: Uuid,
        req: UpdateLectureRequest,
    ) -> Result<Lecture, ApiError> {
        let mut conn = self.db.get()?;

        if let Some(title) = &req.title {
            validate_title(title)?;
        }
        if let Some(duration_seconds) = req.duration_seconds {
            validate_non_negative(duration_seconds, "duration_seconds")?;
        }

        diesel::update(lectures::table.filter(lectures::id.eq(lecture_id)))
            .set(lectures::updated_at.eq(Utc::now()))
            .execute(&mut conn)?;

        if let Some(title) = req.title {
            diesel::update(lectures::table.filter(lectures::id.eq(lecture_id)))
                .set(lectures::title.eq(title.trim().to_string()))
                .execute(&mut conn)?;
        }

        if let Some(video_url) = req.video_url {
            diesel::update(lectures::table.filter(lectures::id.eq(lecture_id)))
                .set(lectures::video_url.eq(video_url))
                .execute(&mut conn)?;
        }

        if let Some(duration_seconds) = req.duration_seconds {
            diesel::update(lectures::table.filter(lectures::id.eq(lecture_id)))
                .set(lectures::duration_seconds.eq(duration_seconds))
                .execute(&mut conn)?;
        }

        if let Some(position) = req.position {
            diesel::update(lectures::table.filter(lectures::id.eq(lecture_id)))
                .set(lectures::position.eq(position))
                .execute(&mut conn)?;
        }

        if let Some(is_preview) = req.is_preview {
            diesel::update(lectures::table.filter(lectures::id.eq(lecture_id)))
                .set(lectures::is_preview.eq(is_preview))
                .execute(&mut conn)?;
        }

        lectures::table
            .filter(lectures::id.eq(lecture_id))
            .first::<Lecture>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("lecture"))
    }

    pub async fn delete_lecture(&self, lecture_id: Uuid) -> Result<(), ApiError> {
        let mut conn = self.db.get()?;

        let lecture = lectures::table
            .filter(lectures::id.eq(lecture_id))
            .first::<Lecture>(&mut conn)
            .optional()?
            .ok_or(ApiError::NotFound("lecture"))?;

        diesel::delete(
            lecture_progress::table.filter(lecture_progress::lecture_id.eq(lecture_id)),
        )
        .execute(&mut conn)?;
        diesel::delete(lectures::table.filter(lectures::id.eq(lecture_id))).execute(&mut conn)?;

        drop(conn);
        progress::sync_course_enrollments(&self.db, lecture.course_id)?;

        Ok(())
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn create_course(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    user.require_staff()?;
    let engine = CatalogEngine::new(state.conn.clone());
    let course = engine
        .create_course(req, user.user_id, user.organization_id)
        .await?;
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(filters): Query<CourseFilters>,
) -> Result<Json<Vec<CourseSummary>>, ApiError> {
    let include_unpublished = filters.include_unpublished.unwrap_or(false)
        && user.has_role(crate::auth::Roles::STAFF);
    let engine = CatalogEngine::new(state.conn.clone());
    let courses = engine.list_courses(filters, include_unpublished).await?;
    Ok(Json(courses))
}

pub async fn get_course(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let engine = CatalogEngine::new(state.conn.clone());
    let detail = engine.course_detail(id, &user).await?;
    Ok(Json(detail))
}

pub async fn update_course(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCourseRequest>,
) -> Result<Json<Course>, ApiError> {
    user.require_staff()?;
    let engine = CatalogEngine::new(state.conn.clone());
    let course = engine.update_course(id, req).await?;
    Ok(Json(course))
}

pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    user.require_staff()?;
    let engine = CatalogEngine::new(state.conn.clone());
    engine.delete_course(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_section(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateSectionRequest>,
) -> Result<(StatusCode, Json<CourseSection>), ApiError> {
    user.require_staff()?;
    let engine = CatalogEngine::new(state.conn.clone());
    let section = engine.create_section(course_id, req).await?;
    Ok((StatusCode::CREATED, Json(section)))
}

pub async fn update_section(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSectionRequest>,
) -> Result<Json<CourseSection>, ApiError> {
    user.require_staff()?;
    let engine = CatalogEngine::new(state.conn.clone());
    let section = engine.update_section(id, req).await?;
    Ok(Json(section))
}

pub async fn delete_section(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    user.require_staff()?;
    let engine = CatalogEngine::new(state.conn.clone());
    engine.delete_section(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_lecture(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateLectureRequest>,
) -> Result<(StatusCode, Json<Lecture>), ApiError> {
    user.require_staff()?;
    let engine = CatalogEngine::new(state.conn.clone());
    let lecture = engine.create_lecture(course_id, req).await?;
    Ok((StatusCode::CREATED, Json(lecture)))
}

pub async fn update_lecture(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLectureRequest>,
) -> Result<Json<Lecture>, ApiError> {
    user.require_staff()?;
    let engine = CatalogEngine::new(state.conn.clone());
    let lecture = engine.update_lecture(id, req).await?;
    Ok(Json(lecture))
}

pub async fn delete_lecture(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    user.require_staff()?;
    let engine = CatalogEngine::new(state.conn.clone());
    engine.delete_lecture(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ROUTE CONFIGURATION
// ============================================================================

/// Configure all catalog routes
pub fn configure_catalog_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/:id",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/courses/:id/sections", post(create_section))
        .route(
            "/sections/:id",
            put(update_section).delete(delete_section),
        )
        .route("/courses/:id/lectures", post(create_lecture))
        .route(
            "/lectures/:id",
            put(update_lecture).delete(delete_lecture),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lecture(section_id: Uuid, position: i32, title: &str) -> Lecture {
        let now = Utc::now();
        Lecture {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            section_id,
            title: title.to_string(),
            video_url: None,
            duration_seconds: 300,
            position,
            is_preview: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn section(course_id: Uuid, position: i32, title: &str) -> CourseSection {
        CourseSection {
            id: Uuid::new_v4(),
            course_id,
            title: title.to_string(),
            position,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_title_rejects_blank() {
        assert!(validate_title("Workplace Safety").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title("   ").is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative(0, "cpd_points").is_ok());
        assert!(validate_non_negative(12, "cpd_points").is_ok());
        assert!(validate_non_negative(-1, "price_cents").is_err());
    }

    #[test]
    fn test_build_sections_orders_and_groups() {
        let course_id = Uuid::new_v4();
        let s1 = section(course_id, 2, "Advanced");
        let s2 = section(course_id, 1, "Basics");

        let l1 = lecture(s2.id, 2, "Second basic");
        let l2 = lecture(s2.id, 1, "First basic");
        let l3 = lecture(s1.id, 1, "Only advanced");

        let out = build_sections(
            vec![s1.clone(), s2.clone()],
            vec![l1, l2, l3],
            &HashSet::new(),
        );

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, s2.id);
        assert_eq!(out[0].lectures.len(), 2);
        assert_eq!(out[0].lectures[0].title, "First basic");
        assert_eq!(out[1].id, s1.id);
        assert_eq!(out[1].lectures.len(), 1);
    }

    #[test]
    fn test_build_sections_marks_completed_lectures() {
        let course_id = Uuid::new_v4();
        let s = section(course_id, 1, "Basics");
        let done = lecture(s.id, 1, "Watched");
        let pending = lecture(s.id, 2, "Not yet");

        let completed: HashSet<Uuid> = [done.id].into_iter().collect();
        let out = build_sections(vec![s], vec![done, pending], &completed);

        assert!(out[0].lectures[0].is_completed);
        assert!(!out[0].lectures[1].is_completed);
    }

    #[test]
    fn test_build_sections_empty_section_keeps_place() {
        let course_id = Uuid::new_v4();
        let s = section(course_id, 1, "Empty");
        let out = build_sections(vec![s], vec![], &HashSet::new());
        assert_eq!(out.len(), 1);
        assert!(out[0].lectures.is_empty());
    }

    #[test]
    fn test_summarize_carries_aggregates() {
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            organization_id: None,
            title: "GDPR Essentials".to_string(),
            description: None,
            instructor_name: "Grace".to_string(),
            category: "compliance".to_string(),
            cpd_points: 4,
            price_cents: 0,
            is_published: true,
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        let summary = summarize(course, 7, 5400);
        assert_eq!(summary.lecture_count, 7);
        assert_eq!(summary.total_duration_seconds, 5400);
        assert_eq!(summary.cpd_points, 4);
    }
}
