//! Diesel schema for the Learnify database.
//!
//! Keep column order in sync with the structs deriving `Queryable`
//! in the domain modules.

diesel::table! {
    courses (id) {
        id -> Uuid,
        organization_id -> Nullable<Uuid>,
        title -> Text,
        description -> Nullable<Text>,
        instructor_name -> Text,
        category -> Text,
        cpd_points -> Int4,
        price_cents -> Int4,
        is_published -> Bool,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    course_sections (id) {
        id -> Uuid,
        course_id -> Uuid,
        title -> Text,
        position -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    lectures (id) {
        id -> Uuid,
        course_id -> Uuid,
        section_id -> Uuid,
        title -> Text,
        video_url -> Nullable<Text>,
        duration_seconds -> Int4,
        position -> Int4,
        is_preview -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    enrollments (id) {
        id -> Uuid,
        user_id -> Uuid,
        course_id -> Uuid,
        source -> Text,
        progress_percent -> Int4,
        completed_at -> Nullable<Timestamptz>,
        deadline -> Nullable<Timestamptz>,
        assigned_by -> Nullable<Uuid>,
        enrolled_at -> Timestamptz,
        last_accessed_at -> Timestamptz,
    }
}

diesel::table! {
    lecture_progress (id) {
        id -> Uuid,
        user_id -> Uuid,
        lecture_id -> Uuid,
        course_id -> Uuid,
        is_completed -> Bool,
        watched_seconds -> Int4,
        last_position_seconds -> Int4,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    course_assignments (id) {
        id -> Uuid,
        course_id -> Uuid,
        learner_id -> Uuid,
        organization_id -> Uuid,
        assigned_by -> Uuid,
        status -> Text,
        deadline -> Nullable<Timestamptz>,
        notes -> Nullable<Text>,
        assigned_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    certificates (id) {
        id -> Uuid,
        user_id -> Uuid,
        course_id -> Uuid,
        certificate_code -> Text,
        course_title -> Text,
        instructor_name -> Text,
        cpd_points -> Int4,
        issued_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    courses,
    course_sections,
    lectures,
    enrollments,
    lecture_progress,
    course_assignments,
    certificates,
);
