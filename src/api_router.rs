//! Comprehensive API Router
//!
//! Combines all API endpoints from all specialized modules into a unified router.
//! This provides a centralized configuration for all REST API routes.

use axum::middleware;
use axum::Router;
use std::sync::Arc;

use crate::auth::require_authentication_middleware;
use crate::shared::state::AppState;

/// Configure all API routes from all modules
///
/// Everything except certificate verification requires a valid login;
/// the identity itself is attached earlier by the authentication
/// middleware installed on the whole server.
pub fn configure_api_routes() -> Router<Arc<AppState>> {
    let protected = Router::new()
        // ===== Course Catalog & Authoring (catalog module) =====
        .merge(crate::catalog::configure_catalog_routes())
        // ===== Enrollment & Checkout (enrollment module) =====
        .merge(crate::enrollment::configure_enrollment_routes())
        // ===== Lecture & Course Progress (progress module) =====
        .merge(crate::progress::configure_progress_routes())
        // ===== Corporate Assignments (assignments module) =====
        .merge(crate::assignments::configure_assignment_routes())
        // ===== Certificates (certificates module) =====
        .merge(crate::certificates::configure_certificate_routes())
        .layer(middleware::from_fn(require_authentication_middleware));

    Router::new()
        // ===== Public certificate verification =====
        .merge(crate::certificates::configure_certificate_public_routes())
        .merge(protected)
}
