//! Authentication middleware and request context.
//!
//! Identity lives in an external IdP. Requests carry an HS256 JWT
//! signed with the shared `JWT_SECRET`; this module validates the
//! token, turns its claims into an [`AuthenticatedUser`] and stores
//! it in the request extensions. Handlers receive the user through
//! the `FromRequestParts` extractor below.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::errors::ApiError;
use crate::shared::state::AppState;

/// Standard platform roles carried in token claims
pub struct Roles;

impl Roles {
    pub const LEARNER: &'static str = "learner";
    pub const STAFF: &'static str = "staff";
    pub const ORG_ADMIN: &'static str = "org_admin";
    pub const SERVICE: &'static str = "service";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: Option<String>,
    pub email: Option<String>,
    pub roles: Option<Vec<String>>,
    pub org: Option<String>,
}

/// Authenticated user context extracted from request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub organization_id: Option<Uuid>,
    pub token_claims: Option<TokenClaims>,
}

impl AuthenticatedUser {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            email: None,
            roles: vec![Roles::LEARNER.to_string()],
            organization_id: None,
            token_claims: None,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user_id: Uuid::nil(),
            email: None,
            roles: vec!["anonymous".to_string()],
            organization_id: None,
            token_claims: None,
        }
    }

    pub fn with_email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_organization(mut self, org_id: Uuid) -> Self {
        self.organization_id = Some(org_id);
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(&role.to_string())
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| self.roles.contains(&r.to_string()))
    }

    pub fn is_authenticated(&self) -> bool {
        !self.user_id.is_nil()
    }

    /// Staff role gate for catalog authoring routes
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.has_role(Roles::STAFF) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("staff role required".to_string()))
        }
    }

    /// Org admin gate, returns the admin's organization
    pub fn require_org_admin(&self) -> Result<Uuid, ApiError> {
        if !self.has_role(Roles::ORG_ADMIN) {
            return Err(ApiError::Forbidden(
                "organization admin role required".to_string(),
            ));
        }
        self.organization_id
            .ok_or_else(|| ApiError::Validation("organization context required".to_string()))
    }

    pub fn require_any_role(&self, roles: &[&str]) -> Result<(), ApiError> {
        if self.has_any_role(roles) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "required role: {}",
                roles.join(" or ")
            )))
        }
    }
}

/// Extract and validate user authentication, adding context to extensions.
/// Invalid or missing tokens degrade to the anonymous user; route-level
/// guards decide whether that is acceptable.
pub async fn authentication_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let user = match extract_and_validate_user(&request, &state.config.jwt_secret) {
        Ok(user) => user,
        Err(_) => AuthenticatedUser::anonymous(),
    };

    // Staff may act on behalf of an organization via header when the
    // token itself carries none
    let user = if user.organization_id.is_none() && user.has_role(Roles::STAFF) {
        match extract_organization_header(&request) {
            Some(org_id) => user.with_organization(org_id),
            None => user,
        }
    } else {
        user
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Require authentication - returns 401 if not authenticated
pub async fn require_authentication_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .cloned()
        .unwrap_or_else(AuthenticatedUser::anonymous);

    if !user.is_authenticated() {
        return Err(ApiError::Unauthorized.into_response());
    }

    Ok(next.run(request).await)
}

fn extract_organization_header(request: &Request<Body>) -> Option<Uuid> {
    request
        .headers()
        .get("X-Organization-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn extract_and_validate_user(
    request: &Request<Body>,
    secret: &str,
) -> Result<AuthenticatedUser, AuthError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = if let Some(stripped) = auth_header.strip_prefix("Bearer ") {
        stripped
    } else {
        return Err(AuthError::InvalidFormat);
    };

    let claims = validate_jwt(token, secret)?;
    user_from_claims(claims)
}

fn user_from_claims(claims: TokenClaims) -> Result<AuthenticatedUser, AuthError> {
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AuthError::InvalidToken("Invalid user ID".to_string()))?;

    let mut user = AuthenticatedUser::new(user_id);

    if let Some(email) = claims.email.clone() {
        user = user.with_email(email);
    }
    if let Some(roles) = claims.roles.clone() {
        if !roles.is_empty() {
            user = user.with_roles(roles);
        }
    }
    if let Some(org) = claims.org.as_deref() {
        let org_id = Uuid::parse_str(org)
            .map_err(|_| AuthError::InvalidToken("Invalid organization ID".to_string()))?;
        user = user.with_organization(org_id);
    }

    Ok(AuthenticatedUser {
        token_claims: Some(claims),
        ..user
    })
}

/// Validate JWT token and extract claims using jsonwebtoken crate
fn validate_jwt(token: &str, secret: &str) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_nbf = false;
    validation.set_required_spec_claims(&["sub", "exp"]);

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());

    match decode::<TokenClaims>(token, &decoding_key, &validation) {
        Ok(token_data) => Ok(token_data.claims),
        Err(e) => match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Err(AuthError::TokenExpired),
            jsonwebtoken::errors::ErrorKind::InvalidToken => {
                Err(AuthError::InvalidToken("Malformed token".to_string()))
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                Err(AuthError::InvalidToken("Invalid signature".to_string()))
            }
            jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(claim) => Err(
                AuthError::InvalidToken(format!("Missing required claim: {}", claim)),
            ),
            _ => Err(AuthError::InvalidToken(format!(
                "Token validation failed: {}",
                e
            ))),
        },
    }
}

#[derive(Debug)]
enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken(String),
    TokenExpired,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingToken => write!(f, "Missing authorization token"),
            Self::InvalidFormat => write!(f, "Invalid authorization format"),
            Self::InvalidToken(msg) => write!(f, "Invalid token: {msg}"),
            Self::TokenExpired => write!(f, "Token expired"),
        }
    }
}

/// Axum extractor for AuthenticatedUser
#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "Authentication required"
                })),
            ))
    }
}
