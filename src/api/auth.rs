//! Registration, login and bearer-token extraction.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::sync::Arc;

use crate::db::{AuthResponse, LoginRequest, RegisterRequest, Role, User, UserResponse};
use crate::services::identity::{self, AuthSession, NewUser};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::rate_limit::{guard_login, ClientIp};
use super::response::{ApiJson, ApiResponse, ApiResult};
use super::validation::{
    parse_role, validate_email, validate_password, validate_password_confirmation, validate_text,
};

/// Minimum password length accepted at login, before credentials are checked
const LOGIN_MIN_PASSWORD: usize = 6;

/// Extract the bearer token from request headers
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Any authenticated user
#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Unauthenticated"))?;

        identity::authenticate(&state.db, state.clock.as_ref(), token)
            .await
            .map_err(|e| match e {
                crate::services::ServiceError::Authentication => {
                    ApiError::unauthorized("Unauthenticated")
                }
                other => ApiError::from(other),
            })
    }
}

/// An authenticated partner account
pub struct Partner(pub User);

/// An authenticated client account
pub struct Client(pub User);

async fn require_role(
    parts: &mut Parts,
    state: &Arc<AppState>,
    role: Role,
) -> Result<User, ApiError> {
    let session = AuthSession::from_request_parts(parts, state).await?;
    session.require(role)?;
    Ok(session.user)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Partner {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        require_role(parts, state, Role::Partner).await.map(Partner)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Client {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        require_role(parts, state, Role::Client).await.map(Client)
    }
}

fn validate_register_request(req: &RegisterRequest, min_password: usize) -> Result<Role, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    errors.check("name", validate_text(&req.name, "name", 255));
    errors.check("email", validate_email(&req.email));
    errors.check("country", validate_text(&req.country, "country", 255));
    errors.check("city", validate_text(&req.city, "city", 255));
    errors.check("job", validate_text(&req.job, "job", 255));
    errors.check("password", validate_password(&req.password, min_password));
    errors.check(
        "password",
        validate_password_confirmation(&req.password, &req.password_confirmation),
    );

    let role = match parse_role(&req.role) {
        Ok(role) => Some(role),
        Err(message) => {
            errors.add("role", message);
            None
        }
    };

    errors.finish()?;
    role.ok_or_else(|| ApiError::validation_field("role", "The role field is required."))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    let role = validate_register_request(&req, state.config.auth.min_password_length)?;

    let new_user = NewUser {
        name: req.name.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        country: req.country.trim().to_string(),
        city: req.city.trim().to_string(),
        job: req.job.trim().to_string(),
        description: req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        role,
        password: req.password,
    };

    let (user, token) =
        identity::register(&state.db, state.clock.as_ref(), &state.config.auth, new_user).await?;

    Ok(ApiResponse::created(
        "User registered successfully",
        AuthResponse::bearer(user, token),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(req.email.trim()));
    errors.check("password", validate_password(&req.password, LOGIN_MIN_PASSWORD));
    errors.finish()?;

    let email = req.email.trim().to_lowercase();
    guard_login(&state.rate_limiter, ip, &email)?;

    let (user, token) = identity::login(
        &state.db,
        state.clock.as_ref(),
        &state.config.auth,
        &email,
        &req.password,
    )
    .await?;

    Ok(ApiResponse::ok(AuthResponse::bearer(user, token)).with_message("Login successful"))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<Arc<AppState>>, session: AuthSession) -> ApiResult<()> {
    identity::logout(&state.db, &session).await?;
    Ok(ApiResponse::message("Logged out successfully"))
}

/// GET /api/auth/me
pub async fn me(session: AuthSession) -> ApiResult<UserResponse> {
    Ok(ApiResponse::ok(UserResponse::from(session.user)))
}
