use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{
    state::AppState,
    users::{
        claims::Role,
        dto::{
            CreateUserInput, SendVerificationRequest, TokenRequest, TokenResponse, User,
            VerifiedToken, VerifyTokenRequest,
        },
        extractors::AuthUser,
        jwt::TokenError,
        services::UserError,
        verification::VerificationError,
    },
};

type ApiError = (StatusCode, String);

impl From<UserError> for (StatusCode, String) {
    fn from(e: UserError) -> Self {
        let status = match &e {
            UserError::Validation(_)
            | UserError::Token(TokenError::Validation(_))
            | UserError::Verification(VerificationError::Validation(_)) => StatusCode::BAD_REQUEST,
            UserError::AlreadyExists => StatusCode::CONFLICT,
            UserError::NotFound => StatusCode::NOT_FOUND,
            UserError::InvalidCredentials
            | UserError::Token(
                TokenError::Empty | TokenError::Invalid | TokenError::Expired | TokenError::Claims(_),
            ) => StatusCode::UNAUTHORIZED,
            UserError::Token(TokenError::InvalidRole(_)) => StatusCode::FORBIDDEN,
            UserError::EmailVerificationDisabled => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %e, "request failed");
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                return (status, "internal error".into());
            }
        }
        (status, e.to_string())
    }
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", get(fetch_user).delete(delete_user))
        .route("/users/:id/email-verification", post(send_verification))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/token", post(generate_token))
        .route("/auth/verify", post(verify_token))
        .route("/me", get(get_me))
}

fn ensure_self_or_admin(caller: &VerifiedToken, id: &str) -> Result<(), ApiError> {
    let is_self = Uuid::parse_str(id).map(|id| id == caller.id).unwrap_or(false);
    if is_self || caller.role == Role::Admin {
        return Ok(());
    }
    warn!(caller = %caller.id, target = %id, "forbidden");
    Err((StatusCode::FORBIDDEN, "Forbidden".into()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.users.create(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, caller))]
pub async fn fetch_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    ensure_self_or_admin(&caller, &id)?;
    Ok(Json(state.users.fetch_by_id(&id).await?))
}

#[instrument(skip(state, caller))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    ensure_self_or_admin(&caller, &id)?;
    state.users.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, caller, payload))]
pub async fn send_verification(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<SendVerificationRequest>,
) -> Result<StatusCode, ApiError> {
    ensure_self_or_admin(&caller, &id)?;
    state
        .users
        .send_email_verification(&id, &payload.username, &payload.email)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state, payload))]
pub async fn generate_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state
        .users
        .generate_token(&payload.email, &payload.password)
        .await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, payload))]
pub async fn verify_token(
    State(state): State<AppState>,
    Json(payload): Json<VerifyTokenRequest>,
) -> Result<Json<VerifiedToken>, ApiError> {
    Ok(Json(state.users.verify_token(&payload.token).await?))
}

#[instrument(skip(state, caller))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.fetch_by_id(&caller.id.to_string()).await?))
}
