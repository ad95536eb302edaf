use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        AuthUser,
    },
    error::ApiError,
    state::AppState,
};

use super::{
    dto::{
        normalize_email, CreateUserRequest, TokenRequest, TokenResponse, UpdateMeRequest,
        UserResponse,
    },
    repo::User,
};

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let new_user = payload.validate()?;

    // Friendly-path duplicate check; the unique index still backstops races.
    if User::find_by_email(&state.db, &new_user.email).await?.is_some() {
        warn!(email = %new_user.email, "email already registered");
        return Err(ApiError::validation(
            "email",
            "user with this email already exists",
        ));
    }

    let hash = hash_password(&new_user.password)?;
    let user = User::create(&state.db, &new_user.email, &new_user.name, &hash).await?;

    info!(user_id = %user.id, email = %user.email, "user created");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            email: user.email,
            name: user.name,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn create_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let invalid = || {
        ApiError::validation(
            "credentials",
            "unable to authenticate with provided credentials",
        )
    };

    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(invalid());
    }

    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| {
            warn!(email = %email, "token request for unknown email");
            invalid()
        })?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "token request with wrong password");
        return Err(invalid());
    }

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    info!(user_id = %user.id, "token issued");
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = User::find_by_id(&state.db, user_id).await?;
    Ok(Json(UserResponse {
        email: user.email,
        name: user.name,
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let changes = payload.validate()?;
    let password_hash = changes
        .password
        .as_deref()
        .map(hash_password)
        .transpose()?;

    let user = User::update_profile(
        &state.db,
        user_id,
        changes.email.as_deref(),
        changes.name.as_deref(),
        password_hash.as_deref(),
    )
    .await?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(UserResponse {
        email: user.email,
        name: user.name,
    }))
}
