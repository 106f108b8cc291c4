use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use nextext_types::api::{
    Claims, CurrentUserResponse, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::extract::JsonBody;
use crate::shortcode;
use crate::state::{AppState, run_db, session_user};

/// Sessions last this long before the client has to log in again.
const TOKEN_TTL_DAYS: i64 = 30;

/// Fresh short codes are re-rolled this many times when already taken.
const SHORT_CODE_ATTEMPTS: usize = 8;

pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_string();
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::invalid("Name, Email and Password Required"));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Storage(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let created = run_db(&state, move |db| {
        if db.get_user_by_email(&email)?.is_some() {
            return Ok(None);
        }

        let mut short_code = shortcode::generate();
        for _ in 1..SHORT_CODE_ATTEMPTS {
            if !db.short_code_taken(&short_code)? {
                break;
            }
            short_code = shortcode::generate();
        }

        // A concurrent registration can still win the email; the insert reports it.
        db.create_user(&user_id.to_string(), &name, &email, &password_hash, &short_code)
    })
    .await?
    .ok_or_else(|| ApiError::Conflict("User already exists".into()))?;

    info!("Registered user {} ({})", created.email, created.short_code);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            name: created.name,
            email: created.email,
            short_code: created.short_code,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim().to_string();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::invalid("Email and password required"));
    }

    let user = run_db(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Storage(anyhow::anyhow!("stored hash unreadable: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            warn!("Failed login for {}", user.email);
            ApiError::Unauthorized
        })?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::Storage(anyhow::anyhow!("corrupt user id '{}': {}", user.id, e)))?;

    let token = create_token(&state.jwt_secret, user_id, &user.email)?;

    Ok(Json(LoginResponse {
        token,
        user_id,
        name: user.name,
        email: user.email,
        short_code: user.short_code,
    }))
}

pub async fn current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let user = session_user(&state, &claims).await?;

    Ok(Json(CurrentUserResponse {
        short_code: user.short_code,
        name: user.name,
        email: user.email,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
