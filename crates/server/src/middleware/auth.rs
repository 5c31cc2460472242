use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    services::access::Role,
    AppState,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64, // user id
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
    // Caller address, recorded with audit events
    pub source: Option<String>,
}

// Present on public routes: `None` for anonymous callers.
#[derive(Clone, Debug)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

pub fn create_token(
    user_id: i64,
    username: &str,
    role: Role,
    secret: &str,
    ttl_days: i64,
) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::days(ttl_days))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

pub fn user_from_claims(claims: Claims, source: Option<String>) -> AuthUser {
    AuthUser {
        id: claims.sub,
        username: claims.username,
        role: claims.role,
        source,
    }
}

// Attaches an `AuthUser` when a bearer token is sent. A bad token is
// rejected outright; a missing one is left to the route's extractors.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_owned);

    if let Some(token) = token {
        let claims = decode_token(&token, &state.config.jwt_secret)
            .map_err(|_| StatusCode::UNAUTHORIZED)?;
        let source = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        request
            .extensions_mut()
            .insert(user_from_claims(claims, source));
    }

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(parts.extensions.get::<AuthUser>().cloned()))
    }
}
