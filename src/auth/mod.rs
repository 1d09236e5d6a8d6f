//! Axum extractors for staff routes.
//!
//! ```rust,ignore
//! async fn export(staff: Staff<AdminOnly>) -> Result<Response, AppError> { .. }
//! ```
//!
//! A handler taking `Staff<R>` only runs once the [`AccessGuard`] has
//! granted the caller one of `R::ROLES`.
//!
//! [`AccessGuard`]: crate::services::AccessGuard

use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header, request::Parts},
};
use serde::Deserialize;

use crate::models::{Role, Session};
use crate::services::guard::{ADMIN_ONLY, ANY_SESSION, CHECKIN_STAFF};
use crate::services::Access;
use crate::state::AppState;
use crate::utils::error::AppError;

/// Bearer token from `Authorization: Bearer <token>`. Event streams cannot
/// set headers from the browser, so `?access_token=` is accepted too.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[derive(Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
            let token = value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    AppError::AuthError(
                        "Invalid authorization format. Expected 'Bearer <token>'".to_string(),
                    )
                })?;
            return Ok(Self(token.to_string()));
        }

        let Query(query) = Query::<TokenQuery>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::AuthError("Missing authorization header".to_string()))?;

        query
            .access_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(Self)
            .ok_or_else(|| AppError::AuthError("Missing authorization header".to_string()))
    }
}

pub trait RoleSet: Send + Sync + 'static {
    const ROLES: &'static [Role];
}

#[derive(Debug, Clone, Copy)]
pub struct AdminOnly;

#[derive(Debug, Clone, Copy)]
pub struct CheckinStaff;

#[derive(Debug, Clone, Copy)]
pub struct AnySession;

impl RoleSet for AdminOnly {
    const ROLES: &'static [Role] = ADMIN_ONLY;
}

impl RoleSet for CheckinStaff {
    const ROLES: &'static [Role] = CHECKIN_STAFF;
}

impl RoleSet for AnySession {
    const ROLES: &'static [Role] = ANY_SESSION;
}

/// A caller the guard has let through for role set `R`.
#[derive(Debug, Clone)]
pub struct Staff<R: RoleSet> {
    pub session: Session,
    pub token: String,
    _roles: PhantomData<R>,
}

#[async_trait]
impl<R: RoleSet> FromRequestParts<AppState> for Staff<R> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;

        match state.guard.evaluate(Some(&token), R::ROLES).await {
            Access::Granted(session) => Ok(Self {
                session,
                token,
                _roles: PhantomData,
            }),
            Access::Forbidden => Err(AppError::Forbidden(
                "Your account does not have access here. You have been signed out.".to_string(),
            )),
            Access::Unauthenticated | Access::Checking => Err(AppError::AuthError(
                "Sign in to continue".to_string(),
            )),
        }
    }
}
