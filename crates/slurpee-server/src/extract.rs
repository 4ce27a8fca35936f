//! Custom extractors for Axum.
//!
//! Slurpee has no session layer - every handler authenticates itself via a
//! narrow `FromRequestParts` extractor, the same shape a JWT-bearer-token
//! extractor takes, just swapped for the header pair/compare this broker
//! actually uses.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

use slurpee_auth::{admin, secret};
use slurpee_core::error::Error as CoreError;

use crate::error::HttpError;
use crate::state::AppState;

const SECRET_ID_HEADER: &str = "x-slurpee-secret-id";
const SECRET_HEADER: &str = "x-slurpee-secret";
const ADMIN_SECRET_HEADER: &str = "x-slurpee-admin-secret";

/// A verified publisher, carrying the scope (`subject_pattern`) its secret
/// is allowed to publish/read under.
#[derive(Debug, Clone)]
pub struct PublisherSecret {
    pub secret_id: Uuid,
    pub subject_pattern: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for PublisherSecret
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let secret_id_header = parts
            .headers
            .get(SECRET_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(CoreError::Authentication)?;
        let secret_id = Uuid::parse_str(secret_id_header)
            .map_err(|_| CoreError::invalid_input("X-Slurpee-Secret-ID", "must be a UUID"))?;

        let plaintext = parts
            .headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(CoreError::Authentication)?;

        let record = app_state
            .store
            .get_api_secret(secret_id)
            .await?
            .ok_or(CoreError::Authentication)?;

        if !secret::verify_secret(plaintext, &record.secret_hash) {
            return Err(CoreError::Authentication.into());
        }

        Ok(PublisherSecret {
            secret_id: record.id,
            subject_pattern: record.subject_pattern,
        })
    }
}

impl PublisherSecret {
    /// Checks that the event's subject matches this secret's publish
    /// scope.
    pub fn authorizes(&self, subject: &str) -> Result<(), CoreError> {
        if slurpee_cache::pattern::matches(&self.subject_pattern, subject) {
            Ok(())
        } else {
            Err(CoreError::OutOfScope {
                subject: subject.to_string(),
            })
        }
    }
}

/// A verified admin caller.
#[derive(Debug, Clone, Copy)]
pub struct AdminSecret;

#[async_trait]
impl<S> FromRequestParts<S> for AdminSecret
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let presented = parts
            .headers
            .get(ADMIN_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(CoreError::Authentication)?;

        if admin::verify_admin_secret(presented, &app_state.config.server.admin_secret) {
            Ok(AdminSecret)
        } else {
            Err(CoreError::Authentication.into())
        }
    }
}

/// Path parameter extracted as a UUID, rejecting with a 400 (not a panic
/// or a 404) on malformed input.
pub struct PathId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(raw) = axum::extract::Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| HttpError::bad_request("missing path parameter"))?;
        let id = Uuid::parse_str(&raw)
            .map_err(|_| HttpError::bad_request("path parameter must be a UUID"))?;
        Ok(PathId(id))
    }
}
