//! Caller identity extractor.
//!
//! Token validation happens in the authenticating reverse proxy; by the
//! time a request reaches the gateway the verified subject and group
//! claims arrive as headers.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use lectern_core::Principal;

use crate::error::ApiError;

pub const SUBJECT_HEADER: &str = "x-user-id";
pub const GROUPS_HEADER: &str = "x-user-groups";

/// Extractor wrapper around [`Principal`]. Rejects with 401 when the
/// identity headers are absent.
pub struct Caller(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let subject = parts
            .headers
            .get(SUBJECT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::unauthorized("missing caller identity"))?
            .to_string();

        let groups = parts
            .headers
            .get(GROUPS_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(parse_groups)
            .unwrap_or_default();

        Ok(Caller(Principal { subject, groups }))
    }
}

fn parse_groups(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(|group| {
            if group.starts_with('/') {
                group.to_string()
            } else {
                format!("/{group}")
            }
        })
        .collect()
}
