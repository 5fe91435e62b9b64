//! Middleware for JWT token validation and authentication

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use common::tier::PlanTier;
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::jwt::{Claims, JwtService};
use crate::repositories::UserRepository;

/// Identity of the caller, inserted into request extensions by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    /// Tier at token issuance; not a source of privileges
    pub plan_tier: PlanTier,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            username: claims.username,
            plan_tier: claims.plan_tier,
        }
    }
}

/// Validate the bearer token of a request, if one is present
pub fn bearer_claims(headers: &HeaderMap, jwt_service: &JwtService) -> Option<Claims> {
    let Authorization(bearer) = headers.typed_get::<Authorization<Bearer>>()?;
    jwt_service.validate_token(bearer.token()).ok()
}

/// Extract and validate JWT token from Authorization header
pub async fn auth_middleware(
    State(jwt_service): State<JwtService>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let Authorization(bearer) = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AuthError::Unauthorized("Access token required".to_string()))?;

    let claims = jwt_service.validate_token(bearer.token()).map_err(|e| {
        debug!("Failed to validate token: {}", e);
        AuthError::Unauthorized("Invalid or expired token".to_string())
    })?;

    req.extensions_mut().insert(AuthUser::from(claims));

    Ok(next.run(req).await)
}

/// Allow the request only if the caller is currently an active super-admin
///
/// Must run after [`auth_middleware`]. The account is re-read on every
/// request so a demoted or disabled admin loses access even while their
/// token is still valid.
pub async fn require_admin(
    State(users): State<UserRepository>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let caller_id = req
        .extensions()
        .get::<AuthUser>()
        .map(|user| user.id)
        .ok_or_else(|| AuthError::Unauthorized("Access token required".to_string()))?;

    match users.find_by_id(caller_id).await? {
        Some(user) if user.is_active && user.plan_tier == PlanTier::AdmServer => {
            Ok(next.run(req).await)
        }
        _ => {
            warn!("Rejected admin request from user {}", caller_id);
            Err(AuthError::Forbidden("Admin access required".to_string()))
        }
    }
}

/// Client address: the socket peer, or the first `X-Forwarded-For` entry
/// when the server runs behind a trusted reverse proxy
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_proxy: bool) -> String {
    if !trust_proxy {
        return peer.ip().to_string();
    }

    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.0.0.7:5555".parse().unwrap()
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer(), true), "203.0.113.9");
    }

    #[test]
    fn test_client_ip_ignores_forwarded_header_without_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_ip(&headers, peer(), false), "10.0.0.7");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        assert_eq!(client_ip(&HeaderMap::new(), peer(), true), "10.0.0.7");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        assert_eq!(client_ip(&headers, peer(), true), "10.0.0.7");
    }

    #[test]
    fn test_bearer_claims_ignores_missing_or_bad_tokens() {
        let jwt = JwtService::new(crate::jwt::JwtConfig {
            secret: "secret".to_string(),
            token_expiry: 60,
        });

        assert!(bearer_claims(&HeaderMap::new(), &jwt).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer nope"));
        assert!(bearer_claims(&headers, &jwt).is_none());
    }
}
