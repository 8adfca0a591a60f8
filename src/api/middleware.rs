//! Middleware Components
//!
//! CORS, request tracking and caller identity.

use super::errors::ApiError;
use crate::games::types::Role;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer, ExposeHeaders};
use uuid::Uuid;

/// Request ID header key
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Account id of the authenticated caller, set by the upstream web layer
pub const ACCOUNT_ID_HEADER: &str = "x-account-id";

/// `admin` or `user`; absent means `user`
pub const ACCOUNT_ROLE_HEADER: &str = "x-account-role";

/// Create CORS middleware with configurable origins
pub fn create_cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    let expose = ExposeHeaders::list([HeaderName::from_static(REQUEST_ID_HEADER)]);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(expose)
    } else {
        CorsLayer::new()
            .allow_origin(
                allowed_origins
                    .into_iter()
                    .filter_map(|o| o.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
            .expose_headers(expose)
    }
}

/// Middleware to add request ID to all requests
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    // Honour an id supplied by the client
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Request ID wrapper for extracting in handlers
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn request_id_of(parts: &Parts) -> String {
    parts
        .extensions
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Identity resolved by the upstream layer. Credentials are never checked here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub account_id: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins may act on any account, users only on their own
    pub fn ensure_can_access(&self, account_id: &str, request_id: &str) -> Result<(), ApiError> {
        if self.is_admin() || self.account_id == account_id {
            Ok(())
        } else {
            Err(ApiError::forbidden(
                request_id,
                format!("{} may not access account {}", self.account_id, account_id),
            ))
        }
    }

    pub fn ensure_admin(&self, request_id: &str) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden(request_id, "admin role required"))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = request_id_of(parts);
        let account_id = parts
            .headers
            .get(ACCOUNT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ApiError::unauthorized(&request_id, format!("missing {} header", ACCOUNT_ID_HEADER))
            })?
            .to_string();

        let role = match parts
            .headers
            .get(ACCOUNT_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_lowercase())
            .as_deref()
        {
            None | Some("user") => Role::User,
            Some("admin") => Role::Admin,
            Some(other) => {
                return Err(ApiError::bad_request(
                    &request_id,
                    format!("unknown role '{}'", other),
                ))
            }
        };

        Ok(Caller { account_id, role })
    }
}
