use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::AuthError;

/// JSON request body whose failures render as `AuthError`.
///
/// An empty body, or one not sent as JSON, deserializes as `T::default()`, so
/// absent fields reach the auth flow and fail there the usual way.
/// Unparseable JSON is `MalformedBody`.
pub struct JsonBody<T>(pub T);

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("application/json") || ct.contains("+json")
        })
        .unwrap_or(false)
}

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let json = is_json(&req);
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            warn!(error = %e, "request body could not be read");
            AuthError::MalformedBody
        })?;

        if !json || bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonBody(T::default()));
        }

        serde_json::from_slice(&bytes).map(JsonBody).map_err(|e| {
            warn!(error = %e, "request body is not valid JSON for this route");
            AuthError::MalformedBody
        })
    }
}
