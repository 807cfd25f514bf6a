//! HMAC-SHA256 body signature verification

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::read_body;
use crate::api::error::ApiError;
use crate::crypto::{self, SIGNATURE_HEADER};

/// Reject requests whose `HashSHA256` does not match the body as received.
///
/// The accepted signature is echoed on the response.
pub async fn verify_signature(
    State(key): State<Arc<[u8]>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::InvalidRequest(format!("missing {SIGNATURE_HEADER} header")))?;

    let (parts, body) = request.into_parts();
    let body = read_body(body).await?;

    if !crypto::verify(&key, &body, &signature) {
        debug!("signature mismatch on {}", parts.uri);
        return Err(ApiError::InvalidRequest("signature mismatch".to_string()));
    }

    let mut response = next.run(Request::from_parts(parts, Body::from(body))).await;

    if let Ok(value) = HeaderValue::from_str(&signature) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("hashsha256"), value);
    }

    Ok(response)
}
