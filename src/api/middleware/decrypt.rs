//! Whole-body RSA decryption

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        HeaderValue,
        header::{CONTENT_ENCODING, CONTENT_LENGTH},
    },
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::read_body;
use crate::api::error::ApiError;
use crate::codec::is_gzip;
use crate::crypto::{ENCRYPTED_HEADER, PrivateKey};

/// Decrypt bodies flagged with `Content-Encrypted: true`.
///
/// A decrypted gzip stream is handed on with `Content-Encoding: gzip` so the
/// decompression stage inflates it.
pub async fn decrypt_request(
    State(key): State<Arc<PrivateKey>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let encrypted = request
        .headers()
        .get(ENCRYPTED_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    if !encrypted {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let ciphertext = read_body(body).await?;

    let plain = key.decrypt(&ciphertext).map_err(|e| {
        debug!("rejecting request: {e}");
        ApiError::InvalidRequest("failed to decrypt request body".to_string())
    })?;

    parts.headers.remove(ENCRYPTED_HEADER);
    parts.headers.remove(CONTENT_LENGTH);
    if is_gzip(&plain) {
        parts
            .headers
            .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }

    Ok(next.run(Request::from_parts(parts, Body::from(plain))).await)
}
