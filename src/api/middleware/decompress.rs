//! Transparent gzip request decompression

use axum::{
    body::Body,
    extract::Request,
    http::header::{CONTENT_ENCODING, CONTENT_LENGTH, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::trace;

use super::read_body;
use crate::api::error::ApiError;
use crate::codec::gunzip;

fn is_gzip_encoded(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|encoding| encoding.trim().eq_ignore_ascii_case("gzip"))
}

/// Inflate `Content-Encoding: gzip` bodies before they reach the handler.
pub async fn decompress_request(request: Request, next: Next) -> Result<Response, ApiError> {
    if !is_gzip_encoded(request.headers()) {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let compressed = read_body(body).await?;

    let plain = if compressed.is_empty() {
        Vec::new()
    } else {
        gunzip(&compressed)
            .map_err(|e| ApiError::InvalidRequest(format!("malformed gzip body: {e}")))?
    };

    trace!("inflated {} bytes to {}", compressed.len(), plain.len());

    parts.headers.remove(CONTENT_ENCODING);
    parts.headers.remove(CONTENT_LENGTH);

    Ok(next.run(Request::from_parts(parts, Body::from(plain))).await)
}
