//! Request pipeline stages.
//!
//! From the outside in: subnet authorization, signature verification,
//! decryption, gzip decompression. Each stage is only installed when its
//! configuration is present.

pub mod decompress;
pub mod decrypt;
pub mod signature;
pub mod subnet;

use axum::body::{Body, Bytes, to_bytes};

use super::error::ApiError;

/// Upper bound on request bodies buffered by the pipeline.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub(crate) async fn read_body(body: Body) -> Result<Bytes, ApiError> {
    to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("failed to read request body: {e}")))
}
