//! Trusted subnet authorization

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use ipnet::IpNet;
use tracing::debug;

const REAL_IP: &str = "X-Real-IP";
const FORWARDED_FOR: &str = "X-Forwarded-For";

/// Only let callers inside `subnet` through.
///
/// The caller is taken from `X-Real-IP`, then the first `X-Forwarded-For`
/// entry, then the socket peer address.
pub async fn authorize_subnet(
    State(subnet): State<IpNet>,
    request: Request,
    next: Next,
) -> Result<Response, SubnetError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let ip = client_ip(request.headers(), peer)?.ok_or(SubnetError::UnknownClient)?;

    if !subnet.contains(&ip) {
        debug!("rejecting {ip}, not in {subnet}");
        return Err(SubnetError::Untrusted(ip));
    }

    Ok(next.run(request).await)
}

fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Result<Option<IpAddr>, SubnetError> {
    let forwarded = headers
        .get(REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get(FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        });

    match forwarded {
        Some(raw) => raw
            .parse::<IpAddr>()
            .map(|ip| Some(ip.to_canonical()))
            .map_err(|_| SubnetError::InvalidAddress(raw.to_string())),
        None => Ok(peer.map(|ip| ip.to_canonical())),
    }
}

/// Authorization errors
#[derive(Debug)]
pub enum SubnetError {
    InvalidAddress(String),
    UnknownClient,
    Untrusted(IpAddr),
}

impl IntoResponse for SubnetError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            SubnetError::InvalidAddress(raw) => {
                (StatusCode::BAD_REQUEST, format!("invalid client address: {raw}"))
            }
            SubnetError::UnknownClient => (
                StatusCode::FORBIDDEN,
                "client address could not be determined".to_string(),
            ),
            SubnetError::Untrusted(ip) => (
                StatusCode::FORBIDDEN,
                format!("{ip} is not in the trusted subnet"),
            ),
        };

        (status, message).into_response()
    }
}
