use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use domains::DomainError;

use super::{ApiError, AppState};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// The address a request originated from. Behind a trusted proxy this is the
/// first hop of `X-Forwarded-For`, otherwise the peer of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub IpAddr);

fn resolve(parts: &Parts, trust_forwarded_for: bool) -> Result<Option<IpAddr>, ApiError> {
    if trust_forwarded_for {
        if let Some(header) = parts.headers.get(FORWARDED_FOR) {
            let first = header
                .to_str()
                .ok()
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .unwrap_or_default();
            return first.parse().map(Some).map_err(|_| {
                DomainError::validation("ip_address", format!("`{first}` is not an IP address"))
                    .into()
            });
        }
    }
    Ok(parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip()))
}

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve(parts, state.trust_forwarded_for)?
            .map(ClientAddr)
            .ok_or(ApiError::UnknownClient)
    }
}

impl OptionalFromRequestParts<AppState> for ClientAddr {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(resolve(parts, state.trust_forwarded_for)?.map(ClientAddr))
    }
}
