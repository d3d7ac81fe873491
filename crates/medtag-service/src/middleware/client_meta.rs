//! Client metadata middleware.
//!
//! Resolves the caller's IP address and user agent once per request and
//! injects a [`ClientMeta`] into request extensions for handlers and the
//! audit middleware.

use crate::models::ClientMeta;
use crate::routes::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

const MAX_USER_AGENT_LENGTH: usize = 512;

/// First entry of `X-Forwarded-For`, if it parses as an IP address.
fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
}

/// Resolve the client IP.
///
/// The forwarded header is only honoured when the service sits behind a
/// trusted proxy; otherwise the socket peer address is used.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Option<String> {
    let forwarded = if trust_forwarded_for {
        forwarded_for(headers)
    } else {
        None
    };

    forwarded
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|ua| ua.chars().take(MAX_USER_AGENT_LENGTH).collect())
}

pub async fn attach_client_meta(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let meta = ClientMeta {
        ip_address: resolve_client_ip(req.headers(), peer, state.config.trust_forwarded_for),
        user_agent: user_agent(req.headers()),
    };
    req.extensions_mut().insert(meta);

    next.run(req).await
}
