//! Who is calling: peer address, optional forwarding header, user agent

use axum::http::{header::USER_AGENT, HeaderMap};
use raffle_core::{ClientInfo, Error, Result};
use std::net::{IpAddr, SocketAddr};

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// First hop of `X-Forwarded-For`, if it parses as an address.
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

pub fn resolve_client(
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
    trust_forwarded_for: bool,
) -> Result<ClientInfo> {
    let forwarded = if trust_forwarded_for {
        forwarded_ip(headers)
    } else {
        None
    };
    let ip = forwarded
        .or_else(|| peer.map(|p| p.ip()))
        .ok_or_else(|| Error::Internal("client address unavailable".into()))?;
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    Ok(ClientInfo::new(ip, user_agent))
}
