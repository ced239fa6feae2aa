// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Request correlation helpers
//!
//! The trace id travels in the `X-Trace-Id` header and is attached to every
//! error envelope. Client addresses are resolved from the usual proxy
//! headers before falling back to the peer address.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use http::header::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the request trace id
pub const TRACE_ID_HEADER: &str = "x-trace-id";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const REAL_IP_HEADER: &str = "x-real-ip";

/// A short id correlating an API response with the server logs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(String);

impl TraceId {
    /// Generate a fresh trace id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string()[..8].to_owned())
    }

    /// Read the trace id from the request headers, generating one if absent
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(TRACE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_owned()))
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TraceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

/// Resolve the client address of a request
///
/// Honors `X-Forwarded-For` (first hop), then `X-Real-IP`, then the peer
/// address of the connection.
pub fn resolve_client_ip(headers: &HeaderMap, remote: Option<IpAddr>) -> Option<String> {
    let from_header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    };

    from_header(FORWARDED_FOR_HEADER)
        .or_else(|| from_header(REAL_IP_HEADER))
        .or_else(|| remote.map(|addr| addr.to_string()))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn trace_id_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(TRACE_ID_HEADER, "abc12345".parse().unwrap());
        assert_eq!(TraceId::from_headers(&headers).as_str(), "abc12345");

        let generated = TraceId::from_headers(&HeaderMap::new());
        assert_eq!(generated.as_str().len(), 8);
    }

    #[test]
    fn forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert(REAL_IP_HEADER, "10.0.0.2".parse().unwrap());

        let ip = resolve_client_ip(&headers, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn falls_back_to_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, "  ".parse().unwrap());

        let ip = resolve_client_ip(&headers, Some("192.0.2.1".parse().unwrap()));
        assert_eq!(ip.as_deref(), Some("192.0.2.1"));

        assert_eq!(resolve_client_ip(&HeaderMap::new(), None), None);
    }
}
