use chrono::{DateTime, Duration, Utc};
use std::net::IpAddr;

/// Source address of a download request.
///
/// With `X-Forwarded-For` present the last comma-separated hop wins (the one
/// appended by the nearest proxy); otherwise the peer socket address is used.
/// This only feeds the download counter and is trivially spoofable.
pub fn client_address(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> Option<String> {
    if let Some(header) = forwarded_for {
        if let Some(hop) = header.rsplit(',').next().map(str::trim) {
            if !hop.is_empty() {
                return Some(hop.to_string());
            }
        }
    }
    peer.map(|ip| unmap(ip).to_string())
}

fn unmap(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

/// Trailing window inside which repeat downloads are not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupWindow(Duration);

impl DedupWindow {
    pub fn hours(hours: i64) -> Self {
        Self(Duration::hours(hours))
    }

    /// Earlier downloads strictly after this instant suppress a new row.
    pub fn cutoff(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at - self.0
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::hours(24)
    }
}
