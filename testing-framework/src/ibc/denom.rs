// File: testing-framework/src/ibc/denom.rs
//
// ICS-20 denom derivation
//
// A token that crosses a transfer channel is represented on the receiving
// chain by `ibc/<HASH>`, where HASH is the uppercase hex SHA-256 of its full
// trace `port/channel/.../base_denom`.

use sha2::{Digest, Sha256};
use std::fmt;

/// Full trace of a token: the hops it took and its native denom
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DenomTrace {
    /// `port/channel` pairs joined by `/`, empty for a native token
    pub path: String,
    /// Denom on the chain the token originates from
    pub base_denom: String,
}

impl DenomTrace {
    /// Trace of a token that never left its chain
    pub fn native(base_denom: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            base_denom: base_denom.into(),
        }
    }

    /// Parse `port/channel/.../base`
    ///
    /// Leading segments are consumed in `(port, channel-N)` pairs; whatever
    /// follows is the base denom, which may itself contain `/`.
    pub fn parse(full: &str) -> Self {
        let segments: Vec<&str> = full.split('/').collect();
        let mut hops = 0;
        // A hop needs a port, a channel and at least one segment after it
        while segments.len() >= hops * 2 + 3 && is_channel_id(segments[hops * 2 + 1]) {
            hops += 1;
        }

        if hops == 0 {
            return Self::native(full);
        }

        Self {
            path: segments[..hops * 2].join("/"),
            base_denom: segments[hops * 2..].join("/"),
        }
    }

    /// Whether the token is native to the chain holding it
    pub fn is_native(&self) -> bool {
        self.path.is_empty()
    }

    /// Denom as held in account balances: the base denom for a native token,
    /// `ibc/<HASH>` otherwise
    pub fn ibc_denom(&self) -> String {
        if self.is_native() {
            self.base_denom.clone()
        } else {
            ibc_denom(&self.to_string())
        }
    }

    /// Trace of this token after it is received over `(dest_port,
    /// dest_channel)` from a chain that sent it over `(source_port,
    /// source_channel)`
    ///
    /// A token returning over the channel it arrived on has its last hop
    /// removed; any other token gains the destination hop as a prefix.
    pub fn received_over(
        &self,
        source_port: &str,
        source_channel: &str,
        dest_port: &str,
        dest_channel: &str,
    ) -> DenomTrace {
        let source_prefix = format!("{}/{}", source_port, source_channel);
        if self.path == source_prefix {
            return Self::native(self.base_denom.clone());
        }
        if let Some(rest) = self.path.strip_prefix(&format!("{}/", source_prefix)) {
            return Self {
                path: rest.to_string(),
                base_denom: self.base_denom.clone(),
            };
        }

        let hop = format!("{}/{}", dest_port, dest_channel);
        let path = if self.path.is_empty() {
            hop
        } else {
            format!("{}/{}", hop, self.path)
        };
        Self {
            path,
            base_denom: self.base_denom.clone(),
        }
    }
}

impl fmt::Display for DenomTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.base_denom)
        } else {
            write!(f, "{}/{}", self.path, self.base_denom)
        }
    }
}

fn is_channel_id(segment: &str) -> bool {
    segment
        .strip_prefix("channel-")
        .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// `port/channel/denom`
pub fn prefixed_denom(port_id: &str, channel_id: &str, denom: &str) -> String {
    format!("{}/{}/{}", port_id, channel_id, denom)
}

/// `ibc/` followed by the uppercase hex SHA-256 of `trace`
pub fn ibc_denom(trace: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(trace.as_bytes());
    format!("ibc/{}", hex::encode_upper(hasher.finalize()))
}

/// Denom that `denom` will carry on the receiving side of `(port_id,
/// channel_id)`
pub fn transferred_denom(port_id: &str, channel_id: &str, denom: &str) -> String {
    ibc_denom(&prefixed_denom(port_id, channel_id, denom))
}
