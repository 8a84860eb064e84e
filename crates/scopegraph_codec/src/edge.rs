//! Identifiers of edge records.

use crate::error::{CodecError, CodecResult};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use std::fmt;
use std::str::FromStr;

/// Identifier of an edge record such as "image has component".
///
/// Rendered as `base64(parent):base64(child)` with unpadded standard
/// base64, so either endpoint may itself contain `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId {
    /// Id of the parent endpoint.
    pub parent: String,
    /// Id of the child endpoint.
    pub child: String,
}

impl EdgeId {
    /// Creates an edge id from its endpoints.
    pub fn new(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }

    /// Parses a rendered edge id.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidEdgeId`] when the value is not two
    /// base64 halves joined by `:` or a half is not UTF-8.
    pub fn parse(value: &str) -> CodecResult<Self> {
        let (parent, child) = value
            .split_once(':')
            .ok_or_else(|| CodecError::invalid_edge_id(value))?;
        Ok(Self {
            parent: decode_half(value, parent)?,
            child: decode_half(value, child)?,
        })
    }
}

fn decode_half(whole: &str, half: &str) -> CodecResult<String> {
    let bytes = STANDARD_NO_PAD
        .decode(half)
        .map_err(|_| CodecError::invalid_edge_id(whole))?;
    String::from_utf8(bytes).map_err(|_| CodecError::invalid_edge_id(whole))
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            STANDARD_NO_PAD.encode(self.parent.as_bytes()),
            STANDARD_NO_PAD.encode(self.child.as_bytes())
        )
    }
}

impl FromStr for EdgeId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_base64_halves() {
        let edge = EdgeId::new("img", "comp");
        assert_eq!(edge.to_string(), "aW1n:Y29tcA");
    }

    #[test]
    fn endpoints_may_contain_colons() {
        let edge = EdgeId::new("sha256:abc", "openssl#1.1:debian");
        let parsed: EdgeId = edge.to_string().parse().unwrap();
        assert_eq!(parsed, edge);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(EdgeId::parse("no-separator").is_err());
        assert!(EdgeId::parse("!!!:Y29tcA").is_err());
    }
}
