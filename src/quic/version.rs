//! QUIC version identifiers
//!
//! Wire formats changed between IETF drafts, so codecs branch on the
//! negotiated version with [`Version::at_least`].

use crate::quic::error::{QuicError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// QUIC version identifier (32-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(u32);

const DRAFT_PREFIX: u32 = 0xff00_0000;

impl Version {
    /// QUIC version 1 (RFC 9000)
    pub const V1: Version = Version(0x0000_0001);

    pub const DRAFT_14: Version = Version::draft(14);
    pub const DRAFT_15: Version = Version::draft(15);
    pub const DRAFT_16: Version = Version::draft(16);
    pub const DRAFT_17: Version = Version::draft(17);
    pub const DRAFT_18: Version = Version::draft(18);
    pub const DRAFT_19: Version = Version::draft(19);
    pub const DRAFT_20: Version = Version::draft(20);
    pub const DRAFT_22: Version = Version::draft(22);
    pub const DRAFT_29: Version = Version::draft(29);
    pub const DRAFT_32: Version = Version::draft(32);

    /// Create a version from its raw wire value
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// IETF draft version `n` (`0xff0000nn`)
    pub const fn draft(n: u8) -> Self {
        Self(DRAFT_PREFIX | n as u32)
    }

    /// Get the raw version number
    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_draft(&self) -> bool {
        self.0 & 0xffff_ff00 == DRAFT_PREFIX
    }

    /// Draft number, if this is an IETF draft version.
    pub fn draft_number(&self) -> Option<u8> {
        self.is_draft().then_some(self.0 as u8)
    }

    /// Check if this is a reserved version for version negotiation testing
    pub fn is_reserved(&self) -> bool {
        (self.0 & 0x0f0f_0f0f) == 0x0a0a_0a0a
    }

    /// Drafts order by number; every non-draft version sorts after all drafts.
    fn ordinal(&self) -> u64 {
        match self.draft_number() {
            Some(n) => u64::from(n),
            None => 0x100 + u64::from(self.0),
        }
    }

    /// True if this version is `other` or a later one.
    pub fn at_least(&self, other: Version) -> bool {
        self.ordinal() >= other.ordinal()
    }

    /// Convert to wire format (big-endian bytes)
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Create from wire format (big-endian bytes)
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::V1
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.draft_number() {
            Some(n) => write!(f, "draft-{}", n),
            None if *self == Version::V1 => write!(f, "v1"),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

impl FromStr for Version {
    type Err = QuicError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s == "v1" || s == "1" {
            return Ok(Version::V1);
        }
        if let Some(n) = s.strip_prefix("draft-") {
            return n
                .parse::<u8>()
                .map(Version::draft)
                .map_err(|e| QuicError::Config(format!("Invalid draft number '{}': {}", n, e)));
        }
        if let Some(hex) = s.strip_prefix("0x") {
            return u32::from_str_radix(hex, 16)
                .map(Version::new)
                .map_err(|e| QuicError::Config(format!("Invalid version '{}': {}", s, e)));
        }
        Err(QuicError::Config(format!("Unrecognized version '{}'", s)))
    }
}

impl TryFrom<String> for Version {
    type Error = QuicError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_ordering() {
        assert!(Version::DRAFT_17.at_least(Version::DRAFT_17));
        assert!(Version::DRAFT_18.at_least(Version::DRAFT_17));
        assert!(!Version::DRAFT_16.at_least(Version::DRAFT_17));
        assert!(!Version::DRAFT_14.at_least(Version::DRAFT_15));
    }

    #[test]
    fn test_final_version_after_drafts() {
        assert!(Version::V1.at_least(Version::DRAFT_20));
        assert!(Version::V1.at_least(Version::DRAFT_17));
        assert!(!Version::DRAFT_20.at_least(Version::V1));
    }

    #[test]
    fn test_wire_values() {
        assert_eq!(Version::DRAFT_17.value(), 0xff00_0011);
        assert_eq!(Version::DRAFT_17.to_bytes(), [0xff, 0x00, 0x00, 0x11]);
        assert_eq!(Version::from_bytes([0xff, 0x00, 0x00, 0x0e]), Version::DRAFT_14);
        assert_eq!(Version::DRAFT_14.draft_number(), Some(14));
        assert_eq!(Version::V1.draft_number(), None);
        assert!(Version::new(0x1a2a_3a4a).is_reserved());
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("draft-17".parse::<Version>().unwrap(), Version::DRAFT_17);
        assert_eq!("V1".parse::<Version>().unwrap(), Version::V1);
        assert_eq!("0xff000010".parse::<Version>().unwrap(), Version::DRAFT_16);
        assert!("draft-x".parse::<Version>().is_err());
        assert!("quic".parse::<Version>().is_err());

        assert_eq!(Version::DRAFT_19.to_string(), "draft-19");
        assert_eq!(Version::V1.to_string(), "v1");
        assert_eq!(Version::new(0x6b33_43cf).to_string(), "0x6b3343cf");
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Version::DRAFT_18).unwrap();
        assert_eq!(json, "\"draft-18\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Version::DRAFT_18);
    }
}
