//! Packet protection seam
//!
//! The codec never implements ciphers itself. It asks a [`ConnectionSecrets`]
//! provider, owned by the connection layer, to seal and open payloads and to
//! produce header protection masks for a given [`EncryptionLevel`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod fallback;

pub use fallback::FallbackSecrets;

/// Size of the ciphertext sample used to derive a header protection mask.
pub const SAMPLE_LEN: usize = 16;

/// Encryption levels for QUIC packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionLevel {
    /// Initial packets (connection establishment)
    Initial,
    /// Early data (0-RTT)
    ZeroRtt,
    /// Handshake packets
    Handshake,
    /// Application data (1-RTT)
    Application,
}

impl fmt::Display for EncryptionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncryptionLevel::Initial => "initial",
            EncryptionLevel::ZeroRtt => "0-rtt",
            EncryptionLevel::Handshake => "handshake",
            EncryptionLevel::Application => "1-rtt",
        };
        f.write_str(name)
    }
}

/// Key material and ciphers for one connection, selected per encryption level.
pub trait ConnectionSecrets: Send + Sync + fmt::Debug {
    /// Bytes the AEAD appends to every sealed payload.
    fn tag_len(&self, level: EncryptionLevel) -> usize;

    /// Seal `plaintext` with `header` as associated data.
    fn seal(
        &self,
        level: EncryptionLevel,
        packet_number: u64,
        header: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Open `ciphertext` (including its tag) with `header` as associated data.
    fn open(
        &self,
        level: EncryptionLevel,
        packet_number: u64,
        header: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Header protection mask for a [`SAMPLE_LEN`]-byte ciphertext sample.
    fn header_protection_mask(&self, level: EncryptionLevel, sample: &[u8]) -> Result<[u8; 5]>;
}
