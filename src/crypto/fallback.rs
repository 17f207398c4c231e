//! Keyed XOR packet protection.
//!
//! Not secure, for testing and loopback tooling only. It has the same shape as
//! a real AEAD provider: a per-level key, a nonce built from the packet number,
//! a fixed-size tag bound to the header, and a mask computed from a sample.

use super::{ConnectionSecrets, EncryptionLevel, SAMPLE_LEN};
use crate::quic::error::CryptoError;
use anyhow::{Result, bail};
use std::collections::HashMap;
use tracing::debug;

const TAG_LEN: usize = 16;

#[derive(Debug, Clone)]
struct LevelKeys {
    key: [u8; 32],
    iv: [u8; 12],
    hp_key: [u8; 16],
}

impl LevelKeys {
    fn derive(secret: &[u8], level: EncryptionLevel) -> Self {
        let mut key = [0u8; 32];
        let mut iv = [0u8; 12];
        let mut hp_key = [0u8; 16];
        let salt = level as u8 + 1;

        for (i, b) in key.iter_mut().enumerate() {
            *b = secret[i % secret.len()] ^ salt.wrapping_mul(i as u8 + 1);
        }
        for (i, b) in iv.iter_mut().enumerate() {
            *b = secret[(i + 7) % secret.len()].rotate_left(3) ^ salt;
        }
        for (i, b) in hp_key.iter_mut().enumerate() {
            *b = secret[(i + 13) % secret.len()].rotate_left(5) ^ salt.wrapping_add(i as u8);
        }

        Self { key, iv, hp_key }
    }

    fn nonce(&self, packet_number: u64) -> [u8; 12] {
        let mut nonce = self.iv;
        for (n, pn) in nonce[4..].iter_mut().zip(packet_number.to_be_bytes()) {
            *n ^= pn;
        }
        nonce
    }

    fn keystream(&self, packet_number: u64, len: usize) -> impl Iterator<Item = u8> + '_ {
        let nonce = self.nonce(packet_number);
        (0..len).map(move |i| self.key[i % self.key.len()] ^ nonce[i % nonce.len()] ^ (i as u8))
    }

    fn tag(&self, header: &[u8], body: &[u8]) -> [u8; TAG_LEN] {
        let mut tag = [0u8; TAG_LEN];
        for (i, b) in header.iter().chain(body).enumerate() {
            let slot = i % TAG_LEN;
            tag[slot] = tag[slot].rotate_left(1) ^ b ^ self.key[slot];
        }
        tag
    }
}

/// Insecure [`ConnectionSecrets`] with XOR "encryption" and a checksum tag.
#[derive(Debug, Clone, Default)]
pub struct FallbackSecrets {
    levels: HashMap<EncryptionLevel, LevelKeys>,
}

impl FallbackSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys for every level derived from one shared secret, the way both
    /// endpoints of a loopback test would derive them.
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut secrets = Self::new();
        for level in [
            EncryptionLevel::Initial,
            EncryptionLevel::ZeroRtt,
            EncryptionLevel::Handshake,
            EncryptionLevel::Application,
        ] {
            secrets.install(level, secret);
        }
        secrets
    }

    /// Install keys for `level`. An empty secret is ignored.
    pub fn install(&mut self, level: EncryptionLevel, secret: &[u8]) {
        if secret.is_empty() {
            return;
        }
        debug!(%level, "Installed fallback packet protection keys");
        self.levels.insert(level, LevelKeys::derive(secret, level));
    }

    pub fn discard(&mut self, level: EncryptionLevel) {
        self.levels.remove(&level);
    }

    pub fn has_keys(&self, level: EncryptionLevel) -> bool {
        self.levels.contains_key(&level)
    }

    fn keys(&self, level: EncryptionLevel) -> Result<&LevelKeys> {
        self.levels
            .get(&level)
            .ok_or_else(|| CryptoError::MissingKeys(level.to_string()).into())
    }
}

impl ConnectionSecrets for FallbackSecrets {
    fn tag_len(&self, _level: EncryptionLevel) -> usize {
        TAG_LEN
    }

    fn seal(
        &self,
        level: EncryptionLevel,
        packet_number: u64,
        header: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let keys = self.keys(level)?;
        let mut sealed: Vec<u8> = plaintext
            .iter()
            .zip(keys.keystream(packet_number, plaintext.len()))
            .map(|(p, k)| p ^ k)
            .collect();
        let tag = keys.tag(header, &sealed);
        sealed.extend_from_slice(&tag);
        Ok(sealed)
    }

    fn open(
        &self,
        level: EncryptionLevel,
        packet_number: u64,
        header: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let keys = self.keys(level)?;
        if ciphertext.len() < TAG_LEN {
            bail!("ciphertext shorter than tag");
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_LEN);
        if keys.tag(header, body) != tag {
            bail!("authentication tag mismatch");
        }
        Ok(body
            .iter()
            .zip(keys.keystream(packet_number, body.len()))
            .map(|(c, k)| c ^ k)
            .collect())
    }

    fn header_protection_mask(&self, level: EncryptionLevel, sample: &[u8]) -> Result<[u8; 5]> {
        let keys = self.keys(level)?;
        if sample.len() != SAMPLE_LEN {
            bail!("header protection sample must be {} bytes, got {}", SAMPLE_LEN, sample.len());
        }
        let mut mask = [0u8; 5];
        for (i, b) in sample.iter().enumerate() {
            mask[i % 5] ^= b.wrapping_add(keys.hp_key[i]);
        }
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let secrets = FallbackSecrets::from_secret(b"handshake secret");
        let header = [0xe0, 0xff, 0x00, 0x00, 0x11];
        let sealed = secrets
            .seal(EncryptionLevel::Handshake, 7, &header, b"client finished")
            .unwrap();

        assert_eq!(sealed.len(), 15 + TAG_LEN);
        assert_ne!(&sealed[..15], b"client finished");

        let opened = secrets
            .open(EncryptionLevel::Handshake, 7, &header, &sealed)
            .unwrap();
        assert_eq!(opened, b"client finished");
    }

    #[test]
    fn test_open_rejects_tampered_header() {
        let secrets = FallbackSecrets::from_secret(b"handshake secret");
        let sealed = secrets
            .seal(EncryptionLevel::Handshake, 1, &[0xe0, 0x01], b"data")
            .unwrap();

        assert!(secrets.open(EncryptionLevel::Handshake, 1, &[0xe1, 0x01], &sealed).is_err());
    }

    #[test]
    fn test_levels_use_distinct_keys() {
        let secrets = FallbackSecrets::from_secret(b"shared");
        let a = secrets.seal(EncryptionLevel::Initial, 0, &[], b"same input").unwrap();
        let b = secrets.seal(EncryptionLevel::Handshake, 0, &[], b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_keys() {
        let mut secrets = FallbackSecrets::from_secret(b"shared");
        secrets.discard(EncryptionLevel::Handshake);
        assert!(!secrets.has_keys(EncryptionLevel::Handshake));
        let err = secrets.seal(EncryptionLevel::Handshake, 0, &[], b"x").unwrap_err();
        assert_eq!(
            err.downcast_ref::<CryptoError>(),
            Some(&CryptoError::MissingKeys("handshake".to_string()))
        );
        assert!(secrets.header_protection_mask(EncryptionLevel::Handshake, &[0u8; 16]).is_err());
    }

    #[test]
    fn test_mask_depends_on_sample() {
        let secrets = FallbackSecrets::from_secret(b"shared");
        let m1 = secrets.header_protection_mask(EncryptionLevel::Handshake, &[0u8; 16]).unwrap();
        let m2 = secrets.header_protection_mask(EncryptionLevel::Handshake, &[1u8; 16]).unwrap();
        assert_ne!(m1, m2);
        assert!(secrets.header_protection_mask(EncryptionLevel::Handshake, &[0u8; 8]).is_err());
    }
}
