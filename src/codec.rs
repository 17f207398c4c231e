//! Configured packet codec
//!
//! [`PacketCodec`] applies a [`CodecConfig`] around the packet functions:
//! the negotiated version, datagram size and connection ID limits.

use crate::config::CodecConfig;
use crate::crypto::ConnectionSecrets;
use crate::quic::error::{FormatError, ProtocolError, Result};
use crate::quic::packet::{Packet, PacketNumber, QuicPacket, parse_packet};
use crate::quic::version::Version;
use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct PacketCodec {
    config: CodecConfig,
}

impl PacketCodec {
    pub fn new(config: CodecConfig) -> Result<Self> {
        config.validate()?;
        debug!(version = %config.version, max_datagram_size = config.max_datagram_size, "Created packet codec");
        Ok(Self { config })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn version(&self) -> Version {
        self.config.version
    }

    /// Encode one packet into its own datagram.
    pub fn encode(
        &self,
        packet: &Packet,
        secrets: &dyn ConnectionSecrets,
        largest_acked: Option<PacketNumber>,
    ) -> Result<Bytes> {
        self.check_outgoing(packet)?;
        let bytes = packet.encode(secrets, largest_acked)?;
        self.check_size(bytes.len())?;
        self.dump("Encoded", &bytes);
        Ok(bytes)
    }

    /// Coalesce `packets` into one datagram, in order.
    pub fn encode_datagram(
        &self,
        packets: &[Packet],
        secrets: &dyn ConnectionSecrets,
        largest_acked: Option<PacketNumber>,
    ) -> Result<Bytes> {
        let mut datagram = BytesMut::new();
        for packet in packets {
            self.check_outgoing(packet)?;
            let bytes = packet.encode(secrets, largest_acked)?;
            self.check_size(datagram.len() + bytes.len())?;
            datagram.extend_from_slice(&bytes);
        }
        self.dump("Encoded datagram", &datagram);
        Ok(datagram.freeze())
    }

    /// Decode the packet at the front of `buf`.
    pub fn decode(
        &self,
        buf: &mut Bytes,
        secrets: &dyn ConnectionSecrets,
        largest_pn: Option<PacketNumber>,
    ) -> Result<Packet> {
        self.check_size(buf.len())?;
        self.dump("Decoding", buf);
        parse_packet(buf, self.config.version, secrets, largest_pn)
    }

    /// Decode every packet coalesced in `datagram`.
    pub fn decode_datagram(
        &self,
        mut datagram: Bytes,
        secrets: &dyn ConnectionSecrets,
        largest_pn: Option<PacketNumber>,
    ) -> Result<Vec<Packet>> {
        self.check_size(datagram.len())?;
        self.dump("Decoding datagram", &datagram);

        let mut packets = Vec::new();
        while datagram.has_remaining() {
            match parse_packet(&mut datagram, self.config.version, secrets, largest_pn) {
                Ok(packet) => packets.push(packet),
                Err(e) => {
                    warn!(error = %e, decoded = packets.len(), "Failed to decode coalesced packet");
                    return Err(e);
                }
            }
        }
        Ok(packets)
    }

    fn check_outgoing(&self, packet: &Packet) -> Result<()> {
        if packet.version() != self.config.version {
            return Err(ProtocolError::VersionMismatch {
                expected: self.config.version.to_string(),
                actual: packet.version().to_string(),
            }
            .into());
        }

        let header = packet.header();
        for cid in [&header.destination_connection_id, &header.source_connection_id] {
            if cid.len() > self.config.max_connection_id_len {
                return Err(FormatError::InvalidConnectionIdLength(cid.len()).into());
            }
        }
        Ok(())
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.config.max_datagram_size {
            return Err(FormatError::DatagramTooLarge {
                size,
                max: self.config.max_datagram_size,
            }
            .into());
        }
        Ok(())
    }

    fn dump(&self, what: &str, bytes: &[u8]) {
        if self.config.logging.dump_packets {
            trace!(len = bytes.len(), bytes = %hex::encode(bytes), "{}", what);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::crypto::FallbackSecrets;
    use crate::quic::error::QuicError;
    use crate::quic::frame::CryptoFrame;
    use crate::quic::handshake::HandshakePacket;
    use crate::quic::packet::LongHeader;

    fn handshake(version: Version, pn: u64, data: &[u8]) -> Packet {
        let header = LongHeader::new(version, vec![0x11; 8], vec![0x22; 8], PacketNumber::new(pn));
        HandshakePacket::with_crypto_frame(header, CryptoFrame::new(data.to_vec())).into()
    }

    #[test]
    fn test_encode_decode() {
        let codec = PacketCodec::new(ConfigBuilder::new().dump_packets(true).build().unwrap()).unwrap();
        let secrets = FallbackSecrets::from_secret(b"codec");
        let packet = handshake(Version::V1, 2, b"server finished");

        let mut wire = codec.encode(&packet, &secrets, None).unwrap();
        let decoded = codec.decode(&mut wire, &secrets, None).unwrap();

        assert_eq!(decoded, packet);
        assert!(wire.is_empty());
    }

    #[test]
    fn test_rejects_other_version() {
        let codec = PacketCodec::new(CodecConfig::default()).unwrap();
        let secrets = FallbackSecrets::from_secret(b"codec");

        let err = codec
            .encode(&handshake(Version::DRAFT_18, 0, b"hello"), &secrets, None)
            .unwrap_err();
        assert!(matches!(err, QuicError::Protocol(ProtocolError::VersionMismatch { .. })));
    }

    #[test]
    fn test_connection_id_limit() {
        let codec = PacketCodec::new(ConfigBuilder::new().max_connection_id_len(4).build().unwrap()).unwrap();
        let secrets = FallbackSecrets::from_secret(b"codec");

        let err = codec.encode(&handshake(Version::V1, 0, b"hello"), &secrets, None).unwrap_err();
        assert_eq!(err, QuicError::Format(FormatError::InvalidConnectionIdLength(8)));
    }

    #[test]
    fn test_datagram_size_limit() {
        let codec = PacketCodec::new(ConfigBuilder::new().max_datagram_size(1200).build().unwrap()).unwrap();
        let secrets = FallbackSecrets::from_secret(b"codec");

        let err = codec
            .encode(&handshake(Version::V1, 0, &[0u8; 1200]), &secrets, None)
            .unwrap_err();
        assert!(matches!(err, QuicError::Format(FormatError::DatagramTooLarge { max: 1200, .. })));

        let mut oversized = Bytes::from(vec![0xe0u8; 1201]);
        assert!(codec.decode(&mut oversized, &secrets, None).is_err());
    }

    #[test]
    fn test_coalesced_datagram() {
        let codec = PacketCodec::new(CodecConfig::default()).unwrap();
        let secrets = FallbackSecrets::from_secret(b"codec");
        let packets = vec![
            handshake(Version::V1, 0, b"certificate"),
            handshake(Version::V1, 1, b"certificate verify"),
        ];

        let datagram = codec.encode_datagram(&packets, &secrets, None).unwrap();
        let decoded = codec.decode_datagram(datagram, &secrets, None).unwrap();

        assert_eq!(decoded, packets);
    }

    #[test]
    fn test_coalesced_datagram_trailing_garbage() {
        let codec = PacketCodec::new(CodecConfig::default()).unwrap();
        let secrets = FallbackSecrets::from_secret(b"codec");
        let wire = codec
            .encode(&handshake(Version::V1, 0, b"certificate"), &secrets, None)
            .unwrap();

        let mut datagram = BytesMut::from(&wire[..]);
        datagram.extend_from_slice(&[0x40, 0x00]);
        let err = codec
            .decode_datagram(datagram.freeze(), &secrets, None)
            .unwrap_err();
        assert_eq!(err, QuicError::Format(FormatError::UnknownPacketType(0x40)));
    }
}
