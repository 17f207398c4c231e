//! Handshake packets
//!
//! Carry CRYPTO frames protected with handshake keys. Draft-17 and later
//! versions put the packet type and packet number length in the type byte;
//! earlier drafts use the fixed byte `0xfd`.

use crate::crypto::{ConnectionSecrets, EncryptionLevel};
use crate::quic::error::{ProtocolError, Result};
use crate::quic::frame::{CryptoFrame, Frame};
use crate::quic::packet::{
    LongHeader, LongHeaderPacket, PacketNumber, QuicPacket, encode_long_header_packet,
    encode_packet_number_length,
};
use crate::quic::processor::PacketProcessor;
use crate::quic::version::Version;
use bytes::{Bytes, BytesMut};

/// Long header, fixed bit, type 0b10; reserved and packet number bits zero.
const HANDSHAKE_FLAGS: u8 = 0xe0;
/// Type byte used by drafts before 17.
const DRAFT_HANDSHAKE_TYPE: u8 = 0xfd;

/// Type byte of a Handshake packet before header protection.
pub fn handshake_packet_type(
    version: Version,
    packet_number: PacketNumber,
    largest_acked: Option<PacketNumber>,
) -> u8 {
    if version.at_least(Version::DRAFT_17) {
        encode_packet_number_length(HANDSHAKE_FLAGS, packet_number, largest_acked)
    } else {
        DRAFT_HANDSHAKE_TYPE
    }
}

/// Check that `type_byte` (header protection still applied) is a Handshake type byte.
pub fn check_handshake_packet_type(version: Version, type_byte: u8) -> Result<()> {
    let valid = if version.at_least(Version::DRAFT_17) {
        type_byte & 0xf0 == HANDSHAKE_FLAGS
    } else {
        type_byte == DRAFT_HANDSHAKE_TYPE
    };

    if valid {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedPacketType {
            type_byte,
            version: version.to_string(),
        }
        .into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    header: LongHeader,
    frames: Vec<Frame>,
}

impl HandshakePacket {
    pub fn new(header: LongHeader, frames: Vec<Frame>) -> Self {
        Self { header, frames }
    }

    /// Handshake packet carrying a single CRYPTO frame.
    pub fn with_crypto_frame(header: LongHeader, frame: CryptoFrame) -> Self {
        Self::new(header, vec![Frame::Crypto(frame)])
    }

    pub fn destination_connection_id(&self) -> &Bytes {
        &self.header.destination_connection_id
    }

    pub fn source_connection_id(&self) -> &Bytes {
        &self.header.source_connection_id
    }

    /// CRYPTO frames in payload order.
    pub fn crypto_frames(&self) -> impl Iterator<Item = &CryptoFrame> {
        self.frames.iter().filter_map(Frame::as_crypto)
    }

    pub fn encode(
        &self,
        secrets: &dyn ConnectionSecrets,
        largest_acked: Option<PacketNumber>,
    ) -> Result<Bytes> {
        encode_long_header_packet(self, secrets, largest_acked)
    }
}

impl QuicPacket for HandshakePacket {
    fn version(&self) -> Version {
        self.header.version
    }

    fn packet_number(&self) -> PacketNumber {
        self.header.packet_number
    }

    fn frames(&self) -> &[Frame] {
        &self.frames
    }

    fn accept(&self, processor: &mut dyn PacketProcessor) -> Result<()> {
        processor.process_handshake(self)
    }
}

impl LongHeaderPacket for HandshakePacket {
    const ENCRYPTION_LEVEL: EncryptionLevel = EncryptionLevel::Handshake;

    type AdditionalFields = ();

    fn header(&self) -> &LongHeader {
        &self.header
    }

    fn from_parts(header: LongHeader, _additional_fields: (), frames: Vec<Frame>) -> Result<Self> {
        Ok(Self::new(header, frames))
    }

    fn packet_type(&self, largest_acked: Option<PacketNumber>) -> u8 {
        handshake_packet_type(self.header.version, self.header.packet_number, largest_acked)
    }

    fn check_packet_type(version: Version, type_byte: u8) -> Result<()> {
        check_handshake_packet_type(version, type_byte)
    }

    fn generate_additional_fields(&self, _buf: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    fn parse_additional_fields(_buf: &mut Bytes) -> Result<()> {
        Ok(())
    }
}
