//! QUIC long header packets
//!
//! [`encode_long_header_packet`] and [`parse_long_header_packet`] hold the
//! layout shared by every long header packet type. A packet type plugs into
//! them by implementing [`LongHeaderPacket`]: its type byte, the inverse check,
//! any extra header fields and its encryption level.
//!
//! Layout (the two connection ID encodings and the two packet number
//! encodings are selected by the version):
//!
//! ```text
//! type byte | version (4) | connection IDs | additional fields |
//! length (varint) | packet number (1-4) | protected payload
//! ```

use crate::crypto::{ConnectionSecrets, EncryptionLevel, SAMPLE_LEN};
use crate::quic::error::{CryptoError, FormatError, ProtocolError, QuicError, Result};
use crate::quic::frame::{Frame, encode_frames, parse_frames};
use crate::quic::handshake::HandshakePacket;
use crate::quic::processor::PacketProcessor;
use crate::quic::varint::{MAX_VARINT, encode_varint, read_varint};
use crate::quic::version::Version;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::debug;

/// Longest connection ID allowed by the current wire format.
pub const MAX_CONNECTION_ID_LEN: usize = 20;

/// QUIC packet number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PacketNumber(u64);

impl PacketNumber {
    /// Create a new packet number
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the packet number value
    pub fn value(self) -> u64 {
        self.0
    }

    /// Bytes needed on the wire so the peer can recover this packet number,
    /// given the largest packet number it has acknowledged.
    pub fn encoded_len(self, largest_acked: Option<PacketNumber>) -> usize {
        let range = self.unacked_range(largest_acked);
        if range < 1 << 8 {
            1
        } else if range < 1 << 16 {
            2
        } else if range < 1 << 24 {
            3
        } else {
            4
        }
    }

    /// Twice the distance to the largest acknowledged packet number.
    fn unacked_range(self, largest_acked: Option<PacketNumber>) -> u64 {
        let unacked = match largest_acked {
            Some(largest) => self.0.saturating_sub(largest.0),
            None => self.0.saturating_add(1),
        };
        unacked.saturating_mul(2)
    }

    /// The low `len` bytes of the packet number, big-endian.
    pub fn truncate(self, len: usize) -> Vec<u8> {
        self.0.to_be_bytes()[8 - len..].to_vec()
    }

    /// Recover a full packet number from its `bits` least significant bits.
    pub fn decode(truncated: u64, bits: u32, largest_pn: Option<PacketNumber>) -> PacketNumber {
        let Some(largest) = largest_pn else {
            return PacketNumber(truncated);
        };

        let expected = largest.0.saturating_add(1);
        let pn_win = 1u64 << bits;
        let pn_hwin = pn_win / 2;
        let pn_mask = pn_win - 1;

        let candidate = (expected & !pn_mask) | (truncated & pn_mask);
        if candidate.saturating_add(pn_hwin) <= expected && candidate < (1u64 << 62) - pn_win {
            PacketNumber(candidate + pn_win)
        } else if candidate > expected.saturating_add(pn_hwin) && candidate >= pn_win {
            PacketNumber(candidate - pn_win)
        } else {
            PacketNumber(candidate)
        }
    }
}

impl fmt::Display for PacketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set the packet number length bits (the two low bits) of a type byte.
pub fn encode_packet_number_length(
    flags: u8,
    packet_number: PacketNumber,
    largest_acked: Option<PacketNumber>,
) -> u8 {
    let len = packet_number.encoded_len(largest_acked);
    (flags & !0x03) | (len as u8 - 1)
}

/// Long header packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongPacketType {
    Initial,
    ZeroRtt,
    Handshake,
    Retry,
}

impl LongPacketType {
    /// Identify the packet type from a (still protected) first byte.
    ///
    /// Returns `None` for short header packets and unknown types.
    pub fn from_type_byte(version: Version, type_byte: u8) -> Option<Self> {
        if version.at_least(Version::DRAFT_17) {
            if type_byte & 0xc0 != 0xc0 {
                return None;
            }
            Some(match (type_byte & 0x30) >> 4 {
                0b00 => LongPacketType::Initial,
                0b01 => LongPacketType::ZeroRtt,
                0b10 => LongPacketType::Handshake,
                _ => LongPacketType::Retry,
            })
        } else {
            match type_byte {
                0xff => Some(LongPacketType::Initial),
                0xfe => Some(LongPacketType::Retry),
                0xfd => Some(LongPacketType::Handshake),
                0xfc => Some(LongPacketType::ZeroRtt),
                _ => None,
            }
        }
    }
}

/// Header fields shared by every long header packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongHeader {
    pub version: Version,
    pub destination_connection_id: Bytes,
    pub source_connection_id: Bytes,
    pub packet_number: PacketNumber,
}

impl LongHeader {
    pub fn new(
        version: Version,
        destination_connection_id: impl Into<Bytes>,
        source_connection_id: impl Into<Bytes>,
        packet_number: PacketNumber,
    ) -> Self {
        Self {
            version,
            destination_connection_id: destination_connection_id.into(),
            source_connection_id: source_connection_id.into(),
            packet_number,
        }
    }
}

/// Capabilities shared by every QUIC packet.
pub trait QuicPacket {
    fn version(&self) -> Version;

    fn packet_number(&self) -> PacketNumber;

    /// Payload frames in wire order.
    fn frames(&self) -> &[Frame];

    /// Hand this packet to the matching method of `processor`.
    fn accept(&self, processor: &mut dyn PacketProcessor) -> Result<()>;
}

/// Hooks a long header packet type supplies to the shared codec.
pub trait LongHeaderPacket: QuicPacket + Sized {
    /// Keys protecting this packet type.
    const ENCRYPTION_LEVEL: EncryptionLevel;

    /// Type-specific header fields, inserted after the connection IDs.
    type AdditionalFields;

    fn header(&self) -> &LongHeader;

    /// Assemble a parsed packet.
    fn from_parts(
        header: LongHeader,
        additional_fields: Self::AdditionalFields,
        frames: Vec<Frame>,
    ) -> Result<Self>;

    /// Type byte before header protection.
    fn packet_type(&self, largest_acked: Option<PacketNumber>) -> u8;

    /// Reject a type byte that does not belong to this packet type.
    fn check_packet_type(version: Version, type_byte: u8) -> Result<()>;

    fn generate_additional_fields(&self, buf: &mut BytesMut) -> Result<()>;

    fn parse_additional_fields(buf: &mut Bytes) -> Result<Self::AdditionalFields>;

    fn encryption_level(&self) -> EncryptionLevel {
        Self::ENCRYPTION_LEVEL
    }
}

/// Whether `version` carries the packet number length in the type byte and
/// protects its low bits.
fn has_type_byte_pn_length(version: Version) -> bool {
    version.at_least(Version::DRAFT_17)
}

/// Whether `version` encodes each connection ID length in its own byte.
fn has_separate_cid_lengths(version: Version) -> bool {
    version.at_least(Version::DRAFT_22)
}

fn check_connection_id(version: Version, cid: &[u8]) -> Result<()> {
    let valid = if has_separate_cid_lengths(version) {
        cid.len() <= MAX_CONNECTION_ID_LEN
    } else {
        cid.is_empty() || (4..=18).contains(&cid.len())
    };
    if valid {
        Ok(())
    } else {
        Err(FormatError::InvalidConnectionIdLength(cid.len()).into())
    }
}

fn put_connection_ids(version: Version, buf: &mut BytesMut, dcid: &[u8], scid: &[u8]) {
    if has_separate_cid_lengths(version) {
        buf.put_u8(dcid.len() as u8);
        buf.extend_from_slice(dcid);
        buf.put_u8(scid.len() as u8);
        buf.extend_from_slice(scid);
    } else {
        let nibble = |cid: &[u8]| if cid.is_empty() { 0 } else { cid.len() as u8 - 3 };
        buf.put_u8(nibble(dcid) << 4 | nibble(scid));
        buf.extend_from_slice(dcid);
        buf.extend_from_slice(scid);
    }
}

fn take(buf: &mut Bytes, len: usize) -> Result<Bytes> {
    if buf.remaining() < len {
        return Err(FormatError::Truncated {
            needed: len,
            available: buf.remaining(),
        }
        .into());
    }
    Ok(buf.split_to(len))
}

fn get_connection_ids(version: Version, buf: &mut Bytes) -> Result<(Bytes, Bytes)> {
    if has_separate_cid_lengths(version) {
        let dcid_len = take(buf, 1)?[0] as usize;
        if dcid_len > MAX_CONNECTION_ID_LEN {
            return Err(FormatError::InvalidConnectionIdLength(dcid_len).into());
        }
        let dcid = take(buf, dcid_len)?;
        let scid_len = take(buf, 1)?[0] as usize;
        if scid_len > MAX_CONNECTION_ID_LEN {
            return Err(FormatError::InvalidConnectionIdLength(scid_len).into());
        }
        let scid = take(buf, scid_len)?;
        Ok((dcid, scid))
    } else {
        let lengths = take(buf, 1)?[0];
        let expand = |nibble: u8| if nibble == 0 { 0 } else { nibble as usize + 3 };
        let dcid = take(buf, expand(lengths >> 4))?;
        let scid = take(buf, expand(lengths & 0x0f))?;
        Ok((dcid, scid))
    }
}

/// Reject packet numbers the version's encoding cannot carry unambiguously.
fn check_packet_number(
    version: Version,
    packet_number: PacketNumber,
    largest_acked: Option<PacketNumber>,
) -> Result<()> {
    let representable = if packet_number.value() > MAX_VARINT {
        false
    } else if has_type_byte_pn_length(version) {
        packet_number.unacked_range(largest_acked) < 1 << 32
    } else {
        packet_number.value() < 1 << 30
    };

    if representable {
        Ok(())
    } else {
        Err(FormatError::PacketNumberOutOfRange(packet_number.value()).into())
    }
}

/// Packet number bytes as sent, before header protection.
fn packet_number_bytes(version: Version, type_byte: u8, packet_number: PacketNumber) -> Vec<u8> {
    if has_type_byte_pn_length(version) {
        packet_number.truncate((type_byte & 0x03) as usize + 1)
    } else {
        // Older drafts: self-describing 30-bit encoding with a 0b11 prefix.
        let value = 0xc000_0000 | (packet_number.value() & 0x3fff_ffff) as u32;
        value.to_be_bytes().to_vec()
    }
}

/// Serialize, seal and header-protect `packet`.
pub fn encode_long_header_packet<P: LongHeaderPacket>(
    packet: &P,
    secrets: &dyn ConnectionSecrets,
    largest_acked: Option<PacketNumber>,
) -> Result<Bytes> {
    let header = packet.header();
    let version = header.version;
    let level = packet.encryption_level();

    check_connection_id(version, &header.destination_connection_id)?;
    check_connection_id(version, &header.source_connection_id)?;
    check_packet_number(version, header.packet_number, largest_acked)?;

    let payload = encode_frames(packet.frames())?;
    let type_byte = packet.packet_type(largest_acked);
    let pn_bytes = packet_number_bytes(version, type_byte, header.packet_number);
    let tag_len = secrets.tag_len(level);

    let protected_len = pn_bytes.len() + payload.len() + tag_len;
    if protected_len < 4 + SAMPLE_LEN {
        return Err(FormatError::InsufficientSample(protected_len).into());
    }
    if protected_len as u64 > MAX_VARINT {
        return Err(FormatError::VarIntOutOfRange(protected_len as u64).into());
    }

    let mut buf = BytesMut::with_capacity(64 + protected_len);
    buf.put_u8(type_byte);
    buf.put_slice(&version.to_bytes());
    put_connection_ids(
        version,
        &mut buf,
        &header.destination_connection_id,
        &header.source_connection_id,
    );
    packet.generate_additional_fields(&mut buf)?;
    encode_varint(protected_len as u64, &mut buf)?;
    let pn_offset = buf.len();
    buf.put_slice(&pn_bytes);

    let sealed = secrets
        .seal(level, header.packet_number.value(), &buf, &payload)
        .map_err(|e| CryptoError::from_provider(e, CryptoError::Encryption))?;
    if sealed.len() != payload.len() + tag_len {
        return Err(CryptoError::Encryption(format!(
            "sealed payload is {} bytes, expected {}",
            sealed.len(),
            payload.len() + tag_len
        ))
        .into());
    }
    buf.put_slice(&sealed);

    let sample_start = pn_offset + 4;
    let mask = secrets
        .header_protection_mask(level, &buf[sample_start..sample_start + SAMPLE_LEN])
        .map_err(|e| CryptoError::from_provider(e, CryptoError::HeaderProtection))?;
    if has_type_byte_pn_length(version) {
        buf[0] ^= mask[0] & 0x0f;
    }
    for (i, m) in mask[1..=pn_bytes.len()].iter().enumerate() {
        buf[pn_offset + i] ^= m;
    }

    debug!(
        %version,
        %level,
        packet_number = %header.packet_number,
        frames = packet.frames().len(),
        size = buf.len(),
        "Encoded long header packet"
    );
    Ok(buf.freeze())
}

/// Parse one `P` packet from the front of `buf`.
///
/// On success `buf` is advanced past the packet, leaving any coalesced packets
/// that follow it. On error `buf` is left unchanged.
pub fn parse_long_header_packet<P: LongHeaderPacket>(
    buf: &mut Bytes,
    version: Version,
    secrets: &dyn ConnectionSecrets,
    largest_pn: Option<PacketNumber>,
) -> Result<P> {
    let level = P::ENCRYPTION_LEVEL;
    let mut cursor = buf.clone();

    let type_byte = take(&mut cursor, 1)?[0];
    P::check_packet_type(version, type_byte)?;

    if cursor.remaining() < 4 {
        return Err(FormatError::Truncated {
            needed: 4,
            available: cursor.remaining(),
        }
        .into());
    }
    let wire_version = Version::new(cursor.get_u32());
    if wire_version != version {
        return Err(ProtocolError::VersionMismatch {
            expected: version.to_string(),
            actual: wire_version.to_string(),
        }
        .into());
    }

    let (dcid, scid) = get_connection_ids(version, &mut cursor)?;
    let additional_fields = P::parse_additional_fields(&mut cursor)?;

    let length = read_varint(&mut cursor)?;
    if length > cursor.remaining() as u64 {
        return Err(FormatError::LengthExceedsBuffer {
            declared: length,
            remaining: cursor.remaining(),
        }
        .into());
    }
    let length = length as usize;
    if length < 4 + SAMPLE_LEN {
        return Err(FormatError::InsufficientSample(length).into());
    }

    let pn_offset = buf.len() - cursor.remaining();
    let mut packet = BytesMut::from(&buf[..pn_offset + length]);

    let sample_start = pn_offset + 4;
    let mask = secrets
        .header_protection_mask(level, &packet[sample_start..sample_start + SAMPLE_LEN])
        .map_err(|e| CryptoError::from_provider(e, CryptoError::HeaderProtection))?;

    let (pn_len, truncated, bits) = if has_type_byte_pn_length(version) {
        packet[0] ^= mask[0] & 0x0f;
        let pn_len = (packet[0] & 0x03) as usize + 1;
        let mut truncated = 0u64;
        for i in 0..pn_len {
            packet[pn_offset + i] ^= mask[1 + i];
            truncated = (truncated << 8) | u64::from(packet[pn_offset + i]);
        }
        (pn_len, truncated, pn_len as u32 * 8)
    } else {
        packet[pn_offset] ^= mask[1];
        let first = packet[pn_offset];
        let (pn_len, value_mask, bits) = match first >> 6 {
            0b00 | 0b01 => (1, 0x7f, 7),
            0b10 => (2, 0x3fff, 14),
            _ => (4, 0x3fff_ffff, 30),
        };
        let mut raw = u64::from(first);
        for i in 1..pn_len {
            packet[pn_offset + i] ^= mask[1 + i];
            raw = (raw << 8) | u64::from(packet[pn_offset + i]);
        }
        (pn_len, raw & value_mask, bits)
    };
    let packet_number = PacketNumber::decode(truncated, bits, largest_pn);

    let (header_bytes, ciphertext) = packet.split_at(pn_offset + pn_len);
    let plaintext = secrets
        .open(level, packet_number.value(), header_bytes, ciphertext)
        .map_err(|e| CryptoError::from_provider(e, CryptoError::Decryption))?;
    // Reserved bits are checked after authentication.
    if has_type_byte_pn_length(version) && packet[0] & 0x0c != 0 {
        return Err(ProtocolError::ReservedBitsSet(packet[0]).into());
    }
    let frames = parse_frames(Bytes::from(plaintext))?;

    let header = LongHeader {
        version,
        destination_connection_id: dcid,
        source_connection_id: scid,
        packet_number,
    };
    let parsed = P::from_parts(header, additional_fields, frames)?;

    debug!(
        %version,
        %level,
        packet_number = %packet_number,
        size = pn_offset + length,
        "Parsed long header packet"
    );

    buf.advance(pn_offset + length);
    Ok(parsed)
}

/// QUIC packets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Handshake(HandshakePacket),
}

impl Packet {
    /// Packet type of this variant.
    pub fn packet_type(&self) -> LongPacketType {
        match self {
            Packet::Handshake(_) => LongPacketType::Handshake,
        }
    }

    pub fn encryption_level(&self) -> EncryptionLevel {
        match self {
            Packet::Handshake(packet) => packet.encryption_level(),
        }
    }

    pub fn header(&self) -> &LongHeader {
        match self {
            Packet::Handshake(packet) => packet.header(),
        }
    }

    /// Encode the packet with the keys of its encryption level.
    pub fn encode(
        &self,
        secrets: &dyn ConnectionSecrets,
        largest_acked: Option<PacketNumber>,
    ) -> Result<Bytes> {
        match self {
            Packet::Handshake(packet) => encode_long_header_packet(packet, secrets, largest_acked),
        }
    }
}

impl QuicPacket for Packet {
    fn version(&self) -> Version {
        match self {
            Packet::Handshake(packet) => packet.version(),
        }
    }

    fn packet_number(&self) -> PacketNumber {
        match self {
            Packet::Handshake(packet) => packet.packet_number(),
        }
    }

    fn frames(&self) -> &[Frame] {
        match self {
            Packet::Handshake(packet) => packet.frames(),
        }
    }

    fn accept(&self, processor: &mut dyn PacketProcessor) -> Result<()> {
        match self {
            Packet::Handshake(packet) => packet.accept(processor),
        }
    }
}

impl From<HandshakePacket> for Packet {
    fn from(packet: HandshakePacket) -> Self {
        Packet::Handshake(packet)
    }
}

/// Parse the packet at the front of `buf`.
///
/// The variant is chosen from the first byte before anything is constructed.
pub fn parse_packet(
    buf: &mut Bytes,
    version: Version,
    secrets: &dyn ConnectionSecrets,
    largest_pn: Option<PacketNumber>,
) -> Result<Packet> {
    let type_byte = *buf.first().ok_or(FormatError::Truncated {
        needed: 1,
        available: 0,
    })?;

    match LongPacketType::from_type_byte(version, type_byte) {
        Some(LongPacketType::Handshake) => {
            parse_long_header_packet::<HandshakePacket>(buf, version, secrets, largest_pn)
                .map(Packet::Handshake)
        }
        _ => Err(QuicError::Format(FormatError::UnknownPacketType(type_byte))),
    }
}
