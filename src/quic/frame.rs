//! QUIC frames
//!
//! Each frame type implements [`QuicFrame`]. [`Frame`] is the tagged union the
//! payload parser produces after dispatching on the type tag.

use crate::quic::error::{FormatError, ProtocolError, Result};
use crate::quic::varint::{MAX_VARINT, encode_varint, read_varint, varint_len};
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use tracing::{debug, trace};

/// QUIC frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Crypto = 0x18,
}

impl FrameType {
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            0x18 => Some(FrameType::Crypto),
            _ => None,
        }
    }

    pub fn tag(self) -> u64 {
        self as u64
    }
}

/// Capabilities shared by every wire frame.
pub trait QuicFrame: Sized + fmt::Display {
    /// Type tag the encoded frame starts with.
    const FRAME_TYPE: FrameType;

    /// Size of the encoded frame in bytes.
    fn encoded_len(&self) -> usize;

    /// Append the encoded frame, type tag first.
    fn encode_into(&self, buf: &mut BytesMut) -> Result<()>;

    /// Parse one frame of this type from the front of `buf`.
    fn parse(buf: &mut Bytes) -> Result<Self>;

    fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// A range of the cryptographic handshake stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoFrame {
    offset: u64,
    crypto_data: Bytes,
}

impl CryptoFrame {
    /// Frame carrying `payload` from the start of the handshake stream.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            offset: 0,
            crypto_data: payload.into(),
        }
    }

    /// Frame carrying `payload` at `offset` of the handshake stream.
    pub fn with_offset(offset: u64, payload: impl Into<Bytes>) -> Result<Self> {
        let frame = Self {
            offset,
            crypto_data: payload.into(),
        };
        frame.end_offset()?;
        Ok(frame)
    }

    /// Encode `payload` as a CRYPTO frame at offset 0.
    pub fn encode(payload: &[u8]) -> Result<Bytes> {
        Self::new(Bytes::copy_from_slice(payload)).to_bytes()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.crypto_data.len() as u64
    }

    pub fn crypto_data(&self) -> &Bytes {
        &self.crypto_data
    }

    /// Offset of the first byte after this range.
    pub fn end_offset(&self) -> Result<u64> {
        self.offset
            .checked_add(self.length())
            .filter(|end| *end <= MAX_VARINT)
            .ok_or_else(|| FormatError::VarIntOutOfRange(self.offset.saturating_add(self.length())).into())
    }
}

impl QuicFrame for CryptoFrame {
    const FRAME_TYPE: FrameType = FrameType::Crypto;

    fn encoded_len(&self) -> usize {
        varint_len(Self::FRAME_TYPE.tag())
            + varint_len(self.offset)
            + varint_len(self.length())
            + self.crypto_data.len()
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        // Range checks before the first write so a failure leaves buf as it was.
        if self.offset > MAX_VARINT {
            return Err(FormatError::VarIntOutOfRange(self.offset).into());
        }
        if self.length() > MAX_VARINT {
            return Err(FormatError::VarIntOutOfRange(self.length()).into());
        }

        buf.reserve(self.encoded_len());
        encode_varint(Self::FRAME_TYPE.tag(), buf)?;
        encode_varint(self.offset, buf)?;
        encode_varint(self.length(), buf)?;
        buf.extend_from_slice(&self.crypto_data);
        Ok(())
    }

    fn parse(buf: &mut Bytes) -> Result<Self> {
        trace!("Parsing crypto frame");
        let tag = first_byte(buf)?;
        if u64::from(tag) != Self::FRAME_TYPE.tag() {
            return Err(ProtocolError::UnexpectedFrameType {
                expected: Self::FRAME_TYPE.tag(),
                actual: u64::from(tag),
            }
            .into());
        }

        // Work on a copy so that a failure leaves the caller's buffer as it was.
        let mut cursor = buf.clone();
        cursor.advance(1);
        let offset = read_varint(&mut cursor)?;
        let length = read_varint(&mut cursor)?;
        if length > cursor.remaining() as u64 {
            return Err(FormatError::LengthExceedsBuffer {
                declared: length,
                remaining: cursor.remaining(),
            }
            .into());
        }
        let crypto_data = cursor.split_to(length as usize);

        let frame = Self { offset, crypto_data };
        frame.end_offset()?;
        debug!(
            offset,
            length,
            data = %hex::encode(&frame.crypto_data),
            "Crypto data"
        );

        *buf = cursor;
        Ok(frame)
    }
}

impl fmt::Display for CryptoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CryptoFrame[{},{}]", self.offset, self.length())
    }
}

/// QUIC frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Crypto(CryptoFrame),
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Crypto(_) => CryptoFrame::FRAME_TYPE,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Crypto(frame) => frame.encoded_len(),
        }
    }

    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Frame::Crypto(frame) => frame.encode_into(buf),
        }
    }

    pub fn as_crypto(&self) -> Option<&CryptoFrame> {
        match self {
            Frame::Crypto(frame) => Some(frame),
        }
    }
}

impl From<CryptoFrame> for Frame {
    fn from(frame: CryptoFrame) -> Self {
        Frame::Crypto(frame)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Crypto(frame) => fmt::Display::fmt(frame, f),
        }
    }
}

/// Single-byte type tag at the front of `buf`, not consumed.
fn first_byte(buf: &Bytes) -> Result<u8> {
    buf.first().copied().ok_or_else(|| {
        FormatError::Truncated {
            needed: 1,
            available: 0,
        }
        .into()
    })
}

/// Parse the frame at the front of `buf`, choosing the parser from its type tag.
pub fn parse_frame(buf: &mut Bytes) -> Result<Frame> {
    let tag = u64::from(first_byte(buf)?);
    match FrameType::from_tag(tag) {
        Some(FrameType::Crypto) => CryptoFrame::parse(buf).map(Frame::Crypto),
        None => Err(FormatError::UnknownFrameType(tag).into()),
    }
}

/// Parse a decrypted packet payload into its frames, in wire order.
pub fn parse_frames(mut payload: Bytes) -> Result<Vec<Frame>> {
    if payload.is_empty() {
        return Err(FormatError::EmptyPayload.into());
    }

    let mut frames = Vec::new();
    while payload.has_remaining() {
        frames.push(parse_frame(&mut payload)?);
    }
    Ok(frames)
}

/// Encode `frames` back to back.
pub fn encode_frames(frames: &[Frame]) -> Result<Bytes> {
    if frames.is_empty() {
        return Err(FormatError::EmptyPayload.into());
    }

    let mut buf = BytesMut::with_capacity(frames.iter().map(Frame::encoded_len).sum());
    for frame in frames {
        frame.encode_into(&mut buf)?;
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quic::error::QuicError;

    #[test]
    fn test_encode_crypto_frame() {
        let encoded = CryptoFrame::encode(&[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(&encoded[..], &[0x18, 0x00, 0x03, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_parse_crypto_frame() {
        let mut buf = Bytes::from_static(&[0x18, 0x00, 0x03, 0x01, 0x02, 0x03]);
        let frame = CryptoFrame::parse(&mut buf).unwrap();

        assert_eq!(frame.offset(), 0);
        assert_eq!(frame.length(), 3);
        assert_eq!(&frame.crypto_data()[..], &[0x01, 0x02, 0x03]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_roundtrip_payload_sizes() {
        for size in [0usize, 1, 63, 64, 1200, 16384] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let mut encoded = CryptoFrame::encode(&payload).unwrap();
            let frame = CryptoFrame::parse(&mut encoded).unwrap();

            assert_eq!(frame.offset(), 0);
            assert_eq!(frame.length(), size as u64);
            assert_eq!(&frame.crypto_data()[..], &payload[..]);
        }
    }

    #[test]
    fn test_wrong_type_tag_consumes_nothing() {
        let mut buf = Bytes::from_static(&[0x06, 0x00, 0x01, 0xaa]);
        let err = CryptoFrame::parse(&mut buf).unwrap_err();

        assert_eq!(
            err,
            QuicError::Protocol(ProtocolError::UnexpectedFrameType { expected: 0x18, actual: 0x06 })
        );
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_type_tag_is_a_single_byte() {
        // 0x40 0x18 is a two-byte varint for 0x18, which is not a CRYPTO tag.
        let mut buf = Bytes::from_static(&[0x40, 0x18, 0x00, 0x01, 0xaa]);
        assert_eq!(
            CryptoFrame::parse(&mut buf).unwrap_err(),
            QuicError::Protocol(ProtocolError::UnexpectedFrameType { expected: 0x18, actual: 0x40 })
        );
        assert_eq!(buf.len(), 5);

        let mut lone = Bytes::from_static(&[0x40]);
        assert_eq!(
            CryptoFrame::parse(&mut lone).unwrap_err(),
            QuicError::Protocol(ProtocolError::UnexpectedFrameType { expected: 0x18, actual: 0x40 })
        );
        assert_eq!(lone.len(), 1);

        let mut buf = Bytes::from_static(&[0x40, 0x18, 0x00, 0x01, 0xaa]);
        assert_eq!(
            parse_frame(&mut buf).unwrap_err(),
            QuicError::Format(FormatError::UnknownFrameType(0x40))
        );
    }

    #[test]
    fn test_parse_empty_buffer() {
        let mut buf = Bytes::new();
        assert_eq!(
            CryptoFrame::parse(&mut buf).unwrap_err(),
            QuicError::Format(FormatError::Truncated { needed: 1, available: 0 })
        );
    }

    #[test]
    fn test_declared_length_exceeds_buffer() {
        let mut buf = Bytes::from_static(&[0x18, 0x00, 0x05, 0x01, 0x02]);
        let err = CryptoFrame::parse(&mut buf).unwrap_err();

        assert_eq!(
            err,
            QuicError::Format(FormatError::LengthExceedsBuffer { declared: 5, remaining: 2 })
        );
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_truncated_offset() {
        let mut buf = Bytes::from_static(&[0x18, 0x80, 0x00]);
        assert!(matches!(
            CryptoFrame::parse(&mut buf),
            Err(QuicError::Format(FormatError::Truncated { needed: 4, available: 2 }))
        ));
    }

    #[test]
    fn test_nonzero_offset() {
        let frame = CryptoFrame::with_offset(1200, Bytes::from_static(b"finished")).unwrap();
        let mut encoded = frame.to_bytes().unwrap();
        assert_eq!(&encoded[..4], &[0x18, 0x44, 0xb0, 0x08]);

        let parsed = CryptoFrame::parse(&mut encoded).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.end_offset().unwrap(), 1208);
    }

    #[test]
    fn test_offset_overflow_rejected() {
        assert!(CryptoFrame::with_offset(MAX_VARINT, Bytes::from_static(b"x")).is_err());
        assert!(CryptoFrame::with_offset(MAX_VARINT, Bytes::new()).is_ok());
    }

    #[test]
    fn test_display() {
        let frame = CryptoFrame::with_offset(100, vec![0u8; 42]).unwrap();
        assert_eq!(frame.to_string(), "CryptoFrame[100,42]");
        assert_eq!(Frame::from(frame).to_string(), "CryptoFrame[100,42]");
    }

    #[test]
    fn test_parse_frames_in_order() {
        let first = CryptoFrame::new(Bytes::from_static(b"client hello"));
        let second = CryptoFrame::with_offset(12, Bytes::from_static(b" continued")).unwrap();
        let payload = encode_frames(&[first.clone().into(), second.clone().into()]).unwrap();

        let frames = parse_frames(payload).unwrap();
        assert_eq!(frames, vec![Frame::Crypto(first), Frame::Crypto(second)]);
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut buf = Bytes::from_static(&[0x1c, 0x00]);
        assert_eq!(
            parse_frame(&mut buf).unwrap_err(),
            QuicError::Format(FormatError::UnknownFrameType(0x1c))
        );
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(
            parse_frames(Bytes::new()).unwrap_err(),
            QuicError::Format(FormatError::EmptyPayload)
        );
        assert!(encode_frames(&[]).is_err());
    }
}
