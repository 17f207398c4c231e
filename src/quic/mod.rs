//! QUIC wire codec
//!
//! Variable-length integers, frames, long header packets and the visitor
//! used to dispatch decoded packets.

pub mod error;
pub mod frame;
pub mod handshake;
pub mod packet;
pub mod processor;
pub mod varint;
pub mod version;

// Re-export commonly used items
pub use error::{CryptoError, FormatError, ProtocolError, QuicError, RecoveryAction, Result};
pub use frame::{CryptoFrame, Frame, FrameType, QuicFrame, encode_frames, parse_frame, parse_frames};
pub use handshake::{HandshakePacket, check_handshake_packet_type, handshake_packet_type};
pub use packet::{
    LongHeader, LongHeaderPacket, LongPacketType, Packet, PacketNumber, QuicPacket,
    encode_long_header_packet, encode_packet_number_length, parse_long_header_packet, parse_packet,
};
pub use processor::PacketProcessor;
pub use version::Version;
