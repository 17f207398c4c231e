// QUIC wire codec: frames, long header packets and dispatch
pub mod quic;

// Packet protection seam (keys are owned by the connection layer)
pub mod crypto;

// Configuration and logging
pub mod config;
pub mod logging;

// Config-bound encoder/decoder
pub mod codec;

// Re-export main types
pub use codec::PacketCodec;
pub use config::{CodecConfig, ConfigBuilder};
pub use crypto::{ConnectionSecrets, EncryptionLevel, FallbackSecrets};
pub use quic::{
    CryptoFrame, Frame, HandshakePacket, LongHeader, Packet, PacketNumber, PacketProcessor,
    QuicError, QuicFrame, QuicPacket, Result, Version,
};

pub mod prelude {
    pub use crate::codec::PacketCodec;
    pub use crate::config::{CodecConfig, ConfigBuilder};
    pub use crate::crypto::{ConnectionSecrets, EncryptionLevel, FallbackSecrets};
    pub use crate::quic::{
        CryptoFrame, Frame, HandshakePacket, LongHeader, LongHeaderPacket, Packet, PacketNumber,
        PacketProcessor, QuicFrame, QuicPacket, Version, parse_frame, parse_packet,
    };
    pub use crate::quic::{QuicError, Result};
}
