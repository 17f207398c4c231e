//! Packet dispatch
//!
//! Every packet type implements `accept` by calling exactly one method of
//! [`PacketProcessor`], so handlers never inspect packet types at runtime.

use crate::quic::error::Result;
use crate::quic::handshake::HandshakePacket;

/// Receives decoded packets, one method per packet type.
pub trait PacketProcessor {
    fn process_handshake(&mut self, packet: &HandshakePacket) -> Result<()>;
}
