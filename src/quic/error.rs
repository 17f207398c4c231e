use thiserror::Error;

/// Protocol violations: the bytes are well formed but are not what the
/// decoder that received them expects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Unexpected frame type: expected {expected:#x}, found {actual:#x}")]
    UnexpectedFrameType { expected: u64, actual: u64 },

    #[error("Unexpected packet type byte {type_byte:#04x} for version {version}")]
    UnexpectedPacketType { type_byte: u8, version: String },

    #[error("Version mismatch: expected {expected}, found {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("Reserved bits set in type byte {0:#04x}")]
    ReservedBitsSet(u8),
}

/// Malformed or unrepresentable wire data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Value {0} exceeds the variable-length integer range")]
    VarIntOutOfRange(u64),

    #[error("Declared length {declared} exceeds remaining {remaining} bytes")]
    LengthExceedsBuffer { declared: u64, remaining: usize },

    #[error("Unknown frame type: {0:#x}")]
    UnknownFrameType(u64),

    #[error("Unknown packet type byte: {0:#04x}")]
    UnknownPacketType(u8),

    #[error("Invalid connection ID length: {0}")]
    InvalidConnectionIdLength(usize),

    #[error("Packet too short for header protection sample: {0} bytes after packet number offset")]
    InsufficientSample(usize),

    #[error("Packet payload contains no frames")]
    EmptyPayload,

    #[error("Datagram of {size} bytes exceeds maximum of {max}")]
    DatagramTooLarge { size: usize, max: usize },

    #[error("Packet number {0} cannot be encoded")]
    PacketNumberOutOfRange(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Header protection failed: {0}")]
    HeaderProtection(String),

    #[error("No keys available for encryption level {0}")]
    MissingKeys(String),

    #[error("Generic crypto error: {0}")]
    Generic(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuicError {
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CryptoError {
    /// Recover a `CryptoError` a secrets provider returned through `anyhow`,
    /// otherwise wrap the message with `kind`.
    pub fn from_provider(err: anyhow::Error, kind: fn(String) -> CryptoError) -> Self {
        match err.downcast::<CryptoError>() {
            Ok(known) => known,
            Err(other) => kind(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for QuicError {
    fn from(err: anyhow::Error) -> Self {
        QuicError::Crypto(CryptoError::from_provider(err, CryptoError::Generic))
    }
}

/// QUIC transport error codes surfaced to the connection layer.
pub mod transport_error {
    pub const INTERNAL_ERROR: u64 = 0x01;
    pub const FRAME_ENCODING_ERROR: u64 = 0x07;
    pub const PROTOCOL_VIOLATION: u64 = 0x0a;
}

/// What the connection layer should do with a packet that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Discard the packet and keep the connection.
    DropPacket,
    /// Close the connection with the given transport error.
    CloseConnection { error_code: u64, reason: String },
}

impl QuicError {
    /// Transport error code carried in a CONNECTION_CLOSE caused by this error.
    pub fn transport_error_code(&self) -> u64 {
        match self {
            QuicError::Protocol(_) => transport_error::PROTOCOL_VIOLATION,
            QuicError::Format(FormatError::UnknownPacketType(_))
            | QuicError::Format(FormatError::DatagramTooLarge { .. }) => {
                transport_error::PROTOCOL_VIOLATION
            }
            QuicError::Format(FormatError::PacketNumberOutOfRange(_)) => {
                transport_error::INTERNAL_ERROR
            }
            QuicError::Format(_) => transport_error::FRAME_ENCODING_ERROR,
            QuicError::Crypto(_) | QuicError::Config(_) => transport_error::INTERNAL_ERROR,
        }
    }

    /// Get suggested recovery action for this error
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            // Packets failing authentication or header checks are dropped.
            QuicError::Crypto(_)
            | QuicError::Format(FormatError::UnknownPacketType(_))
            | QuicError::Format(FormatError::InsufficientSample(_))
            | QuicError::Format(FormatError::DatagramTooLarge { .. }) => RecoveryAction::DropPacket,
            QuicError::Protocol(ProtocolError::VersionMismatch { .. }) => RecoveryAction::DropPacket,
            other => RecoveryAction::CloseConnection {
                error_code: other.transport_error_code(),
                reason: other.to_string(),
            },
        }
    }

    /// Whether this error was raised because the input was malformed, as
    /// opposed to a failure of a collaborator or the configuration.
    pub fn is_wire_error(&self) -> bool {
        matches!(self, QuicError::Protocol(_) | QuicError::Format(_))
    }
}

pub type Result<T> = std::result::Result<T, QuicError>;
