use std::num::ParseIntError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer: full")]
    ErrBufferFull,
    #[error("buffer: short")]
    ErrBufferShort,
    #[error("buffer too small")]
    ErrBufferTooSmall,
    #[error("packet too big")]
    ErrPacketTooBig,
    #[error("not long enough to be a RTP Packet")]
    ErrRTPTooShort,

    // RTP header errors
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    ErrHeaderSizeInsufficientForExtension,
    #[error("extension not enabled")]
    ErrHeaderExtensionsNotEnabled,
    #[error("extension not found")]
    ErrHeaderExtensionNotFound,

    #[error("header extension id must be between 1 and 14 for RFC 5285 one-byte extensions")]
    ErrRfc8285OneByteHeaderIdrange,
    #[error("header extension payload must be 16 bytes or less for RFC 5285 one-byte extensions")]
    ErrRfc8285OneByteHeaderSize,
    #[error("header extension id must be between 1 and 255 for RFC 5285 two-byte extensions")]
    ErrRfc8285TwoByteHeaderIdrange,
    #[error(
        "header extension payload must be 255 bytes or less for RFC 5285 two-byte extensions"
    )]
    ErrRfc8285TwoByteHeaderSize,
    #[error("header extension id 0x0F is reserved and not carried across one-byte to two-byte conversion")]
    ErrRfc8285Reserved0xf,
    #[error("no header extension ID was free to use (this means the maximum of 14 extensions have been registered)")]
    ErrRegisterHeaderExtensionNoFreeID,

    #[error("packet is not large enough")]
    ErrShortPacket,
    #[error("invalid padding count exceeds payload")]
    ErrPaddingExceedsPayload,
    #[error("ssrc/payload type does not match track")]
    ErrTrackMismatch,

    // Codec/NALU/OBU errors
    #[error("NALU type is unhandled")]
    ErrUnhandledNaluType,
    #[error("corrupted h265 packet")]
    ErrH265CorruptedPacket,
    #[error("invalid h265 packet type")]
    ErrInvalidH265PacketType,
    #[error("payload is too small for OBU extension header")]
    ErrPayloadTooSmallForObuExtensionHeader,
    #[error("payload is too small for OBU payload size")]
    ErrPayloadTooSmallForObuPayloadSize,
    #[error("leb128 value overflows u32")]
    ErrLeb128Overflow,
    #[error("STAP-A declared size ({0}) is larger than buffer ({1})")]
    StapASizeLargerThanBuffer(usize, usize),

    // Packetizer / track construction
    #[error("unsupported codec")]
    ErrUnsupportedCodec,
    #[error("the requested codec does not have a payloader")]
    ErrNoPayloaderForCodec,
    #[error("mtu must be large enough to hold at least one payload octet")]
    ErrMtuTooSmall,

    // Jitter buffer
    #[error("jitter buffer capacity must be a power of two")]
    ErrCapacityNotPowerOfTwo,
    #[error("jitter buffer is full")]
    ErrJitterBufferFull,

    // Replay protection / send history
    #[error("replay window size must be a power of two no larger than 4096 bits")]
    ErrReplayWindowSize,
    #[error("send history capacity must be a power of two")]
    ErrSendHistoryCapacityNotPowerOfTwo,

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("{0}")]
    Other(String),
}
