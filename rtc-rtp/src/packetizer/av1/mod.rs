//! AV1 RTP payload codec (spec.md §4.2, §4.7, §4.8).

pub mod depacketizer;
pub mod leb128;
pub mod obu;
pub mod packetizer;

pub use depacketizer::Av1Depacketizer;
pub use packetizer::Av1Packetizer;
