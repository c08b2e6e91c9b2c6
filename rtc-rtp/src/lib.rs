#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod bitio;
pub mod extended_value;
pub mod extension;
pub mod header;
pub mod packet;
pub mod packetizer;
pub mod random;
pub mod replay;
pub mod send_history;
pub mod track;

pub use header::Header;
pub use packet::Packet;
pub use track::Track;
