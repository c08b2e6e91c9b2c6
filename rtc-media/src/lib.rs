#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod jitter_buffer;

pub use jitter_buffer::{JitterBuffer, JitterBufferBuilder, compress_nack_list};
