//! Message parsing and encoding for the realtime socket

mod parser;

pub use parser::{encode_outbound, parse_inbound};
