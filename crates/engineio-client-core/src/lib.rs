#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::inefficient_to_string,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]
#![doc = include_str!("../Readme.md")]

pub use packet::{OpenPacket, Packet, PacketParseError};
pub use str::Str;
pub use transport::{TransportType, UnknownTransportError};

mod packet;
pub mod payload;
mod str;
mod transport;
