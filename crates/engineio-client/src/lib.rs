#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::mem_forget,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
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

pub use engineio_client_core::{Str, TransportType};
pub use config::{SessionConfig, SessionConfigBuilder};
pub use errors::Error;
pub use io::{MessageKind, MessageReader, MessageWriter};
pub use session::Session;
pub use transport::TransportError;

pub mod config;
mod errors;
mod io;
mod session;
mod transport;
