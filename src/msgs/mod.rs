#[macro_use]
mod macros;

pub mod alert;
pub mod base;
pub mod ccs;
pub mod codec;
pub mod enums;
pub mod handshake;
pub mod message;

pub(crate) mod fragmenter;
pub(crate) mod hsjoiner;
