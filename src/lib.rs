//! # ferrotls
//!
//! A server-side handshake core for TLS 1.0, 1.1 and 1.2 with the
//! classic, pre-AEAD record protection: MAC-then-encrypt over CBC block
//! ciphers (3DES, AES) and RC4, RSA and DHE_RSA key exchange, and
//! RFC 5746 secure renegotiation.
//!
//! The crate deliberately stops at the protocol core.  It consumes
//! decoded TLS records and produces records to transmit; sockets,
//! buffering, timeouts, certificate chain validation and session
//! resumption belong to the caller.
//!
//! ## Usage
//!
//! Build a [`ServerConfig`] once, share it, and drive one
//! [`ServerConnection`] per accepted connection:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! # fn certs() -> (Vec<pki_types::CertificateDer<'static>>, pki_types::PrivateKeyDer<'static>) { todo!() }
//! let (chain, key) = certs();
//! let config = Arc::new(
//!     ferrotls::ServerConfig::builder()
//!         .with_single_cert(chain, key)
//!         .build()
//!         .unwrap(),
//! );
//!
//! let mut conn = ferrotls::ServerConnection::new(config);
//! // feed records with conn.read_message(..),
//! // transmit everything from conn.take_messages()
//! ```
//!
//! All handshake failures are fatal: the connection latches the error,
//! queues the matching alert, and refuses further progress.

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]

#[macro_use]
mod check;

mod cipher;
mod common_state;
mod crypto;
mod error;
mod hash_hs;
mod key_schedule;
mod kx;
mod msgs;
mod prf;
mod rand;
mod record_layer;
mod server;
mod sign;
mod suites;

pub use crate::error::{ConfigError, Error, InvalidMessage, PeerIncompatible, PeerMisbehaved};
pub use crate::msgs::enums::{
    AlertDescription, CipherSuite, ContentType, HandshakeType, HashAlgorithm, ProtocolVersion,
};
pub use crate::msgs::message::{Message, MessagePayload, OpaqueMessage, PlainMessage};
pub use crate::server::{ServerConfig, ServerConfigBuilder, ServerConnection};
pub use crate::sign::{CertifiedKey, RsaKey};
pub use crate::suites::{
    BulkAlgorithm, KeyExchangeAlgorithm, SupportedCipherSuite, ALL_CIPHER_SUITES,
    DEFAULT_CIPHER_SUITES,
};

/// All the supported cipher suites, individually.
pub mod cipher_suite {
    pub use crate::suites::{
        TLS_DHE_RSA_WITH_3DES_EDE_CBC_SHA, TLS_DHE_RSA_WITH_AES_128_CBC_SHA,
        TLS_DHE_RSA_WITH_AES_128_CBC_SHA256, TLS_DHE_RSA_WITH_AES_256_CBC_SHA,
        TLS_DHE_RSA_WITH_AES_256_CBC_SHA256, TLS_RSA_WITH_3DES_EDE_CBC_SHA,
        TLS_RSA_WITH_AES_128_CBC_SHA, TLS_RSA_WITH_AES_128_CBC_SHA256,
        TLS_RSA_WITH_AES_256_CBC_SHA, TLS_RSA_WITH_AES_256_CBC_SHA256, TLS_RSA_WITH_RC4_128_MD5,
        TLS_RSA_WITH_RC4_128_SHA,
    };
}
