//! Error types used throughout the crate.

use core::fmt;
use std::error::Error as StdError;

use crate::msgs::enums::{AlertDescription, ContentType, HandshakeType};
use crate::rand::GetRandomFailed;

/// Protocol errors are reported using this type.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// We received a TLS message that isn't valid right now.
    /// `expect_types` lists the message types we can expect right now.
    /// `got_type` is the type we found.  This error is typically
    /// caused by a buggy TLS stack (the peer or this one), a broken
    /// network, or an attack.
    InappropriateMessage {
        /// Which types we expected
        expect_types: Vec<ContentType>,
        /// What type we received
        got_type: ContentType,
    },

    /// We received a TLS handshake message that isn't valid right now.
    /// `expect_types` lists the handshake message types we can expect
    /// right now.  `got_type` is the type we found.
    InappropriateHandshakeMessage {
        /// Which handshake type we expected
        expect_types: Vec<HandshakeType>,
        /// What handshake type we received
        got_type: HandshakeType,
    },

    /// The peer sent us a TLS message with invalid contents.
    InvalidMessage(InvalidMessage),

    /// The peer doesn't support a protocol version/feature we require.
    /// The parameter gives a hint as to what version/feature it is.
    PeerIncompatible(PeerIncompatible),

    /// The peer deviated from the standard TLS protocol.
    /// The parameter gives a hint where.
    PeerMisbehaved(PeerMisbehaved),

    /// We received a fatal alert.  This means the peer is unhappy.
    AlertReceived(AlertDescription),

    /// We couldn't decrypt a message.  This is invariably fatal.
    DecryptError,

    /// We couldn't encrypt a message because it was larger than the
    /// allowed message size.  This should never happen if the application
    /// is using valid record sizes.
    EncryptError,

    /// The peer sent an oversized record/fragment.
    PeerSentOversizedRecord,

    /// We failed to acquire random bytes from the system.
    FailedToGetRandomBytes,

    /// This function doesn't work until the TLS handshake is complete.
    HandshakeNotComplete,

    /// A catch-all error for unlikely errors.
    General(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InappropriateMessage {
                expect_types,
                got_type,
            } => write!(
                f,
                "received unexpected message: got {got_type:?} when expecting {expect_types:?}"
            ),
            Self::InappropriateHandshakeMessage {
                expect_types,
                got_type,
            } => write!(
                f,
                "received unexpected handshake message: got {got_type:?} when expecting {expect_types:?}"
            ),
            Self::InvalidMessage(typ) => {
                write!(f, "received corrupt message of type {typ:?}")
            }
            Self::PeerIncompatible(why) => write!(f, "peer is incompatible: {why:?}"),
            Self::PeerMisbehaved(why) => write!(f, "peer misbehaved: {why:?}"),
            Self::AlertReceived(alert) => write!(f, "received fatal alert: {alert:?}"),
            Self::DecryptError => write!(f, "cannot decrypt peer's message"),
            Self::EncryptError => write!(f, "cannot encrypt message"),
            Self::PeerSentOversizedRecord => write!(f, "peer sent excess record size"),
            Self::FailedToGetRandomBytes => write!(f, "failed to get random bytes"),
            Self::HandshakeNotComplete => write!(f, "handshake not complete"),
            Self::General(err) => write!(f, "unexpected error: {err}"),
        }
    }
}

impl StdError for Error {}

impl From<GetRandomFailed> for Error {
    fn from(_: GetRandomFailed) -> Self {
        Self::FailedToGetRandomBytes
    }
}

/// A corrupt TLS message payload that resulted in an error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InvalidMessage {
    /// A handshake payload exceeded the allowed limit.
    HandshakePayloadTooLarge,
    /// The ChangeCipherSpec payload was not exactly one byte of value one.
    InvalidCcs,
    /// An unknown content type was encountered during message decoding.
    InvalidContentType,
    /// A server name could not be interpreted as a hostname.
    InvalidServerName,
    /// The supplied bytes are too short to encode the message.
    MessageTooShort,
    /// A field was missing from an encoding.
    MissingData(&'static str),
    /// Trailing bytes found after decoding the named structure.
    TrailingData(&'static str),
}

impl From<InvalidMessage> for Error {
    fn from(e: InvalidMessage) -> Self {
        Self::InvalidMessage(e)
    }
}

/// The set of cases where we failed to make a connection because we
/// thought the peer was misbehaving.
///
/// This is `non_exhaustive`: we might add or stop using items here in
/// minor versions.  We also don't document what they mean.  Generally
/// a user of this crate shouldn't vary its behaviour on these errors.
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PeerMisbehaved {
    DuplicateClientHelloExtensions,
    IncorrectFinished,
    InvalidKeyShare,
    InvalidRenegotiationInfo,
    KeyEpochWithPendingFragment,
    MissingCipherSuites,
    RenegotiationDenied,
    ServerNameMismatch,
    ZeroClientRandom,
}

impl From<PeerMisbehaved> for Error {
    fn from(e: PeerMisbehaved) -> Self {
        Self::PeerMisbehaved(e)
    }
}

/// The set of cases where we failed to make a connection because a peer
/// doesn't support a TLS version/feature we require.
///
/// This is `non_exhaustive`: we might add or stop using items here in
/// minor versions.
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PeerIncompatible {
    NoCipherSuitesInCommon,
    NoProtocolVersionsInCommon,
    NoSignatureSchemesInCommon,
    NullCompressionRequired,
    SecureRenegotiationRequired,
}

impl From<PeerIncompatible> for Error {
    fn from(e: PeerIncompatible) -> Self {
        Self::PeerIncompatible(e)
    }
}

/// Errors detected when a `ServerConfig` is built.
///
/// These are all reachable only through misconfiguration, so they are
/// reported eagerly at construction time rather than surfacing as a
/// handshake failure later.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The cipher suite list is empty.
    EmptyCipherSuites,
    /// The signature hash list is empty.
    EmptySignatureHashes,
    /// The version window is empty or covers unsupported versions.
    InvalidVersionRange,
    /// A configured cipher suite requires a certificate, but none was
    /// supplied.
    MissingCertificate,
    /// The private key could not be parsed as an RSA key.
    InvalidPrivateKey(String),
    /// The RSA modulus is below the accepted minimum.
    InsufficientKeySize {
        /// Size of the supplied key, in bits.
        bits: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCipherSuites => write!(f, "no cipher suites configured"),
            Self::EmptySignatureHashes => write!(f, "no signature hashes configured"),
            Self::InvalidVersionRange => write!(f, "invalid protocol version range"),
            Self::MissingCertificate => {
                write!(f, "configured cipher suites require a certificate")
            }
            Self::InvalidPrivateKey(why) => write!(f, "invalid private key: {why}"),
            Self::InsufficientKeySize { bits } => {
                write!(f, "RSA key of {bits} bits is below the 1024-bit minimum")
            }
        }
    }
}

impl StdError for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke() {
        let all = [
            Error::InappropriateMessage {
                expect_types: vec![ContentType::Alert],
                got_type: ContentType::Handshake,
            },
            Error::InappropriateHandshakeMessage {
                expect_types: vec![HandshakeType::ClientHello],
                got_type: HandshakeType::Finished,
            },
            Error::InvalidMessage(InvalidMessage::MissingData("Random")),
            Error::PeerIncompatible(PeerIncompatible::NoCipherSuitesInCommon),
            Error::PeerMisbehaved(PeerMisbehaved::IncorrectFinished),
            Error::AlertReceived(AlertDescription::HandshakeFailure),
            Error::DecryptError,
            Error::FailedToGetRandomBytes,
            Error::General("undocumented error".to_string()),
        ];

        for err in all {
            assert!(!format!("{err}").is_empty());
        }
    }

    #[test]
    fn rand_error_mapping() {
        assert_eq!(
            Error::from(GetRandomFailed),
            Error::FailedToGetRandomBytes
        );
    }
}
