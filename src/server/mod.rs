use core::fmt;
use std::mem;
use std::sync::Arc;

use log::warn;
use pki_types::{CertificateDer, PrivateKeyDer};

use crate::common_state::CommonState;
use crate::error::{ConfigError, Error};
use crate::msgs::alert::AlertMessagePayload;
use crate::msgs::base::Payload;
use crate::msgs::enums::{
    AlertDescription, AlertLevel, ContentType, HashAlgorithm, ProtocolVersion,
};
use crate::msgs::message::{Message, MessagePayload, OpaqueMessage};
use crate::sign::CertifiedKey;
use crate::suites::{SupportedCipherSuite, DEFAULT_CIPHER_SUITES};

pub(crate) mod hs;
#[cfg(test)]
mod test;

/// Common configuration for a set of server sessions.
///
/// Making one of these can be expensive, and should be once per process
/// rather than once per connection.  It is immutable once built and
/// shared between connections via `Arc`.
pub struct ServerConfig {
    /// List of cipher suites the server may negotiate, in decreasing
    /// order of preference.
    pub(crate) cipher_suites: Vec<&'static SupportedCipherSuite>,

    /// Inclusive window of protocol versions the server accepts.
    pub(crate) versions: (ProtocolVersion, ProtocolVersion),

    /// Hashes acceptable for TLS 1.2 signatures, most preferred first.
    pub(crate) signature_hashes: Vec<HashAlgorithm>,

    /// Whether a ClientHello on an established session starts a
    /// renegotiation, or fails the connection.
    pub(crate) allow_renegotiation: bool,

    /// Whether RFC 5746 signalling is demanded of every client.
    pub(crate) require_secure_renegotiation: bool,

    /// The server's certificate chain and private key.
    pub(crate) credentials: Option<CertifiedKey>,

    /// If set, a ClientHello carrying a different server name fails.
    pub(crate) expected_sni: Option<String>,
}

impl ServerConfig {
    /// Make a builder carrying the default configuration.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            cipher_suites: DEFAULT_CIPHER_SUITES.to_vec(),
            versions: (ProtocolVersion::TLSv1_0, ProtocolVersion::TLSv1_2),
            signature_hashes: vec![
                HashAlgorithm::SHA512,
                HashAlgorithm::SHA384,
                HashAlgorithm::SHA256,
                HashAlgorithm::SHA1,
            ],
            allow_renegotiation: false,
            require_secure_renegotiation: true,
            cert: None,
            expected_sni: None,
        }
    }

    /// The highest enabled version not above the client's offer.
    pub(crate) fn select_version(&self, client_max: ProtocolVersion) -> Option<ProtocolVersion> {
        let (min, max) = self.versions;
        SUPPORTED_VERSIONS
            .iter()
            .rev()
            .copied()
            .filter(|v| u16::from(*v) >= u16::from(min) && u16::from(*v) <= u16::from(max))
            .find(|v| u16::from(*v) <= u16::from(client_max))
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("cipher_suites", &self.cipher_suites)
            .field("versions", &self.versions)
            .field("signature_hashes", &self.signature_hashes)
            .field("allow_renegotiation", &self.allow_renegotiation)
            .field(
                "require_secure_renegotiation",
                &self.require_secure_renegotiation,
            )
            .field("expected_sni", &self.expected_sni)
            .finish_non_exhaustive()
    }
}

static SUPPORTED_VERSIONS: &[ProtocolVersion] = &[
    ProtocolVersion::TLSv1_0,
    ProtocolVersion::TLSv1_1,
    ProtocolVersion::TLSv1_2,
];

/// Builds a validated, frozen [`ServerConfig`].
pub struct ServerConfigBuilder {
    cipher_suites: Vec<&'static SupportedCipherSuite>,
    versions: (ProtocolVersion, ProtocolVersion),
    signature_hashes: Vec<HashAlgorithm>,
    allow_renegotiation: bool,
    require_secure_renegotiation: bool,
    cert: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
    expected_sni: Option<String>,
}

impl ServerConfigBuilder {
    /// Override the cipher suite list, most preferred first.
    pub fn with_cipher_suites(mut self, suites: &[&'static SupportedCipherSuite]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    /// Accept only protocol versions within `min..=max`.
    pub fn with_protocol_versions(mut self, min: ProtocolVersion, max: ProtocolVersion) -> Self {
        self.versions = (min, max);
        self
    }

    /// Override the hashes acceptable for TLS 1.2 signatures.
    pub fn with_signature_hashes(mut self, hashes: &[HashAlgorithm]) -> Self {
        self.signature_hashes = hashes.to_vec();
        self
    }

    /// Honor client-initiated renegotiation on established sessions.
    pub fn with_renegotiation(mut self, allow: bool) -> Self {
        self.allow_renegotiation = allow;
        self
    }

    /// Require RFC 5746 signalling from every client.
    pub fn with_secure_renegotiation_required(mut self, require: bool) -> Self {
        self.require_secure_renegotiation = require;
        self
    }

    /// Sets a single certificate chain and matching private key.
    ///
    /// `chain` is a certificate chain in wire order, end-entity first.
    /// `key_der` is a PKCS#1 or PKCS#8 DER-encoded RSA private key.
    pub fn with_single_cert(
        mut self,
        chain: Vec<CertificateDer<'static>>,
        key_der: PrivateKeyDer<'static>,
    ) -> Self {
        self.cert = Some((chain, key_der));
        self
    }

    /// Reject ClientHellos whose server name differs from `name`.
    pub fn with_expected_sni(mut self, name: impl Into<String>) -> Self {
        self.expected_sni = Some(name.into());
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        if self.cipher_suites.is_empty() {
            return Err(ConfigError::EmptyCipherSuites);
        }

        if self.signature_hashes.is_empty() {
            return Err(ConfigError::EmptySignatureHashes);
        }

        let (min, max) = self.versions;
        if !SUPPORTED_VERSIONS.contains(&min)
            || !SUPPORTED_VERSIONS.contains(&max)
            || u16::from(min) > u16::from(max)
        {
            return Err(ConfigError::InvalidVersionRange);
        }

        let credentials = match self.cert {
            Some((chain, key_der)) => {
                let certified = CertifiedKey::new(chain, &key_der)
                    .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))?;
                let bits = certified.key.bits();
                if bits < 1024 {
                    return Err(ConfigError::InsufficientKeySize { bits });
                }
                Some(certified)
            }
            None => None,
        };

        // A suite whose key exchange cannot run without a certificate
        // must be unreachable, not fail mid-handshake.
        if credentials.is_none() {
            if let Some(suite) = self
                .cipher_suites
                .iter()
                .find(|suite| suite.requires_server_certificate())
            {
                warn!("cipher suite {suite:?} requires a certificate");
                return Err(ConfigError::MissingCertificate);
            }
        }

        Ok(ServerConfig {
            cipher_suites: self.cipher_suites,
            versions: self.versions,
            signature_hashes: self.signature_hashes,
            allow_renegotiation: self.allow_renegotiation,
            require_secure_renegotiation: self.require_secure_renegotiation,
            credentials,
            expected_sni: self.expected_sni,
        })
    }
}

/// A TLS server connection.
///
/// The caller feeds decoded records in with [`ServerConnection::read_message`]
/// and drains the records to transmit with
/// [`ServerConnection::take_messages`]; socket I/O, framing and timeouts
/// belong to the caller.
pub struct ServerConnection {
    config: Arc<ServerConfig>,
    common: CommonState,
    state: Result<Box<dyn hs::State>, Error>,
}

impl ServerConnection {
    /// Make a new ServerConnection.  `config` controls how we behave in
    /// the TLS protocol.
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            common: CommonState::new(),
            state: Ok(Box::new(hs::ExpectClientHello)),
        }
    }

    /// Process one record received from the peer.
    ///
    /// On error the connection is dead: the same error is returned for
    /// every subsequent call, and a fatal alert is queued for sending
    /// where the protocol allows one.
    pub fn read_message(&mut self, msg: OpaqueMessage) -> Result<(), Error> {
        if let Err(err) = &self.state {
            return Err(err.clone());
        }

        let plain = match self.common.record_layer.decrypt_incoming(msg) {
            Ok(plain) => plain,
            Err(err) => {
                let err = self
                    .common
                    .send_fatal_alert(AlertDescription::BadRecordMac, err);
                return Err(self.latch(err));
            }
        };

        if plain.typ == ContentType::Handshake {
            self.common.hs_joiner.push(plain);
            loop {
                match self.common.hs_joiner.pop() {
                    Ok(Some(msg)) => self.process_main_protocol(msg)?,
                    Ok(None) => break,
                    Err(invalid) => {
                        let err = self
                            .common
                            .send_fatal_alert(AlertDescription::DecodeError, invalid);
                        return Err(self.latch(err));
                    }
                }
            }
            return Ok(());
        }

        let msg = match Message::try_from(plain) {
            Ok(msg) => msg,
            Err(invalid) => {
                let err = self
                    .common
                    .send_fatal_alert(AlertDescription::DecodeError, invalid);
                return Err(self.latch(err));
            }
        };

        self.process_main_protocol(msg)
    }

    /// Fetch the queued records to transmit, oldest first.
    pub fn take_messages(&mut self) -> Vec<OpaqueMessage> {
        self.common.take_tls_messages()
    }

    /// Returns true until the handshake (or a renegotiation) completes.
    pub fn is_handshaking(&self) -> bool {
        !self.common.may_receive_application_data
    }

    /// The server name the client offered, once a hello has been seen.
    pub fn server_name(&self) -> Option<&str> {
        self.common.server_name.as_deref()
    }

    /// The protocol version agreed with the peer, once negotiated.
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.common.negotiated_version
    }

    /// The cipher suite agreed with the peer, once negotiated.
    pub fn negotiated_cipher_suite(&self) -> Option<&'static SupportedCipherSuite> {
        self.common.suite
    }

    /// Drain the application data received so far.
    pub fn take_plaintext(&mut self) -> Vec<u8> {
        mem::take(&mut self.common.received_plaintext)
    }

    /// Send application data to the peer.  Only valid once the
    /// handshake has completed.
    pub fn send_plaintext(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.common.may_receive_application_data {
            let m = Message {
                version: self
                    .common
                    .negotiated_version
                    .unwrap_or(ProtocolVersion::TLSv1_0),
                payload: MessagePayload::ApplicationData(Payload::new(data)),
            };
            self.common.send_msg(m, true)
        } else {
            Err(Error::HandshakeNotComplete)
        }
    }

    /// Queue a `close_notify` alert.
    pub fn send_close_notify(&mut self) {
        self.common
            .send_warning_alert(AlertDescription::CloseNotify);
    }

    fn process_main_protocol(&mut self, msg: Message) -> Result<(), Error> {
        if let MessagePayload::Alert(alert) = &msg.payload {
            return self.process_alert(alert);
        }

        let state = match mem::replace(&mut self.state, Err(Error::HandshakeNotComplete)) {
            Ok(state) => state,
            Err(err) => {
                self.state = Err(err.clone());
                return Err(err);
            }
        };

        let mut cx = hs::ServerContext {
            common: &mut self.common,
            config: &self.config,
        };

        match state.handle(&mut cx, msg) {
            Ok(next) => {
                self.state = Ok(next);
                Ok(())
            }
            Err(err) => {
                if !self.common.has_sent_fatal_alert {
                    if let Some(desc) = fallback_alert(&err) {
                        self.common.send_fatal_alert(desc, err.clone());
                    }
                }
                Err(self.latch(err))
            }
        }
    }

    fn process_alert(&mut self, alert: &AlertMessagePayload) -> Result<(), Error> {
        if alert.level == AlertLevel::Warning
            && alert.description != AlertDescription::CloseNotify
        {
            warn!("TLS alert warning received: {alert:?}");
            return Ok(());
        }

        Err(self.latch(Error::AlertReceived(alert.description)))
    }

    fn latch(&mut self, err: Error) -> Error {
        self.state = Err(err.clone());
        err
    }
}

impl fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("is_handshaking", &self.is_handshaking())
            .finish_non_exhaustive()
    }
}

/// The alert to accompany errors whose origin didn't pick one itself.
fn fallback_alert(err: &Error) -> Option<AlertDescription> {
    match err {
        Error::InappropriateMessage { .. } | Error::InappropriateHandshakeMessage { .. } => {
            Some(AlertDescription::UnexpectedMessage)
        }
        Error::InvalidMessage(_) => Some(AlertDescription::DecodeError),
        Error::DecryptError => Some(AlertDescription::BadRecordMac),
        Error::PeerMisbehaved(_) => Some(AlertDescription::IllegalParameter),
        Error::PeerIncompatible(_) => Some(AlertDescription::HandshakeFailure),
        Error::PeerSentOversizedRecord => Some(AlertDescription::RecordOverflow),
        Error::EncryptError | Error::FailedToGetRandomBytes | Error::General(_) => {
            Some(AlertDescription::InternalError)
        }
        Error::AlertReceived(_) | Error::HandshakeNotComplete => None,
    }
}
