use std::sync::Arc;

use log::{debug, trace};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::check::inappropriate_message;
use crate::cipher::{MessageDecrypter, MessageEncrypter};
use crate::common_state::{CommonState, RenegotiationData};
use crate::error::{Error, PeerIncompatible, PeerMisbehaved};
use crate::hash_hs::HandshakeHash;
use crate::key_schedule::{ConnectionRandoms, ConnectionSecrets};
use crate::kx::{KeyExchange, OAKLEY_GROUP_2};
use crate::msgs::base::{Payload, PayloadU16, PayloadU8};
use crate::msgs::ccs::ChangeCipherSpecPayload;
use crate::msgs::codec::{Codec, Reader};
use crate::msgs::enums::{
    AlertDescription, Compression, ContentType, HandshakeType, HashAlgorithm, ProtocolVersion,
    SignatureAlgorithm,
};
use crate::msgs::handshake::{
    ClientHelloPayload, DigitallySigned, HandshakeMessagePayload, HandshakePayload, Random,
    ServerDhParams, ServerHelloPayload, ServerKeyExchange, SessionId, SignatureAndHashAlgorithm,
};
use crate::msgs::handshake::ServerExtension;
use crate::msgs::message::{Message, MessagePayload};
use crate::rand;
use crate::server::ServerConfig;
use crate::sign::CertifiedKey;
use crate::suites::{self, KeyExchangeAlgorithm, SupportedCipherSuite};

pub(crate) type NextState = Box<dyn State>;
pub(crate) type NextStateOrError = Result<NextState, Error>;

pub(crate) struct ServerContext<'a> {
    pub(crate) common: &'a mut CommonState,
    pub(crate) config: &'a Arc<ServerConfig>,
}

/// One stage of the server handshake.  Each stage owns exactly the data
/// it needs, so a message arriving in the wrong stage has no handler and
/// fails as unexpected.
pub(crate) trait State: Send + Sync {
    fn handle(self: Box<Self>, cx: &mut ServerContext<'_>, m: Message) -> NextStateOrError;
}

/// --- Process client's ClientHello ---
pub(crate) struct ExpectClientHello;

impl State for ExpectClientHello {
    fn handle(self: Box<Self>, cx: &mut ServerContext<'_>, m: Message) -> NextStateOrError {
        let client_hello =
            require_handshake_msg!(m, HandshakeType::ClientHello, HandshakePayload::ClientHello)?;
        trace!("we got a clienthello {client_hello:?}");

        // No partial handshake message may straddle this hello.
        cx.common.check_aligned_handshake()?;

        validate_client_hello(cx, client_hello)?;

        let sni = client_hello.server_name().map(str::to_string);
        if let (Some(expected), Some(offered)) = (&cx.config.expected_sni, &sni) {
            if expected != offered {
                return Err(cx.common.send_fatal_alert(
                    AlertDescription::IllegalParameter,
                    PeerMisbehaved::ServerNameMismatch,
                ));
            }
        }

        let version = cx
            .config
            .select_version(client_hello.client_version)
            .ok_or_else(|| {
                cx.common.send_fatal_alert(
                    AlertDescription::ProtocolVersion,
                    PeerIncompatible::NoProtocolVersionsInCommon,
                )
            })?;
        debug!("decided upon version {version:?}");
        cx.common.negotiated_version = Some(version);

        check_renegotiation(cx, client_hello)?;

        let suitable = cx
            .config
            .cipher_suites
            .iter()
            .copied()
            .filter(|suite| suite.usable_for_version(version))
            .collect::<Vec<_>>();
        let suite =
            suites::choose_ciphersuite_preferring_server(&client_hello.cipher_suites, &suitable)
                .ok_or_else(|| {
                    cx.common.send_fatal_alert(
                        AlertDescription::HandshakeFailure,
                        PeerIncompatible::NoCipherSuitesInCommon,
                    )
                })?;
        debug!("decided upon suite {suite:?}");
        cx.common.suite = Some(suite);
        cx.common.server_name = sni;

        let randoms = ConnectionRandoms::new(client_hello.random.0, rand::random_array::<32>()?);

        let mut transcript = HandshakeHash::new();
        transcript.add_message(&m);

        // Certificate presence was enforced when the configuration was
        // built; reaching this point without one is a local logic error.
        let credentials = cx.config.credentials.as_ref().ok_or_else(|| {
            cx.common.send_fatal_alert(
                AlertDescription::HandshakeFailure,
                Error::General("no server credentials configured".to_string()),
            )
        })?;

        let client_sent_sni = client_hello.server_name().is_some();
        let sigalgs = client_hello
            .signature_algorithms()
            .map(<[SignatureAndHashAlgorithm]>::to_vec);

        emit_server_hello(cx, &mut transcript, version, suite, &randoms, client_sent_sni)?;
        emit_certificate(cx, &mut transcript, version, credentials)?;
        let server_kx = match suite.kx {
            KeyExchangeAlgorithm::Rsa => None,
            KeyExchangeAlgorithm::DheRsa => Some(emit_server_kx(
                cx,
                &mut transcript,
                version,
                sigalgs.as_deref(),
                credentials,
                &randoms,
            )?),
        };
        emit_server_hello_done(cx, &mut transcript, version)?;

        Ok(Box::new(ExpectClientKx {
            suite,
            version,
            randoms,
            transcript,
            client_version: client_hello.client_version,
            server_kx,
        }))
    }
}

/// Configuration-independent validation of a `ClientHello` message.
fn validate_client_hello(
    cx: &mut ServerContext<'_>,
    client_hello: &ClientHelloPayload,
) -> Result<(), Error> {
    if client_hello.has_duplicate_extension() {
        return Err(cx.common.send_fatal_alert(
            AlertDescription::DecodeError,
            PeerMisbehaved::DuplicateClientHelloExtensions,
        ));
    }

    if client_hello.cipher_suites.is_empty() {
        return Err(cx.common.send_fatal_alert(
            AlertDescription::IllegalParameter,
            PeerMisbehaved::MissingCipherSuites,
        ));
    }

    if !client_hello
        .compression_methods
        .contains(&Compression::Null)
    {
        return Err(cx.common.send_fatal_alert(
            AlertDescription::IllegalParameter,
            PeerIncompatible::NullCompressionRequired,
        ));
    }

    if client_hello.random.is_all_zero() {
        return Err(cx.common.send_fatal_alert(
            AlertDescription::IllegalParameter,
            PeerMisbehaved::ZeroClientRandom,
        ));
    }

    Ok(())
}

/// RFC 5746 gating.  The SCSV counts as an empty `renegotiation_info`.
fn check_renegotiation(
    cx: &mut ServerContext<'_>,
    client_hello: &ClientHelloPayload,
) -> Result<(), Error> {
    let their_data: Option<Vec<u8>> = client_hello
        .renegotiation_info()
        .map(|info| info.0.clone())
        .or_else(|| client_hello.offers_scsv().then(Vec::new));

    match (&cx.common.reneg_data, &their_data) {
        // initial handshake: if present, it must be empty
        (None, Some(data)) if !data.is_empty() => {
            return Err(cx.common.send_fatal_alert(
                AlertDescription::HandshakeFailure,
                PeerMisbehaved::InvalidRenegotiationInfo,
            ));
        }
        (None, _) => {}
        // renegotiation: the peer must echo our saved client verify_data
        (Some(reneg), theirs) => {
            if theirs.as_deref() != Some(reneg.client_verify_data.as_slice()) {
                return Err(cx.common.send_fatal_alert(
                    AlertDescription::HandshakeFailure,
                    PeerMisbehaved::InvalidRenegotiationInfo,
                ));
            }
        }
    }

    if cx.config.require_secure_renegotiation && their_data.is_none() {
        return Err(cx.common.send_fatal_alert(
            AlertDescription::HandshakeFailure,
            PeerIncompatible::SecureRenegotiationRequired,
        ));
    }

    Ok(())
}

fn emit_server_hello(
    cx: &mut ServerContext<'_>,
    transcript: &mut HandshakeHash,
    version: ProtocolVersion,
    suite: &'static SupportedCipherSuite,
    randoms: &ConnectionRandoms,
    client_sent_sni: bool,
) -> Result<(), Error> {
    let mut extensions = Vec::new();

    // We always signal RFC 5746 support.  Initially the payload is
    // empty; on renegotiation it binds both prior verify_data values.
    let reneg_payload = match &cx.common.reneg_data {
        None => Vec::new(),
        Some(reneg) => {
            let mut bound = reneg.client_verify_data.clone();
            bound.extend_from_slice(&reneg.server_verify_data);
            bound
        }
    };
    extensions.push(ServerExtension::RenegotiationInfo(PayloadU8::new(
        reneg_payload,
    )));

    if client_sent_sni {
        extensions.push(ServerExtension::ServerNameAck);
    }

    let sh = Message {
        version,
        payload: MessagePayload::handshake(HandshakeMessagePayload {
            typ: HandshakeType::ServerHello,
            payload: HandshakePayload::ServerHello(ServerHelloPayload {
                legacy_version: version,
                random: Random(randoms.server),
                session_id: SessionId::empty(),
                cipher_suite: suite.suite,
                compression_method: Compression::Null,
                extensions,
            }),
        }),
    };
    trace!("sending server hello {sh:?}");
    transcript.add_message(&sh);
    cx.common.send_msg(sh, false)
}

fn emit_certificate(
    cx: &mut ServerContext<'_>,
    transcript: &mut HandshakeHash,
    version: ProtocolVersion,
    credentials: &CertifiedKey,
) -> Result<(), Error> {
    let c = Message {
        version,
        payload: MessagePayload::handshake(HandshakeMessagePayload {
            typ: HandshakeType::Certificate,
            payload: HandshakePayload::Certificate(credentials.chain.clone()),
        }),
    };
    transcript.add_message(&c);
    cx.common.send_msg(c, false)
}

fn emit_server_kx(
    cx: &mut ServerContext<'_>,
    transcript: &mut HandshakeHash,
    version: ProtocolVersion,
    sigalgs: Option<&[SignatureAndHashAlgorithm]>,
    credentials: &CertifiedKey,
    randoms: &ConnectionRandoms,
) -> Result<KeyExchange, Error> {
    let kx = KeyExchange::start(&OAKLEY_GROUP_2)?;
    let params = ServerDhParams {
        dh_p: PayloadU16::new(OAKLEY_GROUP_2.p.to_vec()),
        dh_g: PayloadU16::new(OAKLEY_GROUP_2.g.to_vec()),
        dh_ys: PayloadU16::new(kx.pub_key.clone()),
    };

    // The signature covers both randoms and the encoded parameters.
    let mut message = Vec::new();
    message.extend_from_slice(&randoms.client);
    message.extend_from_slice(&randoms.server);
    params.encode(&mut message);

    let dss = match version {
        ProtocolVersion::TLSv1_2 => {
            let hash = choose_signature_hash(sigalgs, &cx.config.signature_hashes).ok_or_else(
                || {
                    cx.common.send_fatal_alert(
                        AlertDescription::HandshakeFailure,
                        PeerIncompatible::NoSignatureSchemesInCommon,
                    )
                },
            )?;
            debug!("signing kx parameters with {hash:?}");
            let sig = credentials
                .key
                .sign_with_hash(hash, &message)
                .map_err(|err| {
                    cx.common
                        .send_fatal_alert(AlertDescription::HandshakeFailure, err)
                })?;
            DigitallySigned {
                scheme: Some(SignatureAndHashAlgorithm {
                    hash,
                    sign: SignatureAlgorithm::RSA,
                }),
                sig: PayloadU16::new(sig),
            }
        }
        _ => {
            let sig = credentials
                .key
                .sign_md5_sha1(&message)
                .map_err(|err| {
                    cx.common
                        .send_fatal_alert(AlertDescription::HandshakeFailure, err)
                })?;
            DigitallySigned {
                scheme: None,
                sig: PayloadU16::new(sig),
            }
        }
    };

    let skx = Message {
        version,
        payload: MessagePayload::handshake(HandshakeMessagePayload {
            typ: HandshakeType::ServerKeyExchange,
            payload: HandshakePayload::ServerKeyExchange(ServerKeyExchange { params, dss }),
        }),
    };
    transcript.add_message(&skx);
    cx.common.send_msg(skx, false)?;
    Ok(kx)
}

/// Choose a TLS 1.2 signature hash: the client's RSA-capable hashes
/// intersected with ours, preserving the client's preference order.
/// Without the extension, SHA-1 is implied.
fn choose_signature_hash(
    offered: Option<&[SignatureAndHashAlgorithm]>,
    ours: &[HashAlgorithm],
) -> Option<HashAlgorithm> {
    match offered {
        None => Some(HashAlgorithm::SHA1),
        Some(algs) => algs
            .iter()
            .filter(|alg| alg.sign == SignatureAlgorithm::RSA)
            .map(|alg| alg.hash)
            .find(|hash| ours.contains(hash)),
    }
}

fn emit_server_hello_done(
    cx: &mut ServerContext<'_>,
    transcript: &mut HandshakeHash,
    version: ProtocolVersion,
) -> Result<(), Error> {
    let m = Message {
        version,
        payload: MessagePayload::handshake(HandshakeMessagePayload {
            typ: HandshakeType::ServerHelloDone,
            payload: HandshakePayload::ServerHelloDone,
        }),
    };
    transcript.add_message(&m);
    cx.common.send_msg(m, false)
}

/// --- Process client's KeyExchange ---
struct ExpectClientKx {
    suite: &'static SupportedCipherSuite,
    version: ProtocolVersion,
    randoms: ConnectionRandoms,
    transcript: HandshakeHash,
    client_version: ProtocolVersion,
    server_kx: Option<KeyExchange>,
}

impl State for ExpectClientKx {
    fn handle(mut self: Box<Self>, cx: &mut ServerContext<'_>, m: Message) -> NextStateOrError {
        let client_kx = require_handshake_msg!(
            m,
            HandshakeType::ClientKeyExchange,
            HandshakePayload::ClientKeyExchange
        )?;

        let mut pms = match self.suite.kx {
            KeyExchangeAlgorithm::Rsa => self.rsa_premaster(cx, client_kx)?,
            KeyExchangeAlgorithm::DheRsa => {
                let kx = self
                    .server_kx
                    .take()
                    .ok_or_else(|| Error::General("key exchange state lost".to_string()))?;
                let peer_pub = decode_kx_body(cx, client_kx)?;
                kx.complete(&peer_pub).map_err(|err| {
                    cx.common
                        .send_fatal_alert(AlertDescription::IllegalParameter, err)
                })?
            }
        };

        self.transcript.add_message(&m);

        let secrets =
            ConnectionSecrets::from_premaster(&pms, self.version, self.suite, self.randoms);
        pms.zeroize();

        // Both contexts exist from here on; each is handed to the
        // record layer by its ChangeCipherSpec.
        let (dec, enc) = secrets.make_cipher_pair();

        Ok(Box::new(ExpectCcs {
            secrets,
            transcript: self.transcript,
            dec,
            enc,
        }))
    }
}

impl ExpectClientKx {
    /// RSA key exchange, with the countermeasure from RFC 5246 section
    /// 7.4.7.1: a decryption or format failure must proceed with a
    /// random pre-master secret, indistinguishably, so that the failure
    /// surfaces only as a bad Finished later.
    fn rsa_premaster(
        &self,
        cx: &mut ServerContext<'_>,
        client_kx: &Payload,
    ) -> Result<Vec<u8>, Error> {
        let credentials = cx.config.credentials.as_ref().ok_or_else(|| {
            Error::General("no server credentials configured".to_string())
        })?;

        // generated before the decryption, so both outcomes do the
        // same work
        let mut other = [0u8; 48];
        rand::fill_random(&mut other[2..])?;
        other[..2].copy_from_slice(&self.version.to_array());

        let ciphertext = decode_kx_body(cx, client_kx)?;

        let pms = match credentials.key.decrypt_pkcs1(&ciphertext) {
            Some(pms)
                if pms.len() == 48 && pms[..2] == self.client_version.to_array() =>
            {
                pms
            }
            _ => other.to_vec(),
        };
        other.zeroize();
        Ok(pms)
    }
}

/// Both ClientKeyExchange bodies are a single u16-length-prefixed
/// vector: the RSA ciphertext, or the client's DH public value.
fn decode_kx_body(cx: &mut ServerContext<'_>, body: &Payload) -> Result<Vec<u8>, Error> {
    let mut rd = Reader::init(&body.0);
    let inner = PayloadU16::read(&mut rd).map_err(|err| {
        cx.common
            .send_fatal_alert(AlertDescription::DecodeError, err)
    })?;
    rd.expect_empty("ClientKeyExchange")
        .map_err(|err| {
            cx.common
                .send_fatal_alert(AlertDescription::DecodeError, err)
        })?;
    Ok(inner.0)
}

/// --- Process client's ChangeCipherSpec ---
struct ExpectCcs {
    secrets: ConnectionSecrets,
    transcript: HandshakeHash,
    dec: Box<dyn MessageDecrypter>,
    enc: Box<dyn MessageEncrypter>,
}

impl State for ExpectCcs {
    fn handle(self: Box<Self>, cx: &mut ServerContext<'_>, m: Message) -> NextStateOrError {
        match m.payload {
            MessagePayload::ChangeCipherSpec(ChangeCipherSpecPayload) => {}
            payload => {
                return Err(inappropriate_message(
                    &payload,
                    &[ContentType::ChangeCipherSpec],
                ));
            }
        }

        // CCS should not be received interleaved with fragmented
        // handshake-level messages.
        cx.common.check_aligned_handshake()?;

        cx.common
            .record_layer
            .set_message_decrypter(self.dec);
        Ok(Box::new(ExpectFinished {
            secrets: self.secrets,
            transcript: self.transcript,
            enc: self.enc,
        }))
    }
}

/// --- Process client's Finished ---
struct ExpectFinished {
    secrets: ConnectionSecrets,
    transcript: HandshakeHash,
    enc: Box<dyn MessageEncrypter>,
}

impl State for ExpectFinished {
    fn handle(mut self: Box<Self>, cx: &mut ServerContext<'_>, m: Message) -> NextStateOrError {
        let finished =
            require_handshake_msg!(m, HandshakeType::Finished, HandshakePayload::Finished)?;

        // the client's CCS got us here
        debug_assert!(cx.common.record_layer.is_decrypting());
        cx.common.check_aligned_handshake()?;

        let vh = self
            .transcript
            .transcript_hash(self.secrets.version());
        let expect_verify_data = self.secrets.client_verify_data(&vh);

        if !bool::from(ConstantTimeEq::ct_eq(
            &expect_verify_data[..],
            &finished.0[..],
        )) {
            return Err(cx.common.send_fatal_alert(
                AlertDescription::BadRecordMac,
                PeerMisbehaved::IncorrectFinished,
            ));
        }
        trace!("client Finished verified");

        // Our Finished covers the transcript including theirs.
        self.transcript.add_message(&m);

        emit_ccs(cx.common, self.secrets.version())?;
        cx.common
            .record_layer
            .set_message_encrypter(self.enc);
        let server_verify_data = emit_finished(&self.secrets, &mut self.transcript, cx.common)?;

        cx.common.reneg_data = Some(RenegotiationData {
            client_verify_data: expect_verify_data,
            server_verify_data,
        });
        cx.common.start_traffic();

        Ok(Box::new(ExpectTraffic))
    }
}

fn emit_ccs(common: &mut CommonState, version: ProtocolVersion) -> Result<(), Error> {
    let m = Message {
        version,
        payload: MessagePayload::ChangeCipherSpec(ChangeCipherSpecPayload),
    };
    common.send_msg(m, false)
}

fn emit_finished(
    secrets: &ConnectionSecrets,
    transcript: &mut HandshakeHash,
    common: &mut CommonState,
) -> Result<Vec<u8>, Error> {
    let vh = transcript.transcript_hash(secrets.version());
    let verify_data = secrets.server_verify_data(&vh);

    let f = Message {
        version: secrets.version(),
        payload: MessagePayload::handshake(HandshakeMessagePayload {
            typ: HandshakeType::Finished,
            payload: HandshakePayload::Finished(Payload::new(verify_data.clone())),
        }),
    };
    transcript.add_message(&f);
    common.send_msg(f, true)?;
    Ok(verify_data)
}

/// --- Established: process traffic, or a renegotiation hello ---
struct ExpectTraffic;

impl State for ExpectTraffic {
    fn handle(self: Box<Self>, cx: &mut ServerContext<'_>, m: Message) -> NextStateOrError {
        if let MessagePayload::ApplicationData(payload) = &m.payload {
            cx.common
                .received_plaintext
                .extend_from_slice(&payload.0);
            return Ok(self);
        }

        if m.is_handshake_type(HandshakeType::ClientHello) {
            if !cx.config.allow_renegotiation {
                return Err(cx.common.send_fatal_alert(
                    AlertDescription::HandshakeFailure,
                    PeerMisbehaved::RenegotiationDenied,
                ));
            }

            debug!("accepting renegotiation");
            cx.common.may_receive_application_data = false;
            return Box::new(ExpectClientHello).handle(cx, m);
        }

        Err(inappropriate_message(
            &m.payload,
            &[ContentType::ApplicationData, ContentType::Handshake],
        ))
    }
}
