//! End-to-end exercises of the server state machine, played against a
//! minimal in-test client built from this crate's own primitives.

use std::sync::Arc;

use digest::Digest;
use num_bigint::BigUint;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPublicKey};
use sha2::Sha256;

use crate::cipher::{MessageDecrypter, MessageEncrypter};
use crate::error::{Error, PeerIncompatible, PeerMisbehaved};
use crate::hash_hs::HandshakeHash;
use crate::key_schedule::{ConnectionRandoms, ConnectionSecrets};
use crate::msgs::base::{Payload, PayloadU16, PayloadU8};
use crate::msgs::codec::{Codec, Reader};
use crate::msgs::enums::{
    AlertDescription, CipherSuite, Compression, ContentType, HandshakeType, HashAlgorithm,
    ProtocolVersion, ServerNameType, SignatureAlgorithm,
};
use crate::msgs::handshake::{
    ClientExtension, ClientHelloPayload, HandshakeMessagePayload, HandshakePayload, Random,
    ServerDhParams, ServerExtension, ServerHelloPayload, ServerName, ServerNamePayload,
    SessionId, SignatureAndHashAlgorithm,
};
use crate::msgs::message::{OpaqueMessage, PlainMessage};
use crate::server::{ServerConfig, ServerConnection};
use crate::sign::test_utils::{shared_key_der, shared_test_key, test_chain};
use crate::suites::{self, SupportedCipherSuite};
use crate::ConfigError;

const CLIENT_RANDOM: [u8; 32] = [0x2a; 32];

fn server_config(suite: &'static SupportedCipherSuite) -> Arc<ServerConfig> {
    let _ = env_logger::builder().is_test(true).try_init();
    Arc::new(
        ServerConfig::builder()
            .with_cipher_suites(&[suite])
            .with_single_cert(test_chain(), shared_key_der())
            .build()
            .unwrap(),
    )
}

/// A client half driven entirely by the test, so every byte the server
/// sees is constructed independently of the code under test.
struct TestClient {
    offered_version: ProtocolVersion,
    version: ProtocolVersion,
    suite: &'static SupportedCipherSuite,
    transcript: HandshakeHash,
    server_random: [u8; 32],
    secrets: Option<ConnectionSecrets>,
    enc: Option<Box<dyn MessageEncrypter>>,
    dec: Option<Box<dyn MessageDecrypter>>,
    enc_seq: u64,
    dec_seq: u64,
    sent_client_verify_data: Vec<u8>,
    seen_server_verify_data: Vec<u8>,
}

impl TestClient {
    fn new(offered_version: ProtocolVersion, suite: &'static SupportedCipherSuite) -> Self {
        Self {
            offered_version,
            version: ProtocolVersion::TLSv1_0,
            suite,
            transcript: HandshakeHash::new(),
            server_random: [0; 32],
            secrets: None,
            enc: None,
            dec: None,
            enc_seq: 0,
            dec_seq: 0,
            sent_client_verify_data: Vec::new(),
            seen_server_verify_data: Vec::new(),
        }
    }

    fn basic_hello(&self) -> ClientHelloPayload {
        ClientHelloPayload {
            client_version: self.offered_version,
            random: Random(CLIENT_RANDOM),
            session_id: SessionId::empty(),
            cipher_suites: vec![
                self.suite.suite,
                CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
            ],
            compression_methods: vec![Compression::Null],
            extensions: vec![ClientExtension::SignatureAlgorithms(vec![
                SignatureAndHashAlgorithm {
                    hash: HashAlgorithm::SHA256,
                    sign: SignatureAlgorithm::RSA,
                },
                SignatureAndHashAlgorithm {
                    hash: HashAlgorithm::SHA1,
                    sign: SignatureAlgorithm::RSA,
                },
            ])],
        }
    }

    fn send_handshake(
        &mut self,
        conn: &mut ServerConnection,
        payload: HandshakeMessagePayload,
    ) -> Result<(), Error> {
        let bytes = payload.get_encoding();
        self.transcript.add_raw(&bytes);

        let msg = match &mut self.enc {
            Some(enc) => {
                let plain = PlainMessage {
                    typ: ContentType::Handshake,
                    version: self.version,
                    payload: Payload::new(bytes),
                };
                let seq = self.enc_seq;
                self.enc_seq += 1;
                enc.encrypt(plain, seq).unwrap()
            }
            None => OpaqueMessage {
                typ: ContentType::Handshake,
                version: ProtocolVersion::TLSv1_0,
                payload: Payload::new(bytes),
            },
        };

        conn.read_message(msg)
    }

    fn send_hello(
        &mut self,
        conn: &mut ServerConnection,
        hello: ClientHelloPayload,
    ) -> Result<(), Error> {
        self.send_handshake(
            conn,
            HandshakeMessagePayload {
                typ: HandshakeType::ClientHello,
                payload: HandshakePayload::ClientHello(hello),
            },
        )
    }

    /// Collect the server's handshake flight, decrypting if this is a
    /// renegotiation, and parse it into individual messages.
    fn read_flight(&mut self, conn: &mut ServerConnection) -> Vec<HandshakeMessagePayload> {
        let mut buf = Vec::new();
        for rec in conn.take_messages() {
            let plain = match &mut self.dec {
                Some(dec) => {
                    let seq = self.dec_seq;
                    self.dec_seq += 1;
                    dec.decrypt(rec, seq).unwrap()
                }
                None => rec.into_plain_message(),
            };
            assert_eq!(plain.typ, ContentType::Handshake);
            buf.extend_from_slice(&plain.payload.0);
        }
        self.transcript.add_raw(&buf);

        let mut r = Reader::init(&buf);
        let mut out = Vec::new();
        while r.any_left() {
            out.push(HandshakeMessagePayload::read(&mut r).unwrap());
        }
        out
    }

    fn digest_server_hello(&mut self, flight: &[HandshakeMessagePayload]) -> ServerHelloPayload {
        let sh = match &flight[0].payload {
            HandshakePayload::ServerHello(sh) => sh.clone(),
            other => panic!("expected server hello, got {other:?}"),
        };
        self.version = sh.legacy_version;
        self.server_random = sh.random.0;
        sh
    }

    fn send_rsa_ckx(&mut self, conn: &mut ServerConnection, pms: &[u8]) -> Result<(), Error> {
        let pk = RsaPublicKey::from(shared_test_key());
        let ct = pk
            .encrypt(&mut rand_core::OsRng, Pkcs1v15Encrypt, pms)
            .unwrap();
        self.send_ckx_body(conn, PayloadU16::new(ct).get_encoding())
    }

    fn send_ckx_body(&mut self, conn: &mut ServerConnection, body: Vec<u8>) -> Result<(), Error> {
        self.send_handshake(
            conn,
            HandshakeMessagePayload {
                typ: HandshakeType::ClientKeyExchange,
                payload: HandshakePayload::ClientKeyExchange(Payload::new(body)),
            },
        )
    }

    fn send_ccs(&mut self, conn: &mut ServerConnection) -> Result<(), Error> {
        conn.read_message(OpaqueMessage {
            typ: ContentType::ChangeCipherSpec,
            version: self.version,
            payload: Payload::new(vec![0x01]),
        })
    }

    /// Run the key schedule on the client side and switch to the new
    /// protection contexts.
    fn establish(&mut self, pms: &[u8]) {
        let secrets = ConnectionSecrets::from_premaster(
            pms,
            self.version,
            self.suite,
            ConnectionRandoms::new(CLIENT_RANDOM, self.server_random),
        );
        let (enc, dec) = secrets.make_client_cipher_pair();
        self.secrets = Some(secrets);
        self.enc = Some(enc);
        self.dec = Some(dec);
        self.enc_seq = 0;
        self.dec_seq = 0;
    }

    fn send_finished(&mut self, conn: &mut ServerConnection) -> Result<(), Error> {
        let vh = self
            .transcript
            .transcript_hash(self.version);
        let verify_data = self
            .secrets
            .as_ref()
            .unwrap()
            .client_verify_data(&vh);
        assert_eq!(verify_data.len(), 12);
        self.sent_client_verify_data = verify_data.clone();

        self.send_handshake(
            conn,
            HandshakeMessagePayload {
                typ: HandshakeType::Finished,
                payload: HandshakePayload::Finished(Payload::new(verify_data)),
            },
        )
    }

    /// Read and verify the server's ChangeCipherSpec and Finished.
    fn read_ccs_and_finished(&mut self, conn: &mut ServerConnection) {
        let msgs = conn.take_messages();
        assert_eq!(msgs.len(), 2);

        assert_eq!(msgs[0].typ, ContentType::ChangeCipherSpec);
        assert_eq!(msgs[0].payload.0, vec![0x01]);

        let seq = self.dec_seq;
        self.dec_seq += 1;
        let plain = self
            .dec
            .as_mut()
            .unwrap()
            .decrypt(msgs[1].clone(), seq)
            .unwrap();
        assert_eq!(plain.typ, ContentType::Handshake);

        let parsed = HandshakeMessagePayload::read_bytes(&plain.payload.0).unwrap();
        let verify_data = match parsed.payload {
            HandshakePayload::Finished(ref payload) => payload.0.clone(),
            ref other => panic!("expected finished, got {other:?}"),
        };

        // the server's Finished covers the transcript including ours
        let vh = self
            .transcript
            .transcript_hash(self.version);
        let expect = self
            .secrets
            .as_ref()
            .unwrap()
            .server_verify_data(&vh);
        assert_eq!(verify_data, expect);
        self.seen_server_verify_data = verify_data;

        self.transcript.add_raw(&plain.payload.0);
    }

    fn decrypt(&mut self, rec: OpaqueMessage) -> PlainMessage {
        let seq = self.dec_seq;
        self.dec_seq += 1;
        self.dec
            .as_mut()
            .unwrap()
            .decrypt(rec, seq)
            .unwrap()
    }

    fn client_verify_data(&self) -> Vec<u8> {
        self.sent_client_verify_data.clone()
    }
}

/// Drive a complete RSA-key-exchange handshake and return the pair.
fn run_rsa_handshake(
    version: ProtocolVersion,
    suite: &'static SupportedCipherSuite,
    config: Arc<ServerConfig>,
) -> (TestClient, ServerConnection) {
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(version, suite);

    let hello = client.basic_hello();
    client.send_hello(&mut conn, hello).unwrap();

    let flight = client.read_flight(&mut conn);
    assert_eq!(flight.len(), 3);
    let sh = client.digest_server_hello(&flight);
    assert_eq!(sh.legacy_version, version);
    assert_eq!(sh.cipher_suite, suite.suite);
    assert!(sh.session_id.is_empty());
    assert_eq!(
        sh.renegotiation_info().map(|info| info.0.as_slice()),
        Some(&[][..])
    );
    match &flight[1].payload {
        HandshakePayload::Certificate(chain) => {
            assert_eq!(chain.len(), 1);
            assert_eq!(chain[0].as_ref(), test_chain()[0].as_ref());
        }
        other => panic!("expected certificate, got {other:?}"),
    }
    assert_eq!(flight[2].typ, HandshakeType::ServerHelloDone);

    let mut pms = vec![0u8; 48];
    pms[..2].copy_from_slice(&version.to_array());
    pms[2..].copy_from_slice(&[0x11; 46]);

    client.send_rsa_ckx(&mut conn, &pms).unwrap();
    client.send_ccs(&mut conn).unwrap();
    client.establish(&pms);
    client.send_finished(&mut conn).unwrap();
    client.read_ccs_and_finished(&mut conn);

    assert!(!conn.is_handshaking());
    assert_eq!(conn.protocol_version(), Some(version));
    assert_eq!(conn.negotiated_cipher_suite().unwrap().suite, suite.suite);
    (client, conn)
}

fn expect_fatal_alert(conn: &mut ServerConnection, desc: AlertDescription) {
    let alert = conn
        .take_messages()
        .into_iter()
        .find(|m| m.typ == ContentType::Alert)
        .expect("no alert sent");
    assert_eq!(alert.payload.0, vec![0x02, u8::from(desc)]);
}

#[test]
fn rsa_handshake_happy_path() {
    let config = server_config(&suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA);
    let (mut client, mut conn) =
        run_rsa_handshake(ProtocolVersion::TLSv1_2, &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA, config);

    // server-to-client application data
    conn.send_plaintext(b"ferrotls server says hi").unwrap();
    let out = conn.take_messages();
    assert_eq!(out.len(), 1);
    let plain = client.decrypt(out[0].clone());
    assert_eq!(plain.typ, ContentType::ApplicationData);
    assert_eq!(plain.payload.0, b"ferrotls server says hi".to_vec());

    // client-to-server application data
    let seq = client.enc_seq;
    client.enc_seq += 1;
    let wire = client
        .enc
        .as_mut()
        .unwrap()
        .encrypt(
            PlainMessage {
                typ: ContentType::ApplicationData,
                version: ProtocolVersion::TLSv1_2,
                payload: Payload::new(b"hello server".to_vec()),
            },
            seq,
        )
        .unwrap();
    conn.read_message(wire).unwrap();
    assert_eq!(conn.take_plaintext(), b"hello server".to_vec());
}

#[test]
fn rsa_handshake_on_tls10_and_tls11() {
    for version in [ProtocolVersion::TLSv1_0, ProtocolVersion::TLSv1_1] {
        let config = server_config(&suites::TLS_RSA_WITH_AES_128_CBC_SHA);
        run_rsa_handshake(version, &suites::TLS_RSA_WITH_AES_128_CBC_SHA, config);
    }
}

#[test]
fn rc4_handshake() {
    let config = server_config(&suites::TLS_RSA_WITH_RC4_128_SHA);
    run_rsa_handshake(
        ProtocolVersion::TLSv1_2,
        &suites::TLS_RSA_WITH_RC4_128_SHA,
        config,
    );
}

#[test]
fn dhe_handshake() {
    for version in [ProtocolVersion::TLSv1_0, ProtocolVersion::TLSv1_2] {
        let suite = &suites::TLS_DHE_RSA_WITH_AES_128_CBC_SHA;
        let config = server_config(suite);
        let mut conn = ServerConnection::new(config);
        let mut client = TestClient::new(version, suite);

        let hello = client.basic_hello();
        client.send_hello(&mut conn, hello).unwrap();

        let flight = client.read_flight(&mut conn);
        assert_eq!(flight.len(), 4);
        client.digest_server_hello(&flight);
        assert_eq!(flight[2].typ, HandshakeType::ServerKeyExchange);

        let skx_body = match &flight[2].payload {
            HandshakePayload::Unknown(payload) => payload.0.clone(),
            other => panic!("expected raw server kx, got {other:?}"),
        };

        // parse the params and the version-dependent signature
        let mut r = Reader::init(&skx_body);
        let params = ServerDhParams::read(&mut r).unwrap();
        let mut signed = Vec::new();
        signed.extend_from_slice(&CLIENT_RANDOM);
        signed.extend_from_slice(&client.server_random);
        params.encode(&mut signed);

        let pk = RsaPublicKey::from(shared_test_key());
        match version {
            ProtocolVersion::TLSv1_2 => {
                let scheme = SignatureAndHashAlgorithm::read(&mut r).unwrap();
                assert_eq!(scheme.hash, HashAlgorithm::SHA256);
                assert_eq!(scheme.sign, SignatureAlgorithm::RSA);
                let sig = PayloadU16::read(&mut r).unwrap();
                pk.verify(
                    Pkcs1v15Sign::new::<Sha256>(),
                    Sha256::digest(&signed).as_slice(),
                    &sig.0,
                )
                .unwrap();
            }
            _ => {
                let sig = PayloadU16::read(&mut r).unwrap();
                let mut digest = Vec::new();
                digest.extend_from_slice(md5::Md5::digest(&signed).as_slice());
                digest.extend_from_slice(sha1::Sha1::digest(&signed).as_slice());
                pk.verify(Pkcs1v15Sign::new_unprefixed(), &digest, &sig.0)
                    .unwrap();
            }
        }
        assert!(!r.any_left());

        // do our half of the exchange
        let p = BigUint::from_bytes_be(&params.dh_p.0);
        let g = BigUint::from_bytes_be(&params.dh_g.0);
        let ys = BigUint::from_bytes_be(&params.dh_ys.0);
        let x = BigUint::from_bytes_be(&[0x42; 64]);
        let yc = g.modpow(&x, &p);
        let pms = ys.modpow(&x, &p).to_bytes_be();

        client
            .send_ckx_body(&mut conn, PayloadU16::new(yc.to_bytes_be()).get_encoding())
            .unwrap();
        client.send_ccs(&mut conn).unwrap();
        client.establish(&pms);
        client.send_finished(&mut conn).unwrap();
        client.read_ccs_and_finished(&mut conn);
        assert!(!conn.is_handshaking());
    }
}

#[test]
fn version_mismatch_is_fatal() {
    let config = server_config(&suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA);
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(
        ProtocolVersion::SSLv3,
        &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA,
    );

    let hello = client.basic_hello();
    assert_eq!(
        client.send_hello(&mut conn, hello),
        Err(Error::PeerIncompatible(
            PeerIncompatible::NoProtocolVersionsInCommon
        ))
    );
    expect_fatal_alert(&mut conn, AlertDescription::ProtocolVersion);
}

#[test]
fn no_common_cipher_suite_is_fatal() {
    let config = server_config(&suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA);
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(
        ProtocolVersion::TLSv1_2,
        &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA,
    );

    let mut hello = client.basic_hello();
    hello.cipher_suites = vec![
        CipherSuite::from(0xfff0),
        CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
    ];
    assert_eq!(
        client.send_hello(&mut conn, hello),
        Err(Error::PeerIncompatible(
            PeerIncompatible::NoCipherSuitesInCommon
        ))
    );
    expect_fatal_alert(&mut conn, AlertDescription::HandshakeFailure);
}

#[test]
fn sha256_suite_is_refused_below_tls12() {
    let config = server_config(&suites::TLS_RSA_WITH_AES_128_CBC_SHA256);
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(
        ProtocolVersion::TLSv1_1,
        &suites::TLS_RSA_WITH_AES_128_CBC_SHA256,
    );

    let hello = client.basic_hello();
    assert_eq!(
        client.send_hello(&mut conn, hello),
        Err(Error::PeerIncompatible(
            PeerIncompatible::NoCipherSuitesInCommon
        ))
    );
}

#[test]
fn bleichenbacher_countermeasure() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = server_config(suite);
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(ProtocolVersion::TLSv1_2, suite);

    let hello = client.basic_hello();
    client.send_hello(&mut conn, hello).unwrap();
    let flight = client.read_flight(&mut conn);
    client.digest_server_hello(&flight);

    // an undecryptable ciphertext must be accepted without any
    // observable reaction
    client
        .send_ckx_body(
            &mut conn,
            PayloadU16::new(vec![0x5a; 256]).get_encoding(),
        )
        .unwrap();
    assert!(conn.take_messages().is_empty());

    client.send_ccs(&mut conn).unwrap();

    // the client can only guess the laundered pre-master secret, so the
    // failure appears at Finished as a record MAC failure
    client.establish(&[0u8; 48]);
    assert_eq!(
        client.send_finished(&mut conn),
        Err(Error::DecryptError)
    );
    expect_fatal_alert(&mut conn, AlertDescription::BadRecordMac);
}

#[test]
fn unexpected_message_is_fatal() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = server_config(suite);
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(ProtocolVersion::TLSv1_2, suite);

    // key exchange before hello
    let err = client
        .send_ckx_body(&mut conn, PayloadU16::new(vec![0x00; 48]).get_encoding())
        .unwrap_err();
    assert!(matches!(err, Error::InappropriateHandshakeMessage { .. }));
    expect_fatal_alert(&mut conn, AlertDescription::UnexpectedMessage);

    // the connection stays dead
    let hello = client.basic_hello();
    assert!(client.send_hello(&mut conn, hello).is_err());
}

#[test]
fn application_data_before_finished_is_unexpected() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = server_config(suite);
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(ProtocolVersion::TLSv1_2, suite);

    let hello = client.basic_hello();
    client.send_hello(&mut conn, hello).unwrap();
    let flight = client.read_flight(&mut conn);
    client.digest_server_hello(&flight);

    let mut pms = vec![0u8; 48];
    pms[..2].copy_from_slice(&ProtocolVersion::TLSv1_2.to_array());
    pms[2..].copy_from_slice(&[0x11; 46]);
    client.send_rsa_ckx(&mut conn, &pms).unwrap();
    client.send_ccs(&mut conn).unwrap();
    client.establish(&pms);

    // encrypted application data between CCS and Finished
    let wire = client
        .enc
        .as_mut()
        .unwrap()
        .encrypt(
            PlainMessage {
                typ: ContentType::ApplicationData,
                version: ProtocolVersion::TLSv1_2,
                payload: Payload::new(Vec::new()),
            },
            0,
        )
        .unwrap();
    let err = conn.read_message(wire).unwrap_err();
    assert!(matches!(err, Error::InappropriateMessage { .. }));
    expect_fatal_alert(&mut conn, AlertDescription::UnexpectedMessage);
}

#[test]
fn missing_secure_renegotiation_signal_is_fatal() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = server_config(suite);
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(ProtocolVersion::TLSv1_2, suite);

    let mut hello = client.basic_hello();
    hello.cipher_suites = vec![suite.suite]; // no SCSV, no extension
    assert_eq!(
        client.send_hello(&mut conn, hello),
        Err(Error::PeerIncompatible(
            PeerIncompatible::SecureRenegotiationRequired
        ))
    );
    expect_fatal_alert(&mut conn, AlertDescription::HandshakeFailure);
}

#[test]
fn secure_renegotiation_signal_optional_when_configured() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = Arc::new(
        ServerConfig::builder()
            .with_cipher_suites(&[suite])
            .with_secure_renegotiation_required(false)
            .with_single_cert(test_chain(), shared_key_der())
            .build()
            .unwrap(),
    );
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(ProtocolVersion::TLSv1_2, suite);

    let mut hello = client.basic_hello();
    hello.cipher_suites = vec![suite.suite];
    client.send_hello(&mut conn, hello).unwrap();
    assert_eq!(client.read_flight(&mut conn).len(), 3);
}

#[test]
fn nonempty_initial_renegotiation_info_is_fatal() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = server_config(suite);
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(ProtocolVersion::TLSv1_2, suite);

    let mut hello = client.basic_hello();
    hello
        .extensions
        .push(ClientExtension::RenegotiationInfo(PayloadU8::new(vec![
            0xde, 0xad,
        ])));
    assert_eq!(
        client.send_hello(&mut conn, hello),
        Err(Error::PeerMisbehaved(
            PeerMisbehaved::InvalidRenegotiationInfo
        ))
    );
    expect_fatal_alert(&mut conn, AlertDescription::HandshakeFailure);
}

#[test]
fn renegotiation_denied_by_default() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = server_config(suite);
    let (mut client, mut conn) = run_rsa_handshake(ProtocolVersion::TLSv1_2, suite, config);

    let mut hello = client.basic_hello();
    hello.cipher_suites = vec![suite.suite];
    hello
        .extensions
        .push(ClientExtension::RenegotiationInfo(PayloadU8::new(
            client.client_verify_data(),
        )));

    client.transcript = HandshakeHash::new();
    assert_eq!(
        client.send_hello(&mut conn, hello),
        Err(Error::PeerMisbehaved(PeerMisbehaved::RenegotiationDenied))
    );

    // the alert travels under the established keys
    let alert = conn
        .take_messages()
        .into_iter()
        .find(|m| m.typ == ContentType::Alert)
        .expect("no alert sent");
    let plain = client.decrypt(alert);
    assert_eq!(
        plain.payload.0,
        vec![0x02, u8::from(AlertDescription::HandshakeFailure)]
    );
}

#[test]
fn renegotiation_requires_matching_verify_data() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = Arc::new(
        ServerConfig::builder()
            .with_cipher_suites(&[suite])
            .with_renegotiation(true)
            .with_single_cert(test_chain(), shared_key_der())
            .build()
            .unwrap(),
    );
    let (mut client, mut conn) = run_rsa_handshake(ProtocolVersion::TLSv1_2, suite, config);

    let mut hello = client.basic_hello();
    hello.cipher_suites = vec![suite.suite];
    hello
        .extensions
        .push(ClientExtension::RenegotiationInfo(PayloadU8::new(vec![
            0xba; 12
        ])));

    client.transcript = HandshakeHash::new();
    assert_eq!(
        client.send_hello(&mut conn, hello),
        Err(Error::PeerMisbehaved(
            PeerMisbehaved::InvalidRenegotiationInfo
        ))
    );
}

#[test]
fn renegotiation_hello_binds_prior_verify_data() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = Arc::new(
        ServerConfig::builder()
            .with_cipher_suites(&[suite])
            .with_renegotiation(true)
            .with_single_cert(test_chain(), shared_key_der())
            .build()
            .unwrap(),
    );
    let (mut client, mut conn) = run_rsa_handshake(ProtocolVersion::TLSv1_2, suite, config);

    let client_vd = client.client_verify_data();
    let server_vd = client.seen_server_verify_data.clone();

    let mut hello = client.basic_hello();
    hello.cipher_suites = vec![suite.suite];
    hello
        .extensions
        .push(ClientExtension::RenegotiationInfo(PayloadU8::new(
            client_vd.clone(),
        )));

    client.transcript = HandshakeHash::new();
    client.send_hello(&mut conn, hello).unwrap();
    assert!(conn.is_handshaking());

    let flight = client.read_flight(&mut conn);
    assert_eq!(flight.len(), 3);
    let sh = client.digest_server_hello(&flight);

    let bound = sh.renegotiation_info().unwrap();
    assert_eq!(bound.0.len(), 24);
    assert_eq!(&bound.0[..12], client_vd.as_slice());
    assert_eq!(&bound.0[12..], server_vd.as_slice());
}

#[test]
fn sni_is_acked_and_surfaced() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = server_config(suite);
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(ProtocolVersion::TLSv1_2, suite);

    let mut hello = client.basic_hello();
    hello
        .extensions
        .push(ClientExtension::ServerName(vec![ServerName {
            typ: ServerNameType::HostName,
            payload: ServerNamePayload::HostName("ferrous.example".to_string()),
        }]));
    client.send_hello(&mut conn, hello).unwrap();

    assert_eq!(conn.server_name(), Some("ferrous.example"));

    let flight = client.read_flight(&mut conn);
    let sh = client.digest_server_hello(&flight);
    assert!(sh
        .extensions
        .iter()
        .any(|ext| matches!(ext, ServerExtension::ServerNameAck)));
}

#[test]
fn mismatched_sni_is_fatal() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = Arc::new(
        ServerConfig::builder()
            .with_cipher_suites(&[suite])
            .with_expected_sni("right.example")
            .with_single_cert(test_chain(), shared_key_der())
            .build()
            .unwrap(),
    );
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(ProtocolVersion::TLSv1_2, suite);

    let mut hello = client.basic_hello();
    hello
        .extensions
        .push(ClientExtension::ServerName(vec![ServerName {
            typ: ServerNameType::HostName,
            payload: ServerNamePayload::HostName("wrong.example".to_string()),
        }]));
    assert_eq!(
        client.send_hello(&mut conn, hello),
        Err(Error::PeerMisbehaved(PeerMisbehaved::ServerNameMismatch))
    );
    expect_fatal_alert(&mut conn, AlertDescription::IllegalParameter);
}

#[test]
fn config_requires_certificate_for_every_suite() {
    assert_eq!(
        ServerConfig::builder().build().unwrap_err(),
        ConfigError::MissingCertificate
    );
}

#[test]
fn config_rejects_nonsense() {
    assert_eq!(
        ServerConfig::builder()
            .with_cipher_suites(&[])
            .build()
            .unwrap_err(),
        ConfigError::EmptyCipherSuites
    );

    assert_eq!(
        ServerConfig::builder()
            .with_protocol_versions(ProtocolVersion::TLSv1_2, ProtocolVersion::TLSv1_0)
            .with_single_cert(test_chain(), shared_key_der())
            .build()
            .unwrap_err(),
        ConfigError::InvalidVersionRange
    );

    assert_eq!(
        ServerConfig::builder()
            .with_protocol_versions(ProtocolVersion::TLSv1_2, ProtocolVersion::TLSv1_3)
            .with_single_cert(test_chain(), shared_key_der())
            .build()
            .unwrap_err(),
        ConfigError::InvalidVersionRange
    );

    assert_eq!(
        ServerConfig::builder()
            .with_signature_hashes(&[])
            .with_single_cert(test_chain(), shared_key_der())
            .build()
            .unwrap_err(),
        ConfigError::EmptySignatureHashes
    );
}

#[test]
fn config_rejects_small_keys() {
    use rsa::pkcs8::EncodePrivateKey;

    let small = rsa::RsaPrivateKey::new(&mut rand_core::OsRng, 512).unwrap();
    let der = small.to_pkcs8_der().unwrap();
    let key = pki_types::PrivateKeyDer::Pkcs8(der.as_bytes().to_vec().into());

    assert_eq!(
        ServerConfig::builder()
            .with_single_cert(test_chain(), key)
            .build()
            .unwrap_err(),
        ConfigError::InsufficientKeySize { bits: 512 }
    );
}

#[test]
fn version_window_restricts_selection() {
    let suite = &suites::TLS_RSA_WITH_3DES_EDE_CBC_SHA;
    let config = Arc::new(
        ServerConfig::builder()
            .with_cipher_suites(&[suite])
            .with_protocol_versions(ProtocolVersion::TLSv1_0, ProtocolVersion::TLSv1_1)
            .with_single_cert(test_chain(), shared_key_der())
            .build()
            .unwrap(),
    );

    // client offers 1.2; the server picks its highest enabled, 1.1
    let mut conn = ServerConnection::new(config);
    let mut client = TestClient::new(ProtocolVersion::TLSv1_2, suite);
    let hello = client.basic_hello();
    client.send_hello(&mut conn, hello).unwrap();

    let flight = client.read_flight(&mut conn);
    let sh = client.digest_server_hello(&flight);
    assert_eq!(sh.legacy_version, ProtocolVersion::TLSv1_1);
}
