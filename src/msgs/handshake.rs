use core::fmt;

use pki_types::CertificateDer;

use crate::error::InvalidMessage;
use crate::msgs::base::{hex, Payload, PayloadU16, PayloadU8};
use crate::msgs::codec::{Codec, LengthPrefixedBuffer, ListLength, Reader, TlsListElement};
use crate::msgs::enums::{
    CipherSuite, Compression, ExtensionType, HandshakeType, HashAlgorithm, ProtocolVersion,
    ServerNameType, SignatureAlgorithm,
};

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Random(pub [u8; 32]);

impl Random {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidMessage> {
        match bytes.try_into() {
            Ok(opaque) => Ok(Self(opaque)),
            Err(_) => Err(InvalidMessage::MissingData("Random")),
        }
    }

    pub(crate) fn is_all_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Codec for Random {
    fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.0);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let Some(bytes) = r.take(32) else {
            return Err(InvalidMessage::MissingData("Random"));
        };

        let mut opaque = [0; 32];
        opaque.clone_from_slice(bytes);
        Ok(Self(opaque))
    }
}

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, &self.0)
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct SessionId {
    len: usize,
    data: [u8; 32],
}

impl SessionId {
    pub fn empty() -> Self {
        Self {
            len: 0,
            data: [0; 32],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Codec for SessionId {
    fn encode(&self, bytes: &mut Vec<u8>) {
        debug_assert!(self.len <= 32);
        (self.len as u8).encode(bytes);
        bytes.extend_from_slice(self.as_ref());
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let len = u8::read(r)? as usize;
        if len > 32 {
            return Err(InvalidMessage::TrailingData("SessionId"));
        }

        let Some(bytes) = r.take(len) else {
            return Err(InvalidMessage::MissingData("SessionId"));
        };

        let mut out = [0u8; 32];
        out[..len].clone_from_slice(&bytes[..len]);
        Ok(Self { len, data: out })
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        hex(f, self.as_ref())
    }
}

#[derive(Clone, Debug)]
pub struct UnknownExtension {
    pub typ: ExtensionType,
    pub payload: Payload,
}

impl UnknownExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.payload.encode(bytes);
    }

    fn read(typ: ExtensionType, r: &mut Reader<'_>) -> Self {
        let payload = Payload::new(r.rest());
        Self { typ, payload }
    }
}

#[derive(Clone, Debug)]
pub enum ServerNamePayload {
    HostName(String),
    Unknown(Payload),
}

impl ServerNamePayload {
    fn read_hostname(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let raw = PayloadU16::read(r)?;
        match String::from_utf8(raw.0) {
            Ok(name) => Ok(Self::HostName(name)),
            Err(_) => Err(InvalidMessage::InvalidServerName),
        }
    }

    fn encode(&self, bytes: &mut Vec<u8>) {
        match self {
            Self::HostName(name) => PayloadU16::encode_slice(name.as_bytes(), bytes),
            Self::Unknown(payload) => payload.encode(bytes),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerName {
    pub typ: ServerNameType,
    pub payload: ServerNamePayload,
}

impl Codec for ServerName {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);
        self.payload.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ServerNameType::read(r)?;

        let payload = match typ {
            ServerNameType::HostName => ServerNamePayload::read_hostname(r)?,
            _ => ServerNamePayload::Unknown(Payload::read(r)?),
        };

        Ok(Self { typ, payload })
    }
}

impl TlsListElement for ServerName {
    const SIZE_LEN: ListLength = ListLength::U16;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SignatureAndHashAlgorithm {
    pub hash: HashAlgorithm,
    pub sign: SignatureAlgorithm,
}

impl Codec for SignatureAndHashAlgorithm {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.hash.encode(bytes);
        self.sign.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let hash = HashAlgorithm::read(r)?;
        let sign = SignatureAlgorithm::read(r)?;
        Ok(Self { hash, sign })
    }
}

impl TlsListElement for SignatureAndHashAlgorithm {
    const SIZE_LEN: ListLength = ListLength::U16;
}

#[derive(Clone, Debug)]
pub enum ClientExtension {
    ServerName(Vec<ServerName>),
    SignatureAlgorithms(Vec<SignatureAndHashAlgorithm>),
    RenegotiationInfo(PayloadU8),
    Unknown(UnknownExtension),
}

impl ClientExtension {
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            Self::ServerName(_) => ExtensionType::ServerName,
            Self::SignatureAlgorithms(_) => ExtensionType::SignatureAlgorithms,
            Self::RenegotiationInfo(_) => ExtensionType::RenegotiationInfo,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for ClientExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        let nested = LengthPrefixedBuffer::new(ListLength::U16, bytes);
        match self {
            Self::ServerName(r) => r.encode(nested.buf),
            Self::SignatureAlgorithms(r) => r.encode(nested.buf),
            Self::RenegotiationInfo(r) => r.encode(nested.buf),
            Self::Unknown(r) => r.encode(nested.buf),
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::ServerName => Self::ServerName(Vec::read(&mut sub)?),
            ExtensionType::SignatureAlgorithms => Self::SignatureAlgorithms(Vec::read(&mut sub)?),
            ExtensionType::RenegotiationInfo => Self::RenegotiationInfo(PayloadU8::read(&mut sub)?),
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("ClientExtension")
            .map(|_| ext)
    }
}

impl TlsListElement for ClientExtension {
    const SIZE_LEN: ListLength = ListLength::U16;
}

#[derive(Clone, Debug)]
pub enum ServerExtension {
    ServerNameAck,
    RenegotiationInfo(PayloadU8),
    Unknown(UnknownExtension),
}

impl ServerExtension {
    pub fn ext_type(&self) -> ExtensionType {
        match self {
            Self::ServerNameAck => ExtensionType::ServerName,
            Self::RenegotiationInfo(_) => ExtensionType::RenegotiationInfo,
            Self::Unknown(r) => r.typ,
        }
    }
}

impl Codec for ServerExtension {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.ext_type().encode(bytes);

        let nested = LengthPrefixedBuffer::new(ListLength::U16, bytes);
        match self {
            Self::ServerNameAck => {}
            Self::RenegotiationInfo(r) => r.encode(nested.buf),
            Self::Unknown(r) => r.encode(nested.buf),
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = ExtensionType::read(r)?;
        let len = u16::read(r)? as usize;
        let mut sub = r.sub(len)?;

        let ext = match typ {
            ExtensionType::ServerName => Self::ServerNameAck,
            ExtensionType::RenegotiationInfo => Self::RenegotiationInfo(PayloadU8::read(&mut sub)?),
            _ => Self::Unknown(UnknownExtension::read(typ, &mut sub)),
        };

        sub.expect_empty("ServerExtension")
            .map(|_| ext)
    }
}

impl TlsListElement for ServerExtension {
    const SIZE_LEN: ListLength = ListLength::U16;
}

impl TlsListElement for CipherSuite {
    const SIZE_LEN: ListLength = ListLength::U16;
}

impl TlsListElement for Compression {
    const SIZE_LEN: ListLength = ListLength::U8;
}

#[derive(Clone, Debug)]
pub struct ClientHelloPayload {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suites: Vec<CipherSuite>,
    pub compression_methods: Vec<Compression>,
    pub extensions: Vec<ClientExtension>,
}

impl Codec for ClientHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.client_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suites.encode(bytes);
        self.compression_methods.encode(bytes);

        if !self.extensions.is_empty() {
            self.extensions.encode(bytes);
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let mut ret = Self {
            client_version: ProtocolVersion::read(r)?,
            random: Random::read(r)?,
            session_id: SessionId::read(r)?,
            cipher_suites: Vec::read(r)?,
            compression_methods: Vec::read(r)?,
            extensions: Vec::new(),
        };

        if r.any_left() {
            ret.extensions = Vec::read(r)?;
        }

        Ok(ret)
    }
}

impl ClientHelloPayload {
    pub fn find_extension(&self, ext: ExtensionType) -> Option<&ClientExtension> {
        self.extensions
            .iter()
            .find(|x| x.ext_type() == ext)
    }

    pub fn has_duplicate_extension(&self) -> bool {
        let mut seen = Vec::new();

        for ext in &self.extensions {
            let typ = u16::from(ext.ext_type());
            if seen.contains(&typ) {
                return true;
            }
            seen.push(typ);
        }

        false
    }

    pub fn server_name(&self) -> Option<&str> {
        let ext = self.find_extension(ExtensionType::ServerName)?;
        match ext {
            ClientExtension::ServerName(names) => names.iter().find_map(|n| match &n.payload {
                ServerNamePayload::HostName(host) => Some(host.as_str()),
                ServerNamePayload::Unknown(_) => None,
            }),
            _ => None,
        }
    }

    pub fn signature_algorithms(&self) -> Option<&[SignatureAndHashAlgorithm]> {
        let ext = self.find_extension(ExtensionType::SignatureAlgorithms)?;
        match ext {
            ClientExtension::SignatureAlgorithms(sigalgs) => Some(sigalgs),
            _ => None,
        }
    }

    pub fn renegotiation_info(&self) -> Option<&PayloadU8> {
        let ext = self.find_extension(ExtensionType::RenegotiationInfo)?;
        match ext {
            ClientExtension::RenegotiationInfo(info) => Some(info),
            _ => None,
        }
    }

    pub fn offers_scsv(&self) -> bool {
        self.cipher_suites
            .contains(&CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV)
    }
}

#[derive(Clone, Debug)]
pub struct ServerHelloPayload {
    pub legacy_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub compression_method: Compression,
    pub extensions: Vec<ServerExtension>,
}

impl Codec for ServerHelloPayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.legacy_version.encode(bytes);
        self.random.encode(bytes);
        self.session_id.encode(bytes);
        self.cipher_suite.encode(bytes);
        self.compression_method.encode(bytes);

        if !self.extensions.is_empty() {
            self.extensions.encode(bytes);
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let mut ret = Self {
            legacy_version: ProtocolVersion::read(r)?,
            random: Random::read(r)?,
            session_id: SessionId::read(r)?,
            cipher_suite: CipherSuite::read(r)?,
            compression_method: Compression::read(r)?,
            extensions: Vec::new(),
        };

        if r.any_left() {
            ret.extensions = Vec::read(r)?;
        }

        Ok(ret)
    }
}

impl ServerHelloPayload {
    pub fn renegotiation_info(&self) -> Option<&PayloadU8> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                ServerExtension::RenegotiationInfo(info) => Some(info),
                _ => None,
            })
    }
}

impl Codec for CertificateDer<'static> {
    fn encode(&self, bytes: &mut Vec<u8>) {
        let nest = LengthPrefixedBuffer::new(Self::SIZE_LEN, bytes);
        nest.buf.extend(self.as_ref());
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let len = match Self::SIZE_LEN {
            ListLength::U24 { max } => {
                let len = usize::from(crate::msgs::codec::u24::read(r)?);
                if len > max {
                    return Err(InvalidMessage::HandshakePayloadTooLarge);
                }
                len
            }
            _ => return Err(InvalidMessage::MissingData("CertificateDer")),
        };

        let mut sub = r.sub(len)?;
        let body = sub.rest();
        Ok(Self::from(body.to_vec()))
    }
}

impl TlsListElement for CertificateDer<'static> {
    const SIZE_LEN: ListLength = ListLength::U24 {
        max: CERTIFICATE_MAX_SIZE_LIMIT,
    };
}

/// TLS has a 16MB size limit on any handshake message; certificates in
/// practice are much smaller.
const CERTIFICATE_MAX_SIZE_LIMIT: usize = 0x1_0000;

pub type CertificatePayload = Vec<CertificateDer<'static>>;

/// The DH parameters offered by the server in a `ServerKeyExchange`
/// message: group modulus, generator, and the server's public value.
#[derive(Clone, Debug)]
pub struct ServerDhParams {
    pub dh_p: PayloadU16,
    pub dh_g: PayloadU16,
    pub dh_ys: PayloadU16,
}

impl Codec for ServerDhParams {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.dh_p.encode(bytes);
        self.dh_g.encode(bytes);
        self.dh_ys.encode(bytes);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        Ok(Self {
            dh_p: PayloadU16::read(r)?,
            dh_g: PayloadU16::read(r)?,
            dh_ys: PayloadU16::read(r)?,
        })
    }
}

/// A PKCS#1 signature, preceded on TLS 1.2 by the algorithm pair that
/// produced it.  Earlier protocol versions imply the algorithm.
#[derive(Clone, Debug)]
pub struct DigitallySigned {
    pub scheme: Option<SignatureAndHashAlgorithm>,
    pub sig: PayloadU16,
}

impl DigitallySigned {
    fn encode(&self, bytes: &mut Vec<u8>) {
        if let Some(scheme) = &self.scheme {
            scheme.encode(bytes);
        }
        self.sig.encode(bytes);
    }
}

#[derive(Clone, Debug)]
pub struct ServerKeyExchange {
    pub params: ServerDhParams,
    pub dss: DigitallySigned,
}

impl ServerKeyExchange {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.params.encode(bytes);
        self.dss.encode(bytes);
    }
}

#[derive(Clone, Debug)]
pub enum HandshakePayload {
    HelloRequest,
    ClientHello(ClientHelloPayload),
    ServerHello(ServerHelloPayload),
    Certificate(CertificatePayload),
    ServerKeyExchange(ServerKeyExchange),
    ServerHelloDone,
    ClientKeyExchange(Payload),
    Finished(Payload),
    Unknown(Payload),
}

impl HandshakePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        match self {
            Self::HelloRequest | Self::ServerHelloDone => {}
            Self::ClientHello(x) => x.encode(bytes),
            Self::ServerHello(x) => x.encode(bytes),
            Self::Certificate(x) => x.encode(bytes),
            Self::ServerKeyExchange(x) => x.encode(bytes),
            Self::ClientKeyExchange(x) => x.encode(bytes),
            Self::Finished(x) => x.encode(bytes),
            Self::Unknown(x) => x.encode(bytes),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandshakeMessagePayload {
    pub typ: HandshakeType,
    pub payload: HandshakePayload,
}

impl Codec for HandshakeMessagePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.typ.encode(bytes);

        let nested = LengthPrefixedBuffer::new(ListLength::U24 { max: usize::MAX }, bytes);
        self.payload.encode(nested.buf);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, InvalidMessage> {
        let typ = HandshakeType::read(r)?;
        let len = usize::from(crate::msgs::codec::u24::read(r)?);
        let mut sub = r.sub(len)?;

        let payload = match typ {
            HandshakeType::HelloRequest if sub.left() == 0 => HandshakePayload::HelloRequest,
            HandshakeType::ClientHello => {
                HandshakePayload::ClientHello(ClientHelloPayload::read(&mut sub)?)
            }
            HandshakeType::ServerHello => {
                HandshakePayload::ServerHello(ServerHelloPayload::read(&mut sub)?)
            }
            HandshakeType::Certificate => {
                HandshakePayload::Certificate(CertificatePayload::read(&mut sub)?)
            }
            HandshakeType::ServerHelloDone if sub.left() == 0 => HandshakePayload::ServerHelloDone,
            HandshakeType::ClientKeyExchange => {
                HandshakePayload::ClientKeyExchange(Payload::read(&mut sub)?)
            }
            HandshakeType::Finished => HandshakePayload::Finished(Payload::read(&mut sub)?),
            _ => HandshakePayload::Unknown(Payload::read(&mut sub)?),
        };

        sub.expect_empty("HandshakeMessagePayload")
            .map(|_| Self { typ, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hello() -> ClientHelloPayload {
        ClientHelloPayload {
            client_version: ProtocolVersion::TLSv1_2,
            random: Random([0x55; 32]),
            session_id: SessionId::empty(),
            cipher_suites: vec![
                CipherSuite::TLS_RSA_WITH_3DES_EDE_CBC_SHA,
                CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV,
            ],
            compression_methods: vec![Compression::Null],
            extensions: vec![
                ClientExtension::ServerName(vec![ServerName {
                    typ: ServerNameType::HostName,
                    payload: ServerNamePayload::HostName("ferrous.example".to_string()),
                }]),
                ClientExtension::SignatureAlgorithms(vec![SignatureAndHashAlgorithm {
                    hash: HashAlgorithm::SHA256,
                    sign: SignatureAlgorithm::RSA,
                }]),
            ],
        }
    }

    #[test]
    fn client_hello_round_trip() {
        let hello = sample_hello();
        let enc = hello.get_encoding();
        let decoded = ClientHelloPayload::read_bytes(&enc).unwrap();

        assert_eq!(decoded.client_version, ProtocolVersion::TLSv1_2);
        assert_eq!(decoded.cipher_suites, hello.cipher_suites);
        assert_eq!(decoded.server_name(), Some("ferrous.example"));
        assert!(decoded.offers_scsv());
        assert_eq!(
            decoded.signature_algorithms().unwrap(),
            &[SignatureAndHashAlgorithm {
                hash: HashAlgorithm::SHA256,
                sign: SignatureAlgorithm::RSA,
            }]
        );
        assert!(!decoded.has_duplicate_extension());
    }

    #[test]
    fn client_hello_without_extensions() {
        let mut hello = sample_hello();
        hello.extensions.clear();
        let decoded = ClientHelloPayload::read_bytes(&hello.get_encoding()).unwrap();
        assert!(decoded.extensions.is_empty());
        assert_eq!(decoded.server_name(), None);
    }

    #[test]
    fn duplicate_extensions_are_detected() {
        let mut hello = sample_hello();
        let dup = hello.extensions[0].clone();
        hello.extensions.push(dup);
        let decoded = ClientHelloPayload::read_bytes(&hello.get_encoding()).unwrap();
        assert!(decoded.has_duplicate_extension());
    }

    #[test]
    fn handshake_framing_round_trip() {
        let hs = HandshakeMessagePayload {
            typ: HandshakeType::ClientHello,
            payload: HandshakePayload::ClientHello(sample_hello()),
        };

        let enc = hs.get_encoding();
        assert_eq!(enc[0], u8::from(HandshakeType::ClientHello));
        // 3-byte length covers the rest of the message
        let len = usize::from(crate::msgs::codec::u24::read_bytes(&enc[1..4]).unwrap());
        assert_eq!(len, enc.len() - 4);

        let decoded = HandshakeMessagePayload::read_bytes(&enc).unwrap();
        assert_eq!(decoded.typ, HandshakeType::ClientHello);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let hs = HandshakeMessagePayload {
            typ: HandshakeType::ServerHelloDone,
            payload: HandshakePayload::ServerHelloDone,
        };

        let mut enc = hs.get_encoding();
        assert_eq!(enc, vec![0x0e, 0x00, 0x00, 0x00]);
        enc.push(0x00);
        assert!(HandshakeMessagePayload::read_bytes(&enc).is_err());
    }

    #[test]
    fn server_dh_params_layout() {
        let params = ServerDhParams {
            dh_p: PayloadU16::new(vec![0xff, 0x01]),
            dh_g: PayloadU16::new(vec![0x02]),
            dh_ys: PayloadU16::new(vec![0xaa, 0xbb, 0xcc]),
        };
        assert_eq!(
            params.get_encoding(),
            vec![0x00, 0x02, 0xff, 0x01, 0x00, 0x01, 0x02, 0x00, 0x03, 0xaa, 0xbb, 0xcc]
        );
    }

    #[test]
    fn certificate_chain_round_trip() {
        let chain: CertificatePayload = vec![
            CertificateDer::from(vec![0x30, 0x03, 0x01, 0x02, 0x03]),
            CertificateDer::from(vec![0x30, 0x01, 0xff]),
        ];
        let enc = chain.get_encoding();
        let decoded = CertificatePayload::read_bytes(&enc).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].as_ref(), chain[0].as_ref());
        assert_eq!(decoded[1].as_ref(), chain[1].as_ref());
    }
}
