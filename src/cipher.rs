//! MAC-then-encrypt record protection: CBC block ciphers with explicit
//! padding (RFC 5246 §6.2.3.2) and the RC4 stream transform
//! (RFC 5246 §6.2.3.1).

use aes::{Aes128, Aes256};
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit, StreamCipher};
use des::TdesEde3;
use rc4::consts::U16;
use rc4::Rc4;
use subtle::{Choice, ConstantTimeEq};

use crate::crypto::hmac;
use crate::error::Error;
use crate::msgs::base::Payload;
use crate::msgs::codec::{put_u16, put_u64};
use crate::msgs::enums::{ContentType, ProtocolVersion};
use crate::msgs::fragmenter::MAX_FRAGMENT_LEN;
use crate::msgs::message::{OpaqueMessage, PlainMessage};
use crate::rand;
use crate::suites::{BulkAlgorithm, SupportedCipherSuite};

/// Objects with this trait can encrypt TLS messages.
pub(crate) trait MessageEncrypter: Send + Sync {
    fn encrypt(&mut self, msg: PlainMessage, seq: u64) -> Result<OpaqueMessage, Error>;
}

/// Objects with this trait can decrypt TLS messages.
pub(crate) trait MessageDecrypter: Send + Sync {
    fn decrypt(&mut self, msg: OpaqueMessage, seq: u64) -> Result<PlainMessage, Error>;
}

impl dyn MessageEncrypter {
    pub(crate) fn invalid() -> Box<dyn MessageEncrypter> {
        Box::new(InvalidCipher)
    }
}

impl dyn MessageDecrypter {
    pub(crate) fn invalid() -> Box<dyn MessageDecrypter> {
        Box::new(InvalidCipher)
    }
}

/// A cipher in an invalid state: neither direction has keys until the
/// key schedule installs real ones.
struct InvalidCipher;

impl MessageEncrypter for InvalidCipher {
    fn encrypt(&mut self, _msg: PlainMessage, _seq: u64) -> Result<OpaqueMessage, Error> {
        Err(Error::EncryptError)
    }
}

impl MessageDecrypter for InvalidCipher {
    fn decrypt(&mut self, _msg: OpaqueMessage, _seq: u64) -> Result<PlainMessage, Error> {
        Err(Error::DecryptError)
    }
}

/// Build the MAC input prefix: sequence number, content type, version and
/// fragment length (RFC 5246 §6.2.3.1).
fn make_tls_mac_header(
    seq: u64,
    typ: ContentType,
    version: ProtocolVersion,
    len: usize,
) -> [u8; 13] {
    let mut out = [0; 13];
    put_u64(seq, &mut out[0..8]);
    out[8] = u8::from(typ);
    out[9..11].copy_from_slice(&version.to_array());
    put_u16(len as u16, &mut out[11..13]);
    out
}

/// Make a `MessageEncrypter` for the server-to-client direction.
pub(crate) fn new_encrypter(
    suite: &'static SupportedCipherSuite,
    version: ProtocolVersion,
    enc_key: &[u8],
    iv: &[u8],
    mac_key: &[u8],
) -> Box<dyn MessageEncrypter> {
    let mac_key = hmac::Key::new(suite.mac, mac_key);

    match suite.bulk {
        BulkAlgorithm::Rc4_128 => Box::new(StreamMessageEncrypter {
            cipher: Rc4::new_from_slice(enc_key).expect("key block sized for rc4"),
            mac_key,
        }),
        _ => Box::new(CbcMessageEncrypter {
            cipher: BlockCipherImpl::new(suite.bulk, enc_key),
            mac_key,
            iv: IvSource::for_version(version, iv),
        }),
    }
}

/// Make a `MessageDecrypter` for the client-to-server direction.
pub(crate) fn new_decrypter(
    suite: &'static SupportedCipherSuite,
    version: ProtocolVersion,
    dec_key: &[u8],
    iv: &[u8],
    mac_key: &[u8],
) -> Box<dyn MessageDecrypter> {
    let mac_key = hmac::Key::new(suite.mac, mac_key);

    match suite.bulk {
        BulkAlgorithm::Rc4_128 => Box::new(StreamMessageDecrypter {
            cipher: Rc4::new_from_slice(dec_key).expect("key block sized for rc4"),
            mac_key,
        }),
        _ => Box::new(CbcMessageDecrypter {
            cipher: BlockCipherImpl::new(suite.bulk, dec_key),
            mac_key,
            iv: IvSource::for_version(version, iv),
        }),
    }
}

enum BlockCipherImpl {
    TripleDes(TdesEde3),
    Aes128(Aes128),
    Aes256(Aes256),
}

impl BlockCipherImpl {
    fn new(bulk: BulkAlgorithm, key: &[u8]) -> Self {
        match bulk {
            BulkAlgorithm::TripleDesEdeCbc => {
                Self::TripleDes(TdesEde3::new_from_slice(key).expect("key block sized for 3des"))
            }
            BulkAlgorithm::Aes128Cbc => {
                Self::Aes128(Aes128::new_from_slice(key).expect("key block sized for aes128"))
            }
            BulkAlgorithm::Aes256Cbc => {
                Self::Aes256(Aes256::new_from_slice(key).expect("key block sized for aes256"))
            }
            BulkAlgorithm::Rc4_128 => unreachable!("rc4 is not a block cipher"),
        }
    }

    fn block_len(&self) -> usize {
        match self {
            Self::TripleDes(_) => 8,
            Self::Aes128(_) | Self::Aes256(_) => 16,
        }
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        match self {
            Self::TripleDes(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            Self::Aes128(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            Self::Aes256(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        match self {
            Self::TripleDes(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            Self::Aes128(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            Self::Aes256(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
        }
    }
}

/// Where the CBC IV for each record comes from.
///
/// TLS 1.0 chains the IV: the context carries the last ciphertext block
/// of the previous record.  TLS 1.1 and 1.2 transmit a fresh random IV
/// as the first block of every record.
enum IvSource {
    Chained(Vec<u8>),
    Explicit,
}

impl IvSource {
    fn for_version(version: ProtocolVersion, iv: &[u8]) -> Self {
        match version {
            ProtocolVersion::TLSv1_0 => Self::Chained(iv.to_vec()),
            _ => Self::Explicit,
        }
    }
}

/// CBC with the TLS padding scheme: append `pad_len + 1` bytes, each of
/// value `pad_len`, such that the result is a block multiple.
fn cbc_pad(buf: &mut Vec<u8>, block_len: usize) {
    let pad_len = block_len - ((buf.len() + 1) % block_len);
    for _ in 0..=pad_len {
        buf.push(pad_len as u8);
    }
}

fn cbc_encrypt(cipher: &BlockCipherImpl, iv: &mut [u8], buf: &mut [u8]) {
    for block in buf.chunks_mut(iv.len()) {
        for (b, i) in block.iter_mut().zip(iv.iter()) {
            *b ^= i;
        }
        cipher.encrypt_block(block);
        iv.copy_from_slice(block);
    }
}

fn cbc_decrypt(cipher: &BlockCipherImpl, iv: &mut [u8], buf: &mut [u8]) {
    let mut prev = iv.to_vec();
    for block in buf.chunks_mut(iv.len()) {
        let saved = block.to_vec();
        cipher.decrypt_block(block);
        for (b, p) in block.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        prev = saved;
    }
    iv.copy_from_slice(&prev);
}

/// A `MessageEncrypter` for the CBC MAC-then-encrypt suites.
struct CbcMessageEncrypter {
    cipher: BlockCipherImpl,
    mac_key: hmac::Key,
    iv: IvSource,
}

impl MessageEncrypter for CbcMessageEncrypter {
    fn encrypt(&mut self, msg: PlainMessage, seq: u64) -> Result<OpaqueMessage, Error> {
        let block_len = self.cipher.block_len();
        debug_assert!(msg.payload.0.len() <= MAX_FRAGMENT_LEN);

        let header = make_tls_mac_header(seq, msg.typ, msg.version, msg.payload.0.len());
        let mac = self.mac_key.sign(&[&header, &msg.payload.0]);

        let mut buf = msg.payload.0;
        buf.extend_from_slice(mac.as_ref());
        cbc_pad(&mut buf, block_len);

        let payload = match &mut self.iv {
            IvSource::Chained(iv) => {
                cbc_encrypt(&self.cipher, iv, &mut buf);
                buf
            }
            IvSource::Explicit => {
                let mut out = vec![0u8; block_len];
                rand::fill_random(&mut out).map_err(|_| Error::EncryptError)?;
                let mut running_iv = out.clone();
                cbc_encrypt(&self.cipher, &mut running_iv, &mut buf);
                out.extend_from_slice(&buf);
                out
            }
        };

        Ok(OpaqueMessage {
            typ: msg.typ,
            version: msg.version,
            payload: Payload::new(payload),
        })
    }
}

/// A `MessageDecrypter` for the CBC MAC-then-encrypt suites.
struct CbcMessageDecrypter {
    cipher: BlockCipherImpl,
    mac_key: hmac::Key,
    iv: IvSource,
}

impl MessageDecrypter for CbcMessageDecrypter {
    fn decrypt(&mut self, msg: OpaqueMessage, seq: u64) -> Result<PlainMessage, Error> {
        let block_len = self.cipher.block_len();
        let mut buf = msg.payload.0;

        let mut plain = match &mut self.iv {
            IvSource::Chained(iv) => {
                if buf.is_empty() || buf.len() % block_len != 0 {
                    return Err(Error::DecryptError);
                }
                cbc_decrypt(&self.cipher, iv, &mut buf);
                buf
            }
            IvSource::Explicit => {
                if buf.len() < block_len * 2 || buf.len() % block_len != 0 {
                    return Err(Error::DecryptError);
                }
                let mut rest = buf.split_off(block_len);
                let mut iv = buf;
                cbc_decrypt(&self.cipher, &mut iv, &mut rest);
                rest
            }
        };

        let mac_len = self.mac_key.tag_len();
        if plain.len() < mac_len + 1 {
            return Err(Error::DecryptError);
        }

        // Padding and MAC are checked together and produce a single
        // verdict: padding failure must be indistinguishable from MAC
        // failure (RFC 5246 section 6.2.3.2).
        let pad_len = *plain.last().unwrap() as usize;
        let (content_len, mut ok) = match mac_len + pad_len + 1 <= plain.len() {
            true => {
                let mut pad_ok = Choice::from(1);
                let pad_start = plain.len() - 1 - pad_len;
                for b in &plain[pad_start..plain.len() - 1] {
                    pad_ok &= b.ct_eq(&(pad_len as u8));
                }
                (plain.len() - mac_len - pad_len - 1, pad_ok)
            }
            false => (plain.len() - mac_len - 1, Choice::from(0)),
        };

        let header = make_tls_mac_header(seq, msg.typ, msg.version, content_len);
        let expect = self.mac_key.sign(&[&header, &plain[..content_len]]);
        ok &= expect
            .as_ref()
            .ct_eq(&plain[content_len..content_len + mac_len]);

        if !bool::from(ok) {
            return Err(Error::DecryptError);
        }

        if content_len > MAX_FRAGMENT_LEN {
            return Err(Error::PeerSentOversizedRecord);
        }

        plain.truncate(content_len);
        Ok(PlainMessage {
            typ: msg.typ,
            version: msg.version,
            payload: Payload::new(plain),
        })
    }
}

/// A `MessageEncrypter` for the RC4 suites.  The keystream continues
/// across records, so the cipher state lives here.
struct StreamMessageEncrypter {
    cipher: Rc4<U16>,
    mac_key: hmac::Key,
}

impl MessageEncrypter for StreamMessageEncrypter {
    fn encrypt(&mut self, msg: PlainMessage, seq: u64) -> Result<OpaqueMessage, Error> {
        let header = make_tls_mac_header(seq, msg.typ, msg.version, msg.payload.0.len());
        let mac = self.mac_key.sign(&[&header, &msg.payload.0]);

        let mut buf = msg.payload.0;
        buf.extend_from_slice(mac.as_ref());
        self.cipher.apply_keystream(&mut buf);

        Ok(OpaqueMessage {
            typ: msg.typ,
            version: msg.version,
            payload: Payload::new(buf),
        })
    }
}

/// A `MessageDecrypter` for the RC4 suites.
struct StreamMessageDecrypter {
    cipher: Rc4<U16>,
    mac_key: hmac::Key,
}

impl MessageDecrypter for StreamMessageDecrypter {
    fn decrypt(&mut self, msg: OpaqueMessage, seq: u64) -> Result<PlainMessage, Error> {
        let mut buf = msg.payload.0;
        self.cipher.apply_keystream(&mut buf);

        let mac_len = self.mac_key.tag_len();
        if buf.len() < mac_len {
            return Err(Error::DecryptError);
        }

        let content_len = buf.len() - mac_len;
        let header = make_tls_mac_header(seq, msg.typ, msg.version, content_len);
        let expect = self.mac_key.sign(&[&header, &buf[..content_len]]);

        if !bool::from(expect.as_ref().ct_eq(&buf[content_len..])) {
            return Err(Error::DecryptError);
        }

        if content_len > MAX_FRAGMENT_LEN {
            return Err(Error::PeerSentOversizedRecord);
        }

        buf.truncate(content_len);
        Ok(PlainMessage {
            typ: msg.typ,
            version: msg.version,
            payload: Payload::new(buf),
        })
    }
}
