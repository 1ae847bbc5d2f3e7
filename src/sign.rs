//! RSA private-key operations: PKCS#1 v1.5 signing for the two TLS
//! signature generations, and PKCS#1 v1.5 decryption for the static-RSA
//! key exchange.

use digest::Digest;
use md5::Md5;
use pki_types::{CertificateDer, PrivateKeyDer};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::error::Error;
use crate::msgs::enums::HashAlgorithm;

/// The server's credential: its certificate chain, in wire order, and
/// the matching RSA private key.
pub struct CertifiedKey {
    /// The certificate chain, end-entity first.
    pub chain: Vec<CertificateDer<'static>>,

    /// The private key for the end-entity certificate.
    pub key: RsaKey,
}

impl CertifiedKey {
    /// Make a new `CertifiedKey` from a DER-encoded private key.
    pub fn new(
        chain: Vec<CertificateDer<'static>>,
        key_der: &PrivateKeyDer<'static>,
    ) -> Result<Self, Error> {
        Ok(Self {
            chain,
            key: RsaKey::new(key_der)?,
        })
    }
}

/// An RSA private key, ready for signing and decryption.
pub struct RsaKey {
    key: RsaPrivateKey,
}

impl RsaKey {
    /// Parse an RSA private key from PKCS#1 or PKCS#8 DER.
    pub fn new(der: &PrivateKeyDer<'static>) -> Result<Self, Error> {
        let key = match der {
            PrivateKeyDer::Pkcs1(der) => RsaPrivateKey::from_pkcs1_der(der.secret_pkcs1_der())
                .map_err(|e| Error::General(format!("failed to parse private key: {e}")))?,
            PrivateKeyDer::Pkcs8(der) => RsaPrivateKey::from_pkcs8_der(der.secret_pkcs8_der())
                .map_err(|e| Error::General(format!("failed to parse private key: {e}")))?,
            _ => {
                return Err(Error::General(
                    "unsupported private key encoding".to_string(),
                ))
            }
        };

        Ok(Self { key })
    }

    /// The size of the modulus, in bits.
    pub fn bits(&self) -> usize {
        self.key.n().bits()
    }

    /// Sign `message` the TLS 1.0/1.1 way: PKCS#1 v1.5 over the bare
    /// concatenation MD5(message) followed by SHA1(message), with no
    /// DigestInfo prefix (RFC 4346 section 7.4.3).
    pub(crate) fn sign_md5_sha1(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        let mut digest = Vec::with_capacity(36);
        digest.extend_from_slice(Md5::digest(message).as_slice());
        digest.extend_from_slice(Sha1::digest(message).as_slice());

        self.key
            .sign(Pkcs1v15Sign::new_unprefixed(), &digest)
            .map_err(|_| Error::General("rsa signing failed".to_string()))
    }

    /// Sign `message` the TLS 1.2 way: PKCS#1 v1.5 over
    /// DigestInfo(hash, Hash(message)) (RFC 5246 section 4.7).
    pub(crate) fn sign_with_hash(&self, hash: HashAlgorithm, message: &[u8]) -> Result<Vec<u8>, Error> {
        let (padding, digest) = match hash {
            HashAlgorithm::MD5 => (Pkcs1v15Sign::new::<Md5>(), Md5::digest(message).as_slice().to_vec()),
            HashAlgorithm::SHA1 => (Pkcs1v15Sign::new::<Sha1>(), Sha1::digest(message).as_slice().to_vec()),
            HashAlgorithm::SHA224 => (
                Pkcs1v15Sign::new::<Sha224>(),
                Sha224::digest(message).as_slice().to_vec(),
            ),
            HashAlgorithm::SHA256 => (
                Pkcs1v15Sign::new::<Sha256>(),
                Sha256::digest(message).as_slice().to_vec(),
            ),
            HashAlgorithm::SHA384 => (
                Pkcs1v15Sign::new::<Sha384>(),
                Sha384::digest(message).as_slice().to_vec(),
            ),
            HashAlgorithm::SHA512 => (
                Pkcs1v15Sign::new::<Sha512>(),
                Sha512::digest(message).as_slice().to_vec(),
            ),
            _ => {
                return Err(Error::General(format!(
                    "cannot sign with hash {hash:?}"
                )))
            }
        };

        self.key
            .sign(padding, &digest)
            .map_err(|_| Error::General("rsa signing failed".to_string()))
    }

    /// PKCS#1 v1.5 decryption.
    ///
    /// Deliberately returns only `Option`: the sole caller launders a
    /// failure into a random pre-master secret, and nothing about the
    /// failure may escape.
    pub(crate) fn decrypt_pkcs1(&self, ciphertext: &[u8]) -> Option<Vec<u8>> {
        self.key
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .ok()
    }
}
