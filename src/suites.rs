use core::fmt;

use crate::crypto::hash;
use crate::msgs::enums::{CipherSuite, HashAlgorithm, ProtocolVersion};

/// Bulk symmetric encryption scheme used by a cipher suite.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BulkAlgorithm {
    /// Triple-DES in EDE mode in CBC.
    TripleDesEdeCbc,

    /// AES with 128-bit keys in CBC.
    Aes128Cbc,

    /// AES with 256-bit keys in CBC.
    Aes256Cbc,

    /// The RC4 stream cipher with 128-bit keys.
    Rc4_128,
}

/// How the key is agreed and the server is authenticated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyExchangeAlgorithm {
    /// Key exchange by encrypting the pre-master secret to the
    /// certified RSA key.
    Rsa,

    /// Ephemeral finite-field Diffie-Hellman, signed with the certified
    /// RSA key.
    DheRsa,
}

/// A cipher suite supported by this library.
///
/// All possible instances of this type are provided by the library in
/// the [`ALL_CIPHER_SUITES`] array.
#[derive(Eq, PartialEq)]
pub struct SupportedCipherSuite {
    /// The TLS enumeration naming this cipher suite.
    pub suite: CipherSuite,

    /// How to exchange/agree keys.
    pub kx: KeyExchangeAlgorithm,

    /// How to do bulk encryption.
    pub bulk: BulkAlgorithm,

    /// Which hash function drives the record HMAC.
    pub mac: HashAlgorithm,
}

impl SupportedCipherSuite {
    /// Length of the record MAC key and tag.
    pub(crate) fn mac_key_len(&self) -> usize {
        hash::output_len(self.mac)
    }

    /// Length of the bulk encryption key.
    pub(crate) fn enc_key_len(&self) -> usize {
        match self.bulk {
            BulkAlgorithm::TripleDesEdeCbc => 24,
            BulkAlgorithm::Aes128Cbc => 16,
            BulkAlgorithm::Aes256Cbc => 32,
            BulkAlgorithm::Rc4_128 => 16,
        }
    }

    /// Cipher block length; `None` for stream ciphers.
    pub(crate) fn block_len(&self) -> Option<usize> {
        match self.bulk {
            BulkAlgorithm::TripleDesEdeCbc => Some(8),
            BulkAlgorithm::Aes128Cbc | BulkAlgorithm::Aes256Cbc => Some(16),
            BulkAlgorithm::Rc4_128 => None,
        }
    }

    /// How many key-block bytes each direction consumes as an IV.
    ///
    /// Only TLS 1.0 takes CBC IVs from the key block; later versions use
    /// an explicit per-record IV, and stream ciphers have none.
    pub(crate) fn fixed_iv_len(&self, version: ProtocolVersion) -> usize {
        match version {
            ProtocolVersion::TLSv1_0 => self.block_len().unwrap_or(0),
            _ => 0,
        }
    }

    /// Whether this suite may be negotiated under `version`.
    ///
    /// The HMAC-SHA256 suites exist only from TLS 1.2 on.
    pub(crate) fn usable_for_version(&self, version: ProtocolVersion) -> bool {
        match self.mac {
            HashAlgorithm::SHA256 => version == ProtocolVersion::TLSv1_2,
            _ => true,
        }
    }

    /// Both key exchanges authenticate the server with its certified RSA
    /// key, so every suite here needs a configured certificate.
    pub(crate) fn requires_server_certificate(&self) -> bool {
        match self.kx {
            KeyExchangeAlgorithm::Rsa | KeyExchangeAlgorithm::DheRsa => true,
        }
    }
}

impl fmt::Debug for SupportedCipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.suite.fmt(f)
    }
}

pub static TLS_RSA_WITH_RC4_128_MD5: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_RC4_128_MD5,
    kx: KeyExchangeAlgorithm::Rsa,
    bulk: BulkAlgorithm::Rc4_128,
    mac: HashAlgorithm::MD5,
};

pub static TLS_RSA_WITH_RC4_128_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_RC4_128_SHA,
    kx: KeyExchangeAlgorithm::Rsa,
    bulk: BulkAlgorithm::Rc4_128,
    mac: HashAlgorithm::SHA1,
};

pub static TLS_RSA_WITH_3DES_EDE_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_3DES_EDE_CBC_SHA,
    kx: KeyExchangeAlgorithm::Rsa,
    bulk: BulkAlgorithm::TripleDesEdeCbc,
    mac: HashAlgorithm::SHA1,
};

pub static TLS_DHE_RSA_WITH_3DES_EDE_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_3DES_EDE_CBC_SHA,
    kx: KeyExchangeAlgorithm::DheRsa,
    bulk: BulkAlgorithm::TripleDesEdeCbc,
    mac: HashAlgorithm::SHA1,
};

pub static TLS_RSA_WITH_AES_128_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
    kx: KeyExchangeAlgorithm::Rsa,
    bulk: BulkAlgorithm::Aes128Cbc,
    mac: HashAlgorithm::SHA1,
};

pub static TLS_DHE_RSA_WITH_AES_128_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA,
    kx: KeyExchangeAlgorithm::DheRsa,
    bulk: BulkAlgorithm::Aes128Cbc,
    mac: HashAlgorithm::SHA1,
};

pub static TLS_RSA_WITH_AES_256_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA,
    kx: KeyExchangeAlgorithm::Rsa,
    bulk: BulkAlgorithm::Aes256Cbc,
    mac: HashAlgorithm::SHA1,
};

pub static TLS_DHE_RSA_WITH_AES_256_CBC_SHA: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_256_CBC_SHA,
    kx: KeyExchangeAlgorithm::DheRsa,
    bulk: BulkAlgorithm::Aes256Cbc,
    mac: HashAlgorithm::SHA1,
};

pub static TLS_RSA_WITH_AES_128_CBC_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256,
    kx: KeyExchangeAlgorithm::Rsa,
    bulk: BulkAlgorithm::Aes128Cbc,
    mac: HashAlgorithm::SHA256,
};

pub static TLS_RSA_WITH_AES_256_CBC_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
    kx: KeyExchangeAlgorithm::Rsa,
    bulk: BulkAlgorithm::Aes256Cbc,
    mac: HashAlgorithm::SHA256,
};

pub static TLS_DHE_RSA_WITH_AES_128_CBC_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA256,
    kx: KeyExchangeAlgorithm::DheRsa,
    bulk: BulkAlgorithm::Aes128Cbc,
    mac: HashAlgorithm::SHA256,
};

pub static TLS_DHE_RSA_WITH_AES_256_CBC_SHA256: SupportedCipherSuite = SupportedCipherSuite {
    suite: CipherSuite::TLS_DHE_RSA_WITH_AES_256_CBC_SHA256,
    kx: KeyExchangeAlgorithm::DheRsa,
    bulk: BulkAlgorithm::Aes256Cbc,
    mac: HashAlgorithm::SHA256,
};

/// A list of all the cipher suites supported by this library, in the
/// default order of server preference: forward-secret suites first,
/// strongest bulk protection first within each family.
pub static ALL_CIPHER_SUITES: &[&SupportedCipherSuite] = &[
    &TLS_DHE_RSA_WITH_AES_256_CBC_SHA256,
    &TLS_DHE_RSA_WITH_AES_128_CBC_SHA256,
    &TLS_DHE_RSA_WITH_AES_256_CBC_SHA,
    &TLS_DHE_RSA_WITH_AES_128_CBC_SHA,
    &TLS_DHE_RSA_WITH_3DES_EDE_CBC_SHA,
    &TLS_RSA_WITH_AES_256_CBC_SHA256,
    &TLS_RSA_WITH_AES_128_CBC_SHA256,
    &TLS_RSA_WITH_AES_256_CBC_SHA,
    &TLS_RSA_WITH_AES_128_CBC_SHA,
    &TLS_RSA_WITH_3DES_EDE_CBC_SHA,
    &TLS_RSA_WITH_RC4_128_SHA,
    &TLS_RSA_WITH_RC4_128_MD5,
];

/// The cipher suite configuration that an application should use by
/// default.
pub static DEFAULT_CIPHER_SUITES: &[&SupportedCipherSuite] = ALL_CIPHER_SUITES;

pub(crate) fn choose_ciphersuite_preferring_server(
    client_suites: &[CipherSuite],
    server_suites: &[&'static SupportedCipherSuite],
) -> Option<&'static SupportedCipherSuite> {
    server_suites
        .iter()
        .find(|x| client_suites.contains(&x.suite))
        .copied()
}
