use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;

use crate::msgs::enums::HashAlgorithm;

/// Maximum supported hash output size: supports up to SHA256.
pub(crate) const HASH_MAX_OUTPUT: usize = 32;

/// A hash output, stored as a value.
pub(crate) struct Output {
    buf: [u8; HASH_MAX_OUTPUT],
    used: usize,
}

impl Output {
    /// Build a `hash::Output` from a slice of no more than
    /// `HASH_MAX_OUTPUT` bytes.
    pub(crate) fn new(bytes: &[u8]) -> Self {
        let mut output = Self {
            buf: [0u8; HASH_MAX_OUTPUT],
            used: bytes.len(),
        };
        output.buf[..bytes.len()].copy_from_slice(bytes);
        output
    }
}

impl AsRef<[u8]> for Output {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..self.used]
    }
}

/// Return the output of hash function `alg` with input `data`.
///
/// Only the record-protection hashes are reachable here; signature
/// digests are produced directly where the signing happens.
pub(crate) fn digest(alg: HashAlgorithm, data: &[u8]) -> Output {
    match alg {
        HashAlgorithm::MD5 => Output::new(&Md5::digest(data)),
        HashAlgorithm::SHA1 => Output::new(&Sha1::digest(data)),
        HashAlgorithm::SHA256 => Output::new(&Sha256::digest(data)),
        _ => unreachable!("unsupported hash algorithm {alg:?}"),
    }
}

/// The length in bytes of hash function `alg`'s output.
pub(crate) fn output_len(alg: HashAlgorithm) -> usize {
    match alg {
        HashAlgorithm::MD5 => 16,
        HashAlgorithm::SHA1 => 20,
        HashAlgorithm::SHA256 => 32,
        _ => unreachable!("unsupported hash algorithm {alg:?}"),
    }
}
