use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;

use crate::crypto::hash;
use crate::msgs::enums::HashAlgorithm;

/// Maximum supported HMAC tag size: supports up to HMAC-SHA256.
pub(crate) const HMAC_MAX_TAG: usize = 32;

/// A HMAC tag, stored as a value.
#[derive(Clone)]
pub(crate) struct Tag {
    buf: [u8; HMAC_MAX_TAG],
    used: usize,
}

impl Tag {
    /// Build a tag by copying a byte slice.
    ///
    /// The slice can be up to `HMAC_MAX_TAG` bytes in length.
    pub(crate) fn new(bytes: &[u8]) -> Self {
        let mut tag = Self {
            buf: [0u8; HMAC_MAX_TAG],
            used: bytes.len(),
        };
        tag.buf[..bytes.len()].copy_from_slice(bytes);
        tag
    }
}

impl AsRef<[u8]> for Tag {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..self.used]
    }
}

/// A HMAC key that is ready for use.
///
/// The algorithm is chosen when the key is made and is implicit in all
/// later signing operations.
pub(crate) struct Key(KeyInner);

enum KeyInner {
    Md5(Hmac<Md5>),
    Sha1(Hmac<Sha1>),
    Sha256(Hmac<Sha256>),
}

impl Key {
    /// Prepare to use `key` as a HMAC key with hash function `alg`.
    pub(crate) fn new(alg: HashAlgorithm, key: &[u8]) -> Self {
        let inner = match alg {
            HashAlgorithm::MD5 => {
                KeyInner::Md5(Hmac::new_from_slice(key).expect("hmac accepts any key length"))
            }
            HashAlgorithm::SHA1 => {
                KeyInner::Sha1(Hmac::new_from_slice(key).expect("hmac accepts any key length"))
            }
            HashAlgorithm::SHA256 => {
                KeyInner::Sha256(Hmac::new_from_slice(key).expect("hmac accepts any key length"))
            }
            _ => unreachable!("unsupported hmac algorithm {alg:?}"),
        };
        Self(inner)
    }

    /// Calculates a tag over `data` -- a slice of byte slices.
    pub(crate) fn sign(&self, data: &[&[u8]]) -> Tag {
        match &self.0 {
            KeyInner::Md5(mac) => sign_with(mac.clone(), data),
            KeyInner::Sha1(mac) => sign_with(mac.clone(), data),
            KeyInner::Sha256(mac) => sign_with(mac.clone(), data),
        }
    }

    /// Returns the length of the tag returned by a computation using
    /// this key.
    pub(crate) fn tag_len(&self) -> usize {
        match &self.0 {
            KeyInner::Md5(_) => hash::output_len(HashAlgorithm::MD5),
            KeyInner::Sha1(_) => hash::output_len(HashAlgorithm::SHA1),
            KeyInner::Sha256(_) => hash::output_len(HashAlgorithm::SHA256),
        }
    }
}

fn sign_with<M: Mac>(mut mac: M, data: &[&[u8]]) -> Tag {
    for d in data {
        mac.update(d);
    }
    Tag::new(mac.finalize().into_bytes().as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2202_hmac_md5_case_1() {
        let key = Key::new(HashAlgorithm::MD5, &[0x0b; 16]);
        assert_eq!(
            key.sign(&[b"Hi There"]).as_ref(),
            b"\x92\x94\x72\x7a\x36\x38\xbb\x1c\x13\xf4\x8e\xf8\x15\x8b\xfc\x9d"
        );
        assert_eq!(key.tag_len(), 16);
    }

    #[test]
    fn rfc2202_hmac_sha1_case_1() {
        let key = Key::new(HashAlgorithm::SHA1, &[0x0b; 20]);
        assert_eq!(
            key.sign(&[b"Hi There"]).as_ref(),
            b"\xb6\x17\x31\x86\x55\x05\x72\x64\xe2\x8b\xc0\xb6\xfb\x37\x8c\x8e\xf1\x46\xbe\x00"
        );
        assert_eq!(key.tag_len(), 20);
    }

    #[test]
    fn rfc4231_hmac_sha256_case_1() {
        let key = Key::new(HashAlgorithm::SHA256, &[0x0b; 20]);
        assert_eq!(
            key.sign(&[b"Hi There"]).as_ref(),
            b"\xb0\x34\x4c\x61\xd8\xdb\x38\x53\x5c\xa8\xaf\xce\xaf\x0b\xf1\x2b\
              \x88\x1d\xc2\x00\xc9\x83\x3d\xa7\x26\xe9\x37\x6c\x2e\x32\xcf\xf7"
        );
        assert_eq!(key.tag_len(), 32);
    }

    #[test]
    fn signing_is_insensitive_to_chunking() {
        let key = Key::new(HashAlgorithm::SHA256, b"secret");
        assert_eq!(
            key.sign(&[b"hello ", b"world"]).as_ref(),
            key.sign(&[b"hello world"]).as_ref()
        );
    }
}
