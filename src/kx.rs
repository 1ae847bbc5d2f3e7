//! Ephemeral finite-field Diffie-Hellman key exchange.

use num_bigint::BigUint;
use zeroize::Zeroize;

use crate::error::{Error, PeerMisbehaved};
use crate::rand;

/// A finite-field Diffie-Hellman group: modulus and generator, both
/// big-endian.
pub(crate) struct DhGroup {
    pub(crate) p: &'static [u8],
    pub(crate) g: &'static [u8],
}

/// The 1024-bit MODP group ("Second Oakley Group", RFC 2409 section 6.2).
pub(crate) static OAKLEY_GROUP_2: DhGroup = DhGroup {
    p: &OAKLEY_GROUP_2_P,
    g: &[0x02],
};

static OAKLEY_GROUP_2_P: [u8; 128] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc9, 0x0f, 0xda, 0xa2, 0x21, 0x68, 0xc2,
    0x34, 0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1, 0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67,
    0xcc, 0x74, 0x02, 0x0b, 0xbe, 0xa6, 0x3b, 0x13, 0x9b, 0x22, 0x51, 0x4a, 0x08, 0x79, 0x8e,
    0x34, 0x04, 0xdd, 0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b, 0x30, 0x2b, 0x0a, 0x6d,
    0xf2, 0x5f, 0x14, 0x37, 0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45, 0xe4, 0x85, 0xb5,
    0x76, 0x62, 0x5e, 0x7e, 0xc6, 0xf4, 0x4c, 0x42, 0xe9, 0xa6, 0x37, 0xed, 0x6b, 0x0b, 0xff,
    0x5c, 0xb6, 0xf4, 0x06, 0xb7, 0xed, 0xee, 0x38, 0x6b, 0xfb, 0x5a, 0x89, 0x9f, 0xa5, 0xae,
    0x9f, 0x24, 0x11, 0x7c, 0x4b, 0x1f, 0xe6, 0x49, 0x28, 0x66, 0x51, 0xec, 0xe6, 0x53, 0x81,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

/// An in-progress key exchange: our secret exponent and the public value
/// offered in the `ServerKeyExchange` message.
pub(crate) struct KeyExchange {
    group: &'static DhGroup,
    secret: BigUint,
    pub(crate) pub_key: Vec<u8>,
}

impl KeyExchange {
    /// Start a key exchange: generate a fresh secret exponent and the
    /// matching public value.
    pub(crate) fn start(group: &'static DhGroup) -> Result<Self, Error> {
        let p = BigUint::from_bytes_be(group.p);

        let mut bytes = vec![0u8; group.p.len()];
        rand::fill_random(&mut bytes)?;
        // reduce into [2, p-2]
        let secret = BigUint::from_bytes_be(&bytes) % (&p - 3u32) + 2u32;
        bytes.zeroize();

        let pub_key = BigUint::from_bytes_be(group.g)
            .modpow(&secret, &p)
            .to_bytes_be();

        Ok(Self {
            group,
            secret,
            pub_key,
        })
    }

    /// Complete the exchange with the peer's public value, yielding the
    /// shared secret.  Leading zero bytes are stripped, as required for
    /// the pre-master secret (RFC 5246 section 8.1.2).
    pub(crate) fn complete(self, peer_pub_key: &[u8]) -> Result<Vec<u8>, Error> {
        let p = BigUint::from_bytes_be(self.group.p);
        let peer = BigUint::from_bytes_be(peer_pub_key);

        // reject the degenerate public values
        if peer <= BigUint::from(1u32) || peer >= &p - 1u32 {
            return Err(PeerMisbehaved::InvalidKeyShare.into());
        }

        Ok(peer.modpow(&self.secret, &p).to_bytes_be())
    }
}
