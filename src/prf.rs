//! The TLS pseudo-random function, RFC 2246 §5 and RFC 5246 §5.

use crate::crypto::hmac;
use crate::msgs::enums::{HashAlgorithm, ProtocolVersion};

fn concat_sign(key: &hmac::Key, a: &[u8], b: &[u8]) -> hmac::Tag {
    key.sign(&[a, b])
}

fn p(out: &mut [u8], alg: HashAlgorithm, secret: &[u8], seed: &[u8]) {
    let hmac_key = hmac::Key::new(alg, secret);

    // A(1)
    let mut current_a = hmac_key.sign(&[seed]);
    let chunk_size = hmac_key.tag_len();
    for chunk in out.chunks_mut(chunk_size) {
        // P_hash[i] = HMAC_hash(secret, A(i) + seed)
        let p_term = concat_sign(&hmac_key, current_a.as_ref(), seed);
        chunk.copy_from_slice(&p_term.as_ref()[..chunk.len()]);

        // A(i+1) = HMAC_hash(secret, A(i))
        current_a = hmac_key.sign(&[current_a.as_ref()]);
    }
}

fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut ret = Vec::new();
    ret.extend_from_slice(a);
    ret.extend_from_slice(b);
    ret
}

/// The TLS 1.0/1.1 PRF: P_MD5 over the first half of the secret, XORed
/// with P_SHA1 over the second half.  The halves overlap by one byte when
/// the secret has odd length.
fn prf_10(out: &mut [u8], secret: &[u8], joined_seed: &[u8]) {
    let half = (secret.len() + 1) / 2;
    let (s1, s2) = (&secret[..half], &secret[secret.len() - half..]);

    p(out, HashAlgorithm::MD5, s1, joined_seed);

    let mut sha1_out = vec![0u8; out.len()];
    p(&mut sha1_out, HashAlgorithm::SHA1, s2, joined_seed);

    for (o, s) in out.iter_mut().zip(sha1_out.iter()) {
        *o ^= s;
    }
}

/// Fill `out` with PRF output for the given negotiated `version`.
pub(crate) fn prf(
    out: &mut [u8],
    version: ProtocolVersion,
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
) {
    let joined_seed = concat(label, seed);

    match version {
        ProtocolVersion::TLSv1_2 => p(out, HashAlgorithm::SHA256, secret, &joined_seed),
        _ => prf_10(out, secret, &joined_seed),
    }
}
