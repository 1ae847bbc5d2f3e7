//! The single place where we generate random material for our own use.

use rand_core::{OsRng, RngCore};

/// Fill the whole slice with random material.
pub(crate) fn fill_random(bytes: &mut [u8]) -> Result<(), GetRandomFailed> {
    OsRng
        .try_fill_bytes(bytes)
        .map_err(|_| GetRandomFailed)
}

/// Make an array of size `N` containing random material.
pub(crate) fn random_array<const N: usize>() -> Result<[u8; N], GetRandomFailed> {
    let mut v = [0; N];
    fill_random(&mut v)?;
    Ok(v)
}

/// Random material generation failed.
#[derive(Debug)]
pub struct GetRandomFailed;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_arrays_differ() {
        let a: [u8; 32] = random_array().unwrap();
        let b: [u8; 32] = random_array().unwrap();
        assert_ne!(a, b);
    }
}
