//! Thin adapters over the external hash and HMAC implementations.
//!
//! The rest of the crate addresses hash functions by their TLS
//! `HashAlgorithm` identifier; these modules provide the concrete
//! implementations behind those identifiers.

pub(crate) mod hash;
pub(crate) mod hmac;
