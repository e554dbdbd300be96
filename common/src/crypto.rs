//! Abstractions and related types for accessing cryptographic primitives
//! and related functionality.

use alloc::vec::Vec;
use zeroize::ZeroizeOnDrop;

pub mod aes;
pub mod dsa;
pub mod hmac;
mod traits;
pub use traits::*;

/// Size of SHA-256 output in bytes.
pub const SHA256_DIGEST_LEN: usize = 32;

/// Milliseconds since the Unix epoch.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MillisecondsSinceEpoch(pub u64);

/// Private key material for an asymmetric key, held as the DER encoding that OpenSSL's
/// `i2d_PrivateKey` produces for the key type (PKCS#1 `RSAPrivateKey`, the DSA private key
/// structure, or RFC 5915 `ECPrivateKey`).
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct KeyMaterial(pub Vec<u8>);

/// Manual implementation of [`Debug`] that skips emitting plaintext key material.
impl core::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("KeyMaterial(len={}, ...)", self.0.len()))
    }
}
