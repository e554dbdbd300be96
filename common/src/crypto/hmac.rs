//! Functionality related to HMAC signing/verification.

use super::Hmac;
use crate::{try_to_vec, Error};
use alloc::vec::Vec;
use kmr_wire::{Digest, KeySizeInBits};
use zeroize::ZeroizeOnDrop;

/// An HMAC key.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Key(pub Vec<u8>);

impl Key {
    /// Create a new HMAC key from data.
    pub fn new(data: Vec<u8>) -> Key {
        Key(data)
    }

    /// Create a new HMAC key from data.
    pub fn new_from(data: &[u8]) -> Result<Key, Error> {
        Ok(Key::new(try_to_vec(data)?))
    }

    /// Indicate the size of the key in bits.
    pub fn size(&self) -> KeySizeInBits {
        KeySizeInBits((self.0.len() * 8) as u32)
    }
}

/// Convenience wrapper to perform one-shot HMAC-SHA256 over a sequence of chunks.
pub fn hmac_sha256(hmac: &dyn Hmac, key: &[u8], chunks: &[&[u8]]) -> Result<Vec<u8>, Error> {
    let mut op = hmac.begin(Key::new_from(key)?, Digest::Sha256)?;
    for chunk in chunks {
        op.update(chunk)?;
    }
    op.finish()
}
