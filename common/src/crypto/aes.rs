//! Functionality related to AES encryption.

use zeroize::ZeroizeOnDrop;

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of a GCM nonce in bytes.
pub const GCM_NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag in bytes.
pub const GCM_TAG_SIZE: usize = 16;

/// An AES-256 key.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Key(pub [u8; KEY_SIZE]);

impl core::fmt::Debug for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("aes::Key(...)")
    }
}
