//! Key blob format: key material encrypted with AES-256-GCM, followed by the key characteristics.
//!
//! ```text
//! [u8 version][12-byte nonce][u32 len][encrypted key material, 16-byte tag]
//! [enforced set][unenforced set]
//! ```
//!
//! with all integers little-endian and the sets in their standard serialized form.
//!
//! Each blob carries its own random nonce, and the key encryption key (KEK) is derived from the
//! device root key and that nonce.  The GCM additional data covers the rest of the blob together
//! with a set of hidden parameters that are not stored in it, so a blob only decrypts when the
//! caller supplies the same hidden parameters that it was created with.

use crate::{
    crypto, crypto::aes, crypto::KeyMaterial, km_err, set_err, tag, vec_try_with_capacity, Error,
};
use alloc::vec::Vec;
use core::mem::size_of;
use kmr_wire::{authorization, tags, AuthorizationSet, Status};
use log::warn;

/// Key blob version.
const KEY_BLOB_VERSION: u8 = 0;

/// Context string mixed into each blob's KEK derivation.
const KEK_CONTEXT: &[u8] = b"KeyBlobEncryptionKey0\0";

/// Root key for devices with no secret storage of their own.
pub const SOFTWARE_ROOT_KEK: &[u8] = b"SoftwareKeyBlobRootKey\0\0\0\0\0\0\0\0\0\0";

/// Size of an empty serialized authorization set.
const EMPTY_SET_LEN: usize = 3 * size_of::<u32>();

/// Smallest well-formed blob: empty key material and empty characteristics.
const MIN_BLOB_LEN: usize =
    1 + aes::GCM_NONCE_SIZE + size_of::<u32>() + aes::GCM_TAG_SIZE + 2 * EMPTY_SET_LEN;

/// Plaintext key blob, with key characteristics.
#[derive(Debug, PartialEq, Eq)]
pub struct KeyBlob {
    pub key_material: KeyMaterial,
    pub enforced: AuthorizationSet,
    pub unenforced: AuthorizationSet,
}

fn consume<'a>(data: &mut &'a [u8], len: usize) -> Result<&'a [u8], Error> {
    if data.len() < len {
        return Err(km_err!(InvalidKeyBlob, "failed to find {} bytes", len));
    }
    let (head, rest) = data.split_at(len);
    *data = rest;
    Ok(head)
}

fn consume_array<const N: usize>(data: &mut &[u8]) -> Result<[u8; N], Error> {
    consume(data, N)?.try_into().map_err(|_e| km_err!(InvalidKeyBlob, "failed to find {} bytes", N))
}

fn consume_set(data: &mut &[u8], name: &str) -> Result<AuthorizationSet, Error> {
    let mut set = AuthorizationSet::new();
    if !set.deserialize_from(data) {
        return Err(match set.is_valid() {
            Status::AllocationFailure => set_err(Status::AllocationFailure, name),
            _ => km_err!(InvalidKeyBlob, "failed to parse {} set", name),
        });
    }
    Ok(set)
}

fn serialize_set(set: &AuthorizationSet, buf: &mut Vec<u8>) -> Result<(), Error> {
    set.serialize_into(buf).map_err(|status| set_err(status, "serialize"))
}

/// Derive the KEK for a single blob, as HMAC-SHA256(root_kek, KEK_CONTEXT || nonce).
fn derive_kek(
    hmac: &dyn crypto::Hmac,
    root_kek: &crypto::hmac::Key,
    nonce: &[u8; aes::GCM_NONCE_SIZE],
) -> Result<aes::Key, Error> {
    let derived = crypto::hmac::hmac_sha256(hmac, &root_kek.0, &[KEK_CONTEXT, &nonce[..]])?;
    let derived = crypto::hmac::Key::new(derived);
    let kek: [u8; aes::KEY_SIZE] = derived.0.as_slice().try_into().map_err(|_e| {
        km_err!(UnknownError, "derived KEK has unexpected length {}", derived.0.len())
    })?;
    Ok(aes::Key(kek))
}

/// Build the GCM additional data: the blob header, the serialized characteristics, and the
/// serialized hidden parameters.
fn additional_data(
    nonce: &[u8; aes::GCM_NONCE_SIZE],
    characteristics: &[u8],
    hidden: &AuthorizationSet,
) -> Result<Vec<u8>, Error> {
    let mut aad = vec_try_with_capacity!(
        1 + aes::GCM_NONCE_SIZE + characteristics.len() + hidden.serialized_size()
    )?;
    aad.push(KEY_BLOB_VERSION);
    aad.extend_from_slice(nonce);
    aad.extend_from_slice(characteristics);
    serialize_set(hidden, &mut aad)?;
    Ok(aad)
}

impl KeyBlob {
    /// Serialize a [`KeyBlob`], encrypting the key material under a fresh nonce.
    pub fn serialize(
        &self,
        aes: &dyn crypto::Aes,
        hmac: &dyn crypto::Hmac,
        rng: &mut dyn crypto::Rng,
        root_kek: &crypto::hmac::Key,
        hidden: &AuthorizationSet,
    ) -> Result<Vec<u8>, Error> {
        let mut nonce = [0u8; aes::GCM_NONCE_SIZE];
        rng.fill_bytes(&mut nonce)?;

        let mut characteristics = vec_try_with_capacity!(
            self.enforced.serialized_size() + self.unenforced.serialized_size()
        )?;
        serialize_set(&self.enforced, &mut characteristics)?;
        serialize_set(&self.unenforced, &mut characteristics)?;

        let kek = derive_kek(hmac, root_kek, &nonce)?;
        let aad = additional_data(&nonce, &characteristics, hidden)?;
        let ciphertext = aes.gcm_encrypt(&kek, &nonce, &aad, &self.key_material.0)?;

        let mut result = vec_try_with_capacity!(
            size_of::<u8>()
                + aes::GCM_NONCE_SIZE
                + size_of::<u32>()
                + ciphertext.len()
                + characteristics.len()
        )?;
        result.push(KEY_BLOB_VERSION);
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&(ciphertext.len() as u32).to_le_bytes());
        result.extend_from_slice(&ciphertext);
        result.extend_from_slice(&characteristics);
        Ok(result)
    }

    /// Parse a serialized [`KeyBlob`] and decrypt its key material.  Fails with
    /// `INVALID_KEY_BLOB` if the blob was not created with the same root key and hidden
    /// parameters, or has been altered since.
    pub fn deserialize(
        aes: &dyn crypto::Aes,
        hmac: &dyn crypto::Hmac,
        root_kek: &crypto::hmac::Key,
        mut data: &[u8],
        hidden: &AuthorizationSet,
    ) -> Result<Self, Error> {
        if data.len() < MIN_BLOB_LEN {
            return Err(km_err!(InvalidKeyBlob, "blob not long enough (len = {})", data.len()));
        }

        let version = consume(&mut data, 1)?[0];
        if version != KEY_BLOB_VERSION {
            return Err(km_err!(InvalidKeyBlob, "unexpected blob version {}", version));
        }
        let nonce: [u8; aes::GCM_NONCE_SIZE] = consume_array(&mut data)?;
        let len = u32::from_le_bytes(consume_array(&mut data)?) as usize;
        if len < aes::GCM_TAG_SIZE {
            return Err(km_err!(InvalidKeyBlob, "encrypted key material too short (len {})", len));
        }
        let ciphertext = consume(&mut data, len)?;

        let characteristics = data;
        let enforced = consume_set(&mut data, "enforced")?;
        let unenforced = consume_set(&mut data, "unenforced")?;
        if !data.is_empty() {
            return Err(km_err!(InvalidKeyBlob, "extra data (len {})", data.len()));
        }

        let kek = derive_kek(hmac, root_kek, &nonce)?;
        let aad = additional_data(&nonce, characteristics, hidden)?;
        let plaintext = aes.gcm_decrypt(&kek, &nonce, &aad, ciphertext).map_err(|e| {
            warn!("key blob failed to decrypt: {:?}", e);
            km_err!(InvalidKeyBlob, "invalid key blob")
        })?;
        Ok(KeyBlob { key_material: KeyMaterial(plaintext), enforced, unenforced })
    }
}

/// Build the parameters that are bound into a blob's encryption without being stored in it:
/// - `APPLICATION_ID(data)` if present
/// - `APPLICATION_DATA(data)` if present
/// - `ROOT_OF_TRUST(rot)` where `rot` is the device's root of trust.
pub fn hidden(params: &AuthorizationSet, rot: &[u8]) -> Result<AuthorizationSet, Error> {
    let mut results = AuthorizationSet::new();
    if let Some(app_id) = params.get_tag_value(tags::APPLICATION_ID) {
        tag::push_param(&mut results, authorization(tags::APPLICATION_ID, app_id))?;
    }
    if let Some(app_data) = params.get_tag_value(tags::APPLICATION_DATA) {
        tag::push_param(&mut results, authorization(tags::APPLICATION_DATA, app_data))?;
    }
    tag::push_param(&mut results, authorization(tags::ROOT_OF_TRUST, rot))?;
    Ok(results)
}
