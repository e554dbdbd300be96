//! Traits representing abstractions of cryptographic functionality.

use super::*;
use crate::Error;
use alloc::boxed::Box;
use kmr_wire::{Digest, EcCurve, KeySizeInBits, RsaExponent};

/// Combined collection of trait implementations that must be provided.
pub struct Implementation {
    /// Random number generator.
    pub rng: Box<dyn Rng>,

    /// A wall clock, used to timestamp key creation.
    pub clock: Box<dyn WallClock>,

    /// AES implementation, used to encrypt key material in key blobs.
    pub aes: Box<dyn Aes>,

    /// HMAC implementation.
    pub hmac: Box<dyn Hmac>,

    /// RSA implementation.
    pub rsa: Box<dyn Rsa>,

    /// DSA implementation.
    pub dsa: Box<dyn Dsa>,

    /// ECDSA implementation.
    pub ec: Box<dyn Ec>,
}

/// Abstraction of a random number generator that is cryptographically secure.
pub trait Rng: Send {
    /// Generate random data.
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error>;
    /// Return a random `u64` value.
    fn next_u64(&mut self) -> Result<u64, Error> {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// Abstraction of AES-256-GCM authenticated encryption, with a tag of
/// [`aes::GCM_TAG_SIZE`] bytes.
pub trait Aes: Send + Sync {
    /// Encrypt `plaintext`, authenticating `aad` along with it.  Returns the ciphertext with the
    /// tag appended.
    fn gcm_encrypt(
        &self,
        key: &aes::Key,
        nonce: &[u8; aes::GCM_NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error>;

    /// Decrypt the output of [`Aes::gcm_encrypt`].  Fails with `VERIFICATION_FAILED` if the
    /// ciphertext, tag or `aad` differ from what was encrypted.
    fn gcm_decrypt(
        &self,
        key: &aes::Key,
        nonce: &[u8; aes::GCM_NONCE_SIZE],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, Error>;
}

/// Abstraction of a clock that reports real time.
pub trait WallClock: Send + Sync {
    /// Return the current time in milliseconds since the Unix epoch.
    fn now(&self) -> MillisecondsSinceEpoch;
}

/// Abstraction of HMAC functionality.
pub trait Hmac: Send + Sync {
    /// Create an HMAC operation.  Implementations can assume that:
    /// - `digest` will not be [`Digest::None`]
    fn begin(
        &self,
        key: hmac::Key,
        digest: Digest,
    ) -> Result<Box<dyn AccumulatingOperation>, Error>;
}

/// Abstraction of RSA functionality.
pub trait Rsa: Send + Sync {
    /// Generate an RSA key.
    fn generate_key(
        &self,
        key_size: KeySizeInBits,
        pub_exponent: RsaExponent,
    ) -> Result<KeyMaterial, Error>;

    /// Import an RSA key in PKCS#8 format, also returning the key size in bits and public
    /// exponent.
    fn import_pkcs8_key(
        &self,
        data: &[u8],
    ) -> Result<(KeyMaterial, KeySizeInBits, RsaExponent), Error>;

    /// Return the public key as an ASN.1 DER encoded `SubjectPublicKeyInfo`.
    fn subject_public_key_info(&self, key: &KeyMaterial) -> Result<Vec<u8>, Error>;

    /// Create a raw (unpadded, undigested) signing operation.  The accumulated input must be
    /// exactly as long as the modulus.
    fn begin_sign(&self, key: &KeyMaterial) -> Result<Box<dyn AccumulatingOperation>, Error>;

    /// Create a raw (unpadded, undigested) verification operation.
    fn begin_verify(&self, key: &KeyMaterial) -> Result<Box<dyn VerifyingOperation>, Error>;
}

/// Abstraction of DSA functionality.
pub trait Dsa: Send + Sync {
    /// Generate a DSA key, generating domain parameters of size `key_size` if none are given.
    /// Returns the domain parameters that the key uses.
    fn generate_key(
        &self,
        key_size: KeySizeInBits,
        params: Option<&dsa::Params>,
    ) -> Result<(KeyMaterial, dsa::Params), Error>;

    /// Import a DSA key in PKCS#8 format, also returning its domain parameters.
    fn import_pkcs8_key(&self, data: &[u8]) -> Result<(KeyMaterial, dsa::Params), Error>;

    /// Return the public key as an ASN.1 DER encoded `SubjectPublicKeyInfo`.
    fn subject_public_key_info(&self, key: &KeyMaterial) -> Result<Vec<u8>, Error>;

    /// Create a signing operation over undigested input.
    fn begin_sign(&self, key: &KeyMaterial) -> Result<Box<dyn AccumulatingOperation>, Error>;

    /// Create a verification operation over undigested input.
    fn begin_verify(&self, key: &KeyMaterial) -> Result<Box<dyn VerifyingOperation>, Error>;
}

/// Abstraction of ECDSA functionality over the NIST prime curves.
pub trait Ec: Send + Sync {
    /// Generate an EC key on the given curve.
    fn generate_key(&self, curve: EcCurve) -> Result<KeyMaterial, Error>;

    /// Import an EC key in PKCS#8 format, also returning its curve.  Keys on curves other than
    /// those of [`EcCurve`] fail with `UNSUPPORTED_EC_FIELD`.
    fn import_pkcs8_key(&self, data: &[u8]) -> Result<(KeyMaterial, EcCurve), Error>;

    /// Return the public key as an ASN.1 DER encoded `SubjectPublicKeyInfo`.
    fn subject_public_key_info(&self, key: &KeyMaterial) -> Result<Vec<u8>, Error>;

    /// Create a signing operation over undigested input.
    fn begin_sign(&self, key: &KeyMaterial) -> Result<Box<dyn AccumulatingOperation>, Error>;

    /// Create a verification operation over undigested input.
    fn begin_verify(&self, key: &KeyMaterial) -> Result<Box<dyn VerifyingOperation>, Error>;
}

/// Abstraction of an in-progress operation that only emits data when it completes.
pub trait AccumulatingOperation: Send {
    /// Maximum size of accumulated input.
    fn max_input_size(&self) -> Option<usize> {
        None
    }

    /// Update operation with data.
    fn update(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Complete operation, consuming `self`.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error>;
}

/// Abstraction of an in-progress signature verification, which is given the signature to check
/// when it completes.
pub trait VerifyingOperation: Send {
    /// Update operation with data.
    fn update(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Complete operation, consuming `self`.  Fails with `VERIFICATION_FAILED` if the signature
    /// does not match the accumulated data.
    fn finish(self: Box<Self>, signature: &[u8]) -> Result<(), Error>;
}
