use crate::{openssl_err, ossl};
use alloc::vec::Vec;
use kmr_common::{crypto, crypto::aes, km_err, vec_try, Error, FallibleAllocExt};
use log::warn;
use openssl::symm::{Cipher, Crypter, Mode};

/// [`crypto::Aes`] implementation based on OpenSSL.
#[derive(Default)]
pub struct BoringAes;

impl crypto::Aes for BoringAes {
    fn gcm_encrypt(
        &self,
        key: &aes::Key,
        nonce: &[u8; aes::GCM_NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut crypter = gcm_crypter(key, nonce, Mode::Encrypt)?;
        ossl!(crypter.aad_update(aad))?;
        let mut output = vec_try![0; plaintext.len() + Cipher::aes_256_gcm().block_size()]?;
        let mut count = ossl!(crypter.update(plaintext, &mut output))?;
        count += ossl!(crypter.finalize(&mut output[count..]))?;
        output.truncate(count);

        let mut tag = [0u8; aes::GCM_TAG_SIZE];
        ossl!(crypter.get_tag(&mut tag))?;
        output.try_extend_from_slice(&tag)?;
        Ok(output)
    }

    fn gcm_decrypt(
        &self,
        key: &aes::Key,
        nonce: &[u8; aes::GCM_NONCE_SIZE],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if ciphertext.len() < aes::GCM_TAG_SIZE {
            return Err(km_err!(
                VerificationFailed,
                "GCM input too short for tag (len {})",
                ciphertext.len()
            ));
        }
        let (ciphertext, tag) = ciphertext.split_at(ciphertext.len() - aes::GCM_TAG_SIZE);
        let mut crypter = gcm_crypter(key, nonce, Mode::Decrypt)?;
        ossl!(crypter.set_tag(tag))?;
        ossl!(crypter.aad_update(aad))?;
        let mut output = vec_try![0; ciphertext.len() + Cipher::aes_256_gcm().block_size()]?;
        let count = ossl!(crypter.update(ciphertext, &mut output))?;
        match crypter.finalize(&mut output[count..]) {
            Ok(extra) => {
                output.truncate(count + extra);
                Ok(output)
            }
            Err(e) => {
                warn!("GCM tag mismatch: {:?}", e);
                output.fill(0);
                Err(km_err!(VerificationFailed, "GCM tag mismatch"))
            }
        }
    }
}

fn gcm_crypter(
    key: &aes::Key,
    nonce: &[u8; aes::GCM_NONCE_SIZE],
    mode: Mode,
) -> Result<Crypter, Error> {
    Crypter::new(Cipher::aes_256_gcm(), mode, &key.0, Some(&nonce[..]))
        .map_err(openssl_err!("failed to create GCM Crypter"))
}
