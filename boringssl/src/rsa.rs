use crate::{openssl_err, ossl};
use alloc::boxed::Box;
use alloc::vec::Vec;
use kmr_common::{crypto, crypto::KeyMaterial, km_err, vec_try, Error, FallibleAllocExt};
use kmr_wire::{KeySizeInBits, RsaExponent};
use log::warn;

/// Smallest allowed public exponent.
const MIN_RSA_EXPONENT: RsaExponent = RsaExponent(3);

/// [`crypto::Rsa`] implementation based on OpenSSL.
#[derive(Default)]
pub struct BoringRsa;

impl crypto::Rsa for BoringRsa {
    fn generate_key(
        &self,
        key_size: KeySizeInBits,
        pub_exponent: RsaExponent,
    ) -> Result<KeyMaterial, Error> {
        // Reject some obviously-wrong parameter values.
        if pub_exponent < MIN_RSA_EXPONENT {
            return Err(km_err!(
                InvalidArgument,
                "Invalid public exponent, {:?} < {:?}",
                pub_exponent,
                MIN_RSA_EXPONENT
            ));
        }
        if pub_exponent.0 % 2 != 1 {
            return Err(km_err!(
                InvalidArgument,
                "Invalid public exponent {:?} (even number)",
                pub_exponent
            ));
        }
        let exponent = openssl::bn::BigNum::from_slice(&pub_exponent.0.to_be_bytes()[..])
            .map_err(openssl_err!("failed to create BigNum for exponent {:?}", pub_exponent))?;

        let rsa_key =
            openssl::rsa::Rsa::generate_with_e(key_size.0, &exponent).map_err(openssl_err!(
                "failed to generate RSA key size {:?} exponent {:?}",
                key_size,
                pub_exponent
            ))?;
        Ok(KeyMaterial(ossl!(rsa_key.private_key_to_der())?))
    }

    fn import_pkcs8_key(
        &self,
        data: &[u8],
    ) -> Result<(KeyMaterial, KeySizeInBits, RsaExponent), Error> {
        let pkey = ossl!(openssl::pkey::PKey::private_key_from_pkcs8(data))?;
        if pkey.id() != openssl::pkey::Id::RSA {
            return Err(km_err!(IncompatibleAlgorithm, "PKCS#8 key is {:?}, not RSA", pkey.id()));
        }
        let rsa_key = ossl!(pkey.rsa())?;
        let key_size = KeySizeInBits(rsa_key.n().num_bits() as u32);

        let e = rsa_key.e().to_vec();
        if e.len() > core::mem::size_of::<u64>() {
            return Err(km_err!(
                ImportParameterMismatch,
                "public exponent of {} bytes does not fit",
                e.len()
            ));
        }
        let exponent = e.iter().fold(0u64, |acc, b| (acc << 8) | (*b as u64));
        Ok((KeyMaterial(ossl!(rsa_key.private_key_to_der())?), key_size, RsaExponent(exponent)))
    }

    fn subject_public_key_info(&self, key: &KeyMaterial) -> Result<Vec<u8>, Error> {
        let rsa_key = load_key(key)?;
        let pkey = ossl!(openssl::pkey::PKey::from_rsa(rsa_key))?;
        ossl!(pkey.public_key_to_der())
    }

    fn begin_sign(
        &self,
        key: &KeyMaterial,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        let rsa_key = load_key(key)?;
        let max_size = rsa_key.size() as usize;
        Ok(Box::new(BoringRsaUndigestSignOperation {
            rsa_key,
            pending_input: Vec::new(),
            max_size,
        }))
    }

    fn begin_verify(
        &self,
        key: &KeyMaterial,
    ) -> Result<Box<dyn crypto::VerifyingOperation>, Error> {
        let rsa_key = load_key(key)?;
        let max_size = rsa_key.size() as usize;
        Ok(Box::new(BoringRsaUndigestVerifyOperation {
            rsa_key,
            pending_input: Vec::new(),
            max_size,
        }))
    }
}

fn load_key(key: &KeyMaterial) -> Result<openssl::rsa::Rsa<openssl::pkey::Private>, Error> {
    openssl::rsa::Rsa::private_key_from_der(&key.0)
        .map_err(|e| km_err!(InvalidKeyBlob, "failed to parse RSA key material: {:?}", e))
}

/// [`crypto::AccumulatingOperation`] based on OpenSSL, for raw RSA signatures over data that is
/// exactly as long as the modulus.
pub struct BoringRsaUndigestSignOperation {
    rsa_key: openssl::rsa::Rsa<openssl::pkey::Private>,
    pending_input: Vec<u8>,
    max_size: usize,
}

impl crypto::AccumulatingOperation for BoringRsaUndigestSignOperation {
    fn max_input_size(&self) -> Option<usize> {
        Some(self.max_size)
    }

    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.pending_input.try_extend_from_slice(data)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        if self.pending_input.len() != self.max_size {
            return Err(km_err!(
                UnknownError,
                "raw RSA input of {} bytes does not match modulus length {}",
                self.pending_input.len(),
                self.max_size
            ));
        }
        let mut buf = vec_try![0; self.max_size]?;
        let len = ossl!(self.rsa_key.private_encrypt(
            &self.pending_input,
            &mut buf,
            openssl::rsa::Padding::NONE
        ))?;
        buf.truncate(len);
        Ok(buf)
    }
}

/// [`crypto::VerifyingOperation`] based on OpenSSL, for raw RSA signatures.
pub struct BoringRsaUndigestVerifyOperation {
    rsa_key: openssl::rsa::Rsa<openssl::pkey::Private>,
    pending_input: Vec<u8>,
    max_size: usize,
}

impl crypto::VerifyingOperation for BoringRsaUndigestVerifyOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.pending_input.try_extend_from_slice(data)?;
        Ok(())
    }

    fn finish(self: Box<Self>, signature: &[u8]) -> Result<(), Error> {
        if signature.len() != self.max_size {
            return Err(km_err!(
                VerificationFailed,
                "signature length {} does not match modulus length {}",
                signature.len(),
                self.max_size
            ));
        }
        let mut recovered = vec_try![0; self.max_size]?;
        let len = self
            .rsa_key
            .public_decrypt(signature, &mut recovered, openssl::rsa::Padding::NONE)
            .map_err(|e| {
                warn!("failed to recover RSA signature: {:?}", e);
                km_err!(VerificationFailed, "signature does not decrypt")
            })?;
        recovered.truncate(len);
        if recovered.len() != self.pending_input.len()
            || !openssl::memcmp::eq(&recovered, &self.pending_input)
        {
            return Err(km_err!(VerificationFailed, "signature does not match data"));
        }
        Ok(())
    }
}
