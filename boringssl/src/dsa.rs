use crate::{openssl_err, ossl};
use alloc::boxed::Box;
use alloc::vec::Vec;
use kmr_common::{crypto, crypto::dsa, crypto::KeyMaterial, km_err, Error, FallibleAllocExt};
use kmr_wire::KeySizeInBits;
use log::{info, warn};
use openssl::pkey::{PKey, Private};

/// [`crypto::Dsa`] implementation based on OpenSSL.
#[derive(Default)]
pub struct BoringDsa;

impl crypto::Dsa for BoringDsa {
    fn generate_key(
        &self,
        key_size: KeySizeInBits,
        params: Option<&dsa::Params>,
    ) -> Result<(KeyMaterial, dsa::Params), Error> {
        let dsa_params = match params {
            Some(params) => {
                let p = ossl!(openssl::bn::BigNum::from_slice(&params.p))?;
                let q = ossl!(openssl::bn::BigNum::from_slice(&params.q))?;
                let g = ossl!(openssl::bn::BigNum::from_slice(&params.g))?;
                openssl::dsa::Dsa::from_pqg(p, q, g)
                    .map_err(|e| km_err!(InvalidDsaParams, "unusable DSA parameters: {:?}", e))?
            }
            None => {
                info!("Generating {}-bit DSA parameters", key_size.0);
                openssl::dsa::Dsa::generate_params(key_size.0).map_err(openssl_err!(
                    "failed to generate DSA parameters of size {:?}",
                    key_size
                ))?
            }
        };
        let dsa_key = ossl!(dsa_params.generate_key())?;
        let params = params_of(&dsa_key);
        Ok((KeyMaterial(ossl!(dsa_key.private_key_to_der())?), params))
    }

    fn import_pkcs8_key(&self, data: &[u8]) -> Result<(KeyMaterial, dsa::Params), Error> {
        let pkey = ossl!(PKey::private_key_from_pkcs8(data))?;
        if pkey.id() != openssl::pkey::Id::DSA {
            return Err(km_err!(IncompatibleAlgorithm, "PKCS#8 key is {:?}, not DSA", pkey.id()));
        }
        let dsa_key = ossl!(pkey.dsa())?;
        let params = params_of(&dsa_key);
        Ok((KeyMaterial(ossl!(dsa_key.private_key_to_der())?), params))
    }

    fn subject_public_key_info(&self, key: &KeyMaterial) -> Result<Vec<u8>, Error> {
        let pkey = load_pkey(key)?;
        ossl!(pkey.public_key_to_der())
    }

    fn begin_sign(
        &self,
        key: &KeyMaterial,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        let pkey = load_pkey(key)?;
        Ok(Box::new(BoringDsaSignOperation { pkey, pending_input: Vec::new() }))
    }

    fn begin_verify(
        &self,
        key: &KeyMaterial,
    ) -> Result<Box<dyn crypto::VerifyingOperation>, Error> {
        let pkey = load_pkey(key)?;
        Ok(Box::new(BoringDsaVerifyOperation { pkey, pending_input: Vec::new() }))
    }
}

fn params_of<T>(dsa_key: &openssl::dsa::DsaRef<T>) -> dsa::Params
where
    T: openssl::pkey::HasParams,
{
    dsa::Params { g: dsa_key.g().to_vec(), p: dsa_key.p().to_vec(), q: dsa_key.q().to_vec() }
}

fn load_pkey(key: &KeyMaterial) -> Result<PKey<Private>, Error> {
    let pkey = PKey::private_key_from_der(&key.0)
        .map_err(|e| km_err!(InvalidKeyBlob, "failed to parse DSA key material: {:?}", e))?;
    if pkey.id() != openssl::pkey::Id::DSA {
        return Err(km_err!(InvalidKeyBlob, "failed to parse DSA key material: {:?}", pkey.id()));
    }
    Ok(pkey)
}

/// [`crypto::AccumulatingOperation`] based on OpenSSL, for DSA signatures over undigested data.
/// The data is treated as an already-computed digest, and so is truncated to the size of `q`.
pub struct BoringDsaSignOperation {
    pkey: PKey<Private>,
    pending_input: Vec<u8>,
}

impl crypto::AccumulatingOperation for BoringDsaSignOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.pending_input.try_extend_from_slice(data)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        let mut ctx = ossl!(openssl::pkey_ctx::PkeyCtx::new(&self.pkey))?;
        ossl!(ctx.sign_init())?;
        let mut sig = Vec::new();
        ossl!(ctx.sign_to_vec(&self.pending_input, &mut sig))?;
        Ok(sig)
    }
}

/// [`crypto::VerifyingOperation`] based on OpenSSL, for DSA signatures over undigested data.
pub struct BoringDsaVerifyOperation {
    pkey: PKey<Private>,
    pending_input: Vec<u8>,
}

impl crypto::VerifyingOperation for BoringDsaVerifyOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.pending_input.try_extend_from_slice(data)?;
        Ok(())
    }

    fn finish(self: Box<Self>, signature: &[u8]) -> Result<(), Error> {
        let mut ctx = ossl!(openssl::pkey_ctx::PkeyCtx::new(&self.pkey))?;
        ossl!(ctx.verify_init())?;
        match ctx.verify(&self.pending_input, signature) {
            Ok(true) => Ok(()),
            Ok(false) => Err(km_err!(VerificationFailed, "DSA signature does not match data")),
            Err(e) => {
                warn!("DSA verification failed: {:?}", e);
                Err(km_err!(VerificationFailed, "malformed DSA signature"))
            }
        }
    }
}
