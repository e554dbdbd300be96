use crate::{digest_into_openssl, ossl};
use alloc::boxed::Box;
use alloc::vec::Vec;
use kmr_common::{crypto, km_err, Error, FallibleAllocExt};
use kmr_wire::Digest;

/// [`crypto::Hmac`] implementation based on OpenSSL.
pub struct BoringHmac;

impl crypto::Hmac for BoringHmac {
    fn begin(
        &self,
        key: crypto::hmac::Key,
        digest: Digest,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        if digest_into_openssl(digest).is_none() {
            return Err(km_err!(UnsupportedDigest, "unknown digest {:?}", digest));
        }
        let pkey = ossl!(openssl::pkey::PKey::hmac(&key.0))?;
        Ok(Box::new(BoringHmacOperation { pkey, digest, pending_input: Vec::new() }))
    }
}

/// [`crypto::AccumulatingOperation`] implementation for HMAC based on OpenSSL.
///
/// An `openssl::sign::Signer` borrows the key it signs with, so the input is accumulated and
/// the MAC calculated in one go on `finish()`.
pub struct BoringHmacOperation {
    pkey: openssl::pkey::PKey<openssl::pkey::Private>,
    digest: Digest,
    pending_input: Vec<u8>,
}

impl crypto::AccumulatingOperation for BoringHmacOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.pending_input.try_extend_from_slice(data)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        let digest = digest_into_openssl(self.digest)
            .ok_or_else(|| km_err!(UnsupportedDigest, "unknown digest {:?}", self.digest))?;
        let mut signer = ossl!(openssl::sign::Signer::new(digest, &self.pkey))?;
        ossl!(signer.update(&self.pending_input))?;
        ossl!(signer.sign_to_vec())
    }
}
