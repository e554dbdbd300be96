use crate::ossl;
use kmr_common::{crypto, Error};

/// [`crypto::Rng`] implementation based on OpenSSL.
#[derive(Default)]
pub struct BoringRng;

impl crypto::Rng for BoringRng {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        ossl!(openssl::rand::rand_bytes(dest))
    }
}
