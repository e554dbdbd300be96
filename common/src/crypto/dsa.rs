//! Functionality related to DSA.

use crate::{km_err, tag, try_to_vec, Error};
use alloc::vec::Vec;
use kmr_wire::{tags, AuthorizationSet, KeySizeInBits};
use log::error;

/// DSA domain parameters, each a big-endian unsigned integer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Params {
    pub g: Vec<u8>,
    pub p: Vec<u8>,
    pub q: Vec<u8>,
}

impl Params {
    /// Extract domain parameters from a key description.  Returns `None` if none of the three
    /// parameters are present, and fails with `INVALID_DSA_PARAMS` if only some of them are.
    pub fn from_params(params: &AuthorizationSet) -> Result<Option<Self>, Error> {
        let g = params.get_tag_value(tags::DSA_GENERATOR);
        let p = params.get_tag_value(tags::DSA_P);
        let q = params.get_tag_value(tags::DSA_Q);
        match (g, p, q) {
            (None, None, None) => Ok(None),
            (Some(g), Some(p), Some(q)) => {
                Ok(Some(Params { g: try_to_vec(g)?, p: try_to_vec(p)?, q: try_to_vec(q)? }))
            }
            _ => {
                error!("Some DSA parameters provided.  Provide all or none");
                Err(km_err!(InvalidDsaParams, "incomplete DSA parameters"))
            }
        }
    }

    /// Record the domain parameters in a key description, checking them against any values that
    /// are already present.
    pub fn check_or_add(&self, desc: &mut AuthorizationSet) -> Result<(), Error> {
        tag::check_or_add_bignum(desc, tags::DSA_GENERATOR, &self.g)?;
        tag::check_or_add_bignum(desc, tags::DSA_P, &self.p)?;
        tag::check_or_add_bignum(desc, tags::DSA_Q, &self.q)
    }

    /// Key size implied by the parameters: the bit length of `p` rounded up to a multiple of 64,
    /// as DSA key sizes are constrained to be multiples of 64 bits.
    pub fn key_size(&self) -> KeySizeInBits {
        let p = tag::trim_bignum(&self.p);
        KeySizeInBits(((p.len() as u32 * 8) + 63) / 64 * 64)
    }
}
