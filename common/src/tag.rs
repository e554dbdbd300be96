//! Helper functionality for working with tags and authorization sets.

use crate::{km_err, km_verr, set_err, Error};
use kmr_wire::{
    authorization,
    tag::{BignumTag, SingleTag, TypedTag},
    tags, Algorithm, AuthorizationSet, ErrorCode, Param, Tag,
};


/// Tags that the engine adds to key characteristics itself, and which may not be supplied by the
/// caller on key generation/import.
pub const AUTO_ADDED_CHARACTERISTICS: &[Tag] = &[Tag::RootOfTrust, Tag::Origin];

/// Tags that are bound into the key blob authentication but never stored in the characteristics.
pub const HIDDEN_TAGS: &[Tag] = &[Tag::ApplicationId, Tag::ApplicationData];

/// Tags whose presence in a key description is recognized but not supported.
pub const UNSUPPORTED_TAGS: &[Tag] = &[Tag::RollbackResistant];

/// Retrieve the (single) value of a tag in a set, failing with the given error code if it is
/// absent or holds a value of the wrong kind.
pub fn get_tag_value<T: SingleTag>(
    params: &AuthorizationSet,
    tag: T,
    err: ErrorCode,
) -> Result<T::Value<'_>, Error> {
    params.get_tag_value(tag).ok_or_else(|| km_verr!(err, "missing tag {:?}", tag.tag()))
}

/// Retrieve the value of a tag from key characteristics, looking in the enforced set first.
pub fn get_characteristic<'a, T: SingleTag>(
    enforced: &'a AuthorizationSet,
    unenforced: &'a AuthorizationSet,
    tag: T,
) -> Option<T::Value<'a>> {
    enforced.get_tag_value(tag).or_else(|| unenforced.get_tag_value(tag))
}

/// Get the configured algorithm from a set of parameters.
pub fn get_algorithm(params: &AuthorizationSet) -> Result<Algorithm, Error> {
    get_tag_value(params, tags::ALGORITHM, ErrorCode::UnsupportedAlgorithm)
}

/// Append a parameter to a set, converting failure into an [`Error`].
pub fn push_param(set: &mut AuthorizationSet, param: Param) -> Result<(), Error> {
    if set.push_back(param) {
        Ok(())
    } else {
        Err(set_err(set.is_valid(), "push_back"))
    }
}

/// Check a parameter deduced from imported key material against the key description: if the
/// description already holds a value for the tag it must match, otherwise the deduced value is
/// added.
pub fn check_or_add(desc: &mut AuthorizationSet, deduced: Param) -> Result<(), Error> {
    match desc.find(deduced.tag(), None) {
        Some(idx) => match desc.get(idx) {
            Some(existing) if existing == deduced => Ok(()),
            _ => Err(km_err!(
                ImportParameterMismatch,
                "{:?} in key description does not match key material",
                deduced.tag()
            )),
        },
        None => push_param(desc, deduced),
    }
}

/// As [`check_or_add`], for a big-endian integer value where leading zeros are insignificant.
pub fn check_or_add_bignum(
    desc: &mut AuthorizationSet,
    tag: BignumTag,
    value: &[u8],
) -> Result<(), Error> {
    match desc.get_tag_value(tag) {
        Some(existing) if trim_bignum(existing) == trim_bignum(value) => Ok(()),
        Some(_) => Err(km_err!(
            ImportParameterMismatch,
            "{:?} in key description does not match key material",
            tag.tag()
        )),
        None => push_param(desc, authorization(tag, value)),
    }
}

/// Strip leading zero bytes from a big-endian integer.
pub fn trim_bignum(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| *b != 0).unwrap_or(data.len());
    &data[start..]
}
