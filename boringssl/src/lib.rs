//! Implementations of [`kmr_common::crypto`] traits based on OpenSSL.

#![no_std]

extern crate alloc;

use kmr_wire::{Digest, ErrorCode};
use log::error;
use openssl::hash::MessageDigest;

pub mod aes;
pub mod clock;
pub mod dsa;
pub mod ec;
pub mod hmac;
pub mod rng;
pub mod rsa;


/// Map an OpenSSL `ErrorStack` into a Keymaster [`ErrorCode`] value.
pub(crate) fn map_openssl_errstack(errs: &openssl::error::ErrorStack) -> ErrorCode {
    let errors = errs.errors();
    if errors.is_empty() {
        error!("OpenSSL error requested but none available!");
    }
    ErrorCode::UnknownError
}

/// Macro to auto-generate error mapping around invocations of `openssl` methods.
/// An invocation like:
///
/// ```ignore
/// let x = ossl!(y.func(a, b))?;
/// ```
///
/// will map to:
///
/// ```ignore
/// let x = y.func(a, b).map_err(openssl_err!("failed to perform: y.func(a, b)"))?;
/// ```
#[macro_export]
macro_rules! ossl {
    { $e:expr } => {
        $e.map_err($crate::openssl_err!(concat!("failed to perform: ", stringify!($e))))
    }
}

/// Macro to emit a closure that builds an [`Error::Hal`] instance, based on an
/// openssl `ErrorStack` together with a format-like message.
#[macro_export]
macro_rules! openssl_err {
    { $($arg:tt)+ } => {
        |e| kmr_common::Error::Hal(
            $crate::map_openssl_errstack(&e),
            alloc::format!("{}:{}: {}: {:?}", file!(), line!(), format_args!($($arg)+), e)
        )
    };
}

/// Translate a [`Digest`] into an OpenSSL [`MessageDigest`].
fn digest_into_openssl(digest: Digest) -> Option<MessageDigest> {
    match digest {
        Digest::None => None,
        Digest::Md5 => Some(MessageDigest::md5()),
        Digest::Sha1 => Some(MessageDigest::sha1()),
        Digest::Sha224 => Some(MessageDigest::sha224()),
        Digest::Sha256 => Some(MessageDigest::sha256()),
        Digest::Sha384 => Some(MessageDigest::sha384()),
        Digest::Sha512 => Some(MessageDigest::sha512()),
        Digest::Sha3_256 => Some(MessageDigest::sha3_256()),
        Digest::Sha3_384 => Some(MessageDigest::sha3_384()),
        Digest::Sha3_512 => Some(MessageDigest::sha3_512()),
    }
}

/// Build a full [`kmr_common::crypto::Implementation`] from the OpenSSL-based trait
/// implementations in this crate.
pub fn implementation() -> kmr_common::crypto::Implementation {
    kmr_common::crypto::Implementation {
        rng: alloc::boxed::Box::new(rng::BoringRng),
        clock: alloc::boxed::Box::new(clock::StdClock),
        aes: alloc::boxed::Box::new(aes::BoringAes),
        hmac: alloc::boxed::Box::new(hmac::BoringHmac),
        rsa: alloc::boxed::Box::new(rsa::BoringRsa),
        dsa: alloc::boxed::Box::new(dsa::BoringDsa),
        ec: alloc::boxed::Box::new(ec::BoringEc),
    }
}
