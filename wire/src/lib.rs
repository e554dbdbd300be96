//! Types and codecs for communication between a Keymaster client and the Keymaster engine.
//!
//! - [`tag`] holds the closed set of authorization tags and the typed tag wrappers that tie each
//!   tag to the Rust type of its value.
//! - [`authorization_set`] holds the ordered parameter collection with its indirect blob arena.
//! - [`legacy`] holds the request/response messages and the command/response envelopes.

#![no_std]
extern crate alloc;

use alloc::vec::Vec;

pub mod authorization_set;
pub mod keymaster;
pub mod legacy;
pub mod tag;

pub use authorization_set::{AuthorizationSet, Status};
pub use keymaster::*;
pub use tag::{authorization, tag_type, tags, Param, Tag, TagType, Value};


/// Marker type indicating failure to convert a raw integer into a wire `enum` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueNotRecognized;

/// Macro that emits an implementation of `TryFrom<u32>` (or `TryFrom<$repr>`) for an enum type
/// that has `[derive(N)]` attached to it.
#[macro_export]
macro_rules! try_from_n {
    { $ename:ident } => {
        $crate::try_from_n!($ename, u32);
    };
    { $ename:ident, $repr:ty } => {
        impl core::convert::TryFrom<$repr> for $ename {
            type Error = $crate::ValueNotRecognized;
            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                Self::n(value).ok_or($crate::ValueNotRecognized)
            }
        }
    };
}

/// Function that mimics `vec![<val>; <len>]` but which detects allocation failure with the given
/// error.
pub fn vec_try_fill_with_alloc_err<T: Clone, E>(
    elem: T,
    len: usize,
    alloc_err: fn() -> E,
) -> Result<Vec<T>, E> {
    let mut v = alloc::vec::Vec::new();
    v.try_reserve(len).map_err(|_e| alloc_err())?;
    v.resize(len, elem);
    Ok(v)
}

/// Function that mimics `vec![x1, x2, x3]` but which detects allocation failure with the given
/// error.
pub fn vec_try3_with_alloc_err<T: Clone, E>(
    x1: T,
    x2: T,
    x3: T,
    alloc_err: fn() -> E,
) -> Result<Vec<T>, E> {
    let mut v = alloc::vec::Vec::new();
    match v.try_reserve(3) {
        Err(_e) => Err(alloc_err()),
        Ok(_) => {
            v.push(x1);
            v.push(x2);
            v.push(x3);
            Ok(v)
        }
    }
}

/// Function that mimics `vec![x1, x2]` but which detects allocation failure with the given error.
pub fn vec_try2_with_alloc_err<T: Clone, E>(
    x1: T,
    x2: T,
    alloc_err: fn() -> E,
) -> Result<Vec<T>, E> {
    let mut v = alloc::vec::Vec::new();
    match v.try_reserve(2) {
        Err(_e) => Err(alloc_err()),
        Ok(_) => {
            v.push(x1);
            v.push(x2);
            Ok(v)
        }
    }
}

/// Function that mimics `vec![x1]` but which detects allocation failure with the given error.
pub fn vec_try1_with_alloc_err<T: Clone, E>(x1: T, alloc_err: fn() -> E) -> Result<Vec<T>, E> {
    let mut v = alloc::vec::Vec::new();
    match v.try_reserve(1) {
        Err(_e) => Err(alloc_err()),
        Ok(_) => {
            v.push(x1);
            Ok(v)
        }
    }
}

/// Macro that mimics `vec!` but which detects allocation failure.
#[macro_export]
macro_rules! vec_try {
    { $elem:expr ; $len:expr } => {
        $crate::vec_try_fill_with_alloc_err($elem, $len, || $crate::legacy::Error::AllocationFailed)
    };
    { $x1:expr, $x2:expr, $x3:expr $(,)? } => {
        $crate::vec_try3_with_alloc_err($x1, $x2, $x3, || $crate::legacy::Error::AllocationFailed)
    };
    { $x1:expr, $x2:expr $(,)? } => {
        $crate::vec_try2_with_alloc_err($x1, $x2, || $crate::legacy::Error::AllocationFailed)
    };
    { $x1:expr $(,)? } => {
        $crate::vec_try1_with_alloc_err($x1, || $crate::legacy::Error::AllocationFailed)
    };
}
