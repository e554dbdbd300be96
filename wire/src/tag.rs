//! Authorization tags and the parameters built from them.
//!
//! The numeric value of a [`Tag`] carries its [`TagType`] in the top four bits, so the kind of a
//! tag is fixed by its value.  [`Param`] instances can only be built through the typed tag
//! constants in [`tags`], which pins the Rust type of the value to the kind of the tag:
//!
//! ```
//! use kmr_wire::{authorization, tags, Algorithm};
//! let param = authorization(tags::ALGORITHM, Algorithm::Rsa);
//! assert_eq!(param.tag(), kmr_wire::Tag::Algorithm);
//! ```

use crate::keymaster::{
    Algorithm, BlockMode, Digest, KeyBlobUsageRequirements, KeyOrigin, KeyPurpose, PaddingMode,
};
use crate::try_from_n;
use core::marker::PhantomData;
use enumn::N;

/// Mask covering the type bits of a raw tag value.
const TAG_TYPE_MASK: u32 = 0xf000_0000;

/// The kind of a tag, which determines the representation of its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum TagType {
    Invalid = 0,
    Enum = 268435456,
    EnumRep = 536870912,
    Int = 805306368,
    IntRep = 1073741824,
    Long = 1342177280,
    Date = 1610612736,
    Bool = 1879048192,
    Bignum = 2147483648,
    Bytes = 2415919104,
}
try_from_n!(TagType);

impl TagType {
    /// Indicate whether a tag of this type may appear more than once in a set.
    pub fn is_repeatable(&self) -> bool {
        matches!(self, TagType::EnumRep | TagType::IntRep)
    }

    /// Indicate whether values of this type live in the indirect data of a set.
    pub fn is_blob(&self) -> bool {
        matches!(self, TagType::Bignum | TagType::Bytes)
    }
}

/// Classify a raw tag value by its type bits.  Values with unrecognized type bits are `Invalid`.
pub fn tag_type(raw: u32) -> TagType {
    TagType::n(raw & TAG_TYPE_MASK).unwrap_or(TagType::Invalid)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum Tag {
    Purpose = 536870913,
    Algorithm = 268435458,
    KeySize = 805306371,
    BlockMode = 268435460,
    Digest = 268435461,
    MacLength = 805306374,
    Padding = 268435463,
    ReturnUnauthed = 1879048200,
    CallerNonce = 1879048201,
    RescopingAdd = 536871013,
    RescopingDel = 536871014,
    RsaPublicExponent = 1342177480,
    DsaGenerator = 2147483849,
    DsaP = 2147483850,
    DsaQ = 2147483851,
    ActiveDatetime = 1610613136,
    OriginationExpireDatetime = 1610613137,
    UsageExpireDatetime = 1610613138,
    MinSecondsBetweenOps = 805306771,
    SingleUsePerBoot = 1879048596,
    AllUsers = 1879048692,
    UserId = 805306869,
    NoAuthRequired = 1879048694,
    UserAuthId = 1073742327,
    AuthTimeout = 805306872,
    RescopeAuthTimeout = 805306873,
    AllApplications = 1879048792,
    ApplicationId = 2415919705,
    ApplicationData = 2415919804,
    CreationDatetime = 1610613437,
    Origin = 268436158,
    RollbackResistant = 1879048895,
    RootOfTrust = 2415919808,
    BlobUsageRequirements = 268436161,
    AdditionalData = 2415920104,
    ChunkLength = 805307369,
}
try_from_n!(Tag);

impl Tag {
    pub fn tag_type(&self) -> TagType {
        tag_type(*self as u32)
    }
}

/// The value held by a [`Param`].  Repeatable kinds share the shape of their single-valued
/// counterparts, and `BIGNUM` values share the `Bytes` shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Value<'a> {
    Enum(u32),
    Int(u32),
    Long(u64),
    Date(u64),
    Bool(bool),
    Bytes(&'a [u8]),
}

/// A single (tag, value) authorization entry.  Blob values borrow from their owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Param<'a> {
    tag: Tag,
    value: Value<'a>,
}

impl<'a> Param<'a> {
    /// Build a parameter whose value shape has already been checked against the tag's kind.
    pub(crate) fn new_unchecked(tag: Tag, value: Value<'a>) -> Self {
        Self { tag, value }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn value(&self) -> Value<'a> {
        self.value
    }

    /// Length of the blob held by this parameter, zero for non-blob kinds.
    pub fn blob_len(&self) -> usize {
        match self.value {
            Value::Bytes(data) => data.len(),
            _ => 0,
        }
    }
}

/// Enumerations that can be carried in `ENUM` and `ENUM_REP` tags.
pub trait TagEnum: Copy {
    fn to_raw(self) -> u32;
    fn from_raw(raw: u32) -> Option<Self>;
}

macro_rules! tag_enum {
    { $( $ename:ident ),* $(,)? } => {
        $(
            impl TagEnum for $ename {
                fn to_raw(self) -> u32 {
                    self as u32
                }
                fn from_raw(raw: u32) -> Option<Self> {
                    Self::n(raw)
                }
            }
        )*
    };
}

tag_enum!(
    Algorithm,
    BlockMode,
    Digest,
    KeyBlobUsageRequirements,
    KeyOrigin,
    KeyPurpose,
    PaddingMode,
    Tag
);

/// A tag whose value has a statically known Rust type.
pub trait TypedTag: Copy {
    type Value<'a>;
    fn tag(&self) -> Tag;
    fn encode<'a>(&self, value: Self::Value<'a>) -> Value<'a>;
    fn decode<'a>(&self, value: Value<'a>) -> Option<Self::Value<'a>>;
}

/// Marker for typed tags that appear at most once in a set.
pub trait SingleTag: TypedTag {}

/// Marker for typed tags that may appear several times in a set.
pub trait RepeatableTag: TypedTag {}

/// Build a parameter from a typed tag and a value of the matching type.
pub fn authorization<'a, T: TypedTag>(tag: T, value: T::Value<'a>) -> Param<'a> {
    Param { tag: tag.tag(), value: tag.encode(value) }
}

#[derive(Clone, Copy, Debug)]
pub struct EnumTag<E>(Tag, PhantomData<fn() -> E>);
#[derive(Clone, Copy, Debug)]
pub struct EnumRepTag<E>(Tag, PhantomData<fn() -> E>);
#[derive(Clone, Copy, Debug)]
pub struct IntTag(Tag);
#[derive(Clone, Copy, Debug)]
pub struct IntRepTag(Tag);
#[derive(Clone, Copy, Debug)]
pub struct LongTag(Tag);
#[derive(Clone, Copy, Debug)]
pub struct DateTag(Tag);
#[derive(Clone, Copy, Debug)]
pub struct BoolTag(Tag);
#[derive(Clone, Copy, Debug)]
pub struct BytesTag(Tag);
#[derive(Clone, Copy, Debug)]
pub struct BignumTag(Tag);

macro_rules! typed_enum_tag {
    { $typ:ident, $marker:ident } => {
        impl<E: TagEnum> TypedTag for $typ<E> {
            type Value<'a> = E;
            fn tag(&self) -> Tag {
                self.0
            }
            fn encode<'a>(&self, value: Self::Value<'a>) -> Value<'a> {
                Value::Enum(value.to_raw())
            }
            fn decode<'a>(&self, value: Value<'a>) -> Option<Self::Value<'a>> {
                match value {
                    Value::Enum(v) => E::from_raw(v),
                    _ => None,
                }
            }
        }
        impl<E: TagEnum> $marker for $typ<E> {}
    };
}

macro_rules! typed_tag {
    { $typ:ident, $marker:ident, $lt:lifetime => $vtyp:ty, $variant:ident } => {
        impl TypedTag for $typ {
            type Value<$lt> = $vtyp;
            fn tag(&self) -> Tag {
                self.0
            }
            fn encode<$lt>(&self, value: Self::Value<$lt>) -> Value<$lt> {
                Value::$variant(value)
            }
            fn decode<$lt>(&self, value: Value<$lt>) -> Option<Self::Value<$lt>> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
        impl $marker for $typ {}
    };
}

typed_enum_tag!(EnumTag, SingleTag);
typed_enum_tag!(EnumRepTag, RepeatableTag);
typed_tag!(IntTag, SingleTag, 'a => u32, Int);
typed_tag!(IntRepTag, RepeatableTag, 'a => u32, Int);
typed_tag!(LongTag, SingleTag, 'a => u64, Long);
typed_tag!(DateTag, SingleTag, 'a => u64, Date);
typed_tag!(BoolTag, SingleTag, 'a => bool, Bool);
typed_tag!(BytesTag, SingleTag, 'a => &'a [u8], Bytes);
typed_tag!(BignumTag, SingleTag, 'a => &'a [u8], Bytes);

/// Typed tag constants, one per [`Tag`].
pub mod tags {
    use super::*;

    pub const PURPOSE: EnumRepTag<KeyPurpose> = EnumRepTag(Tag::Purpose, PhantomData);
    pub const ALGORITHM: EnumTag<Algorithm> = EnumTag(Tag::Algorithm, PhantomData);
    pub const KEY_SIZE: IntTag = IntTag(Tag::KeySize);
    pub const BLOCK_MODE: EnumTag<BlockMode> = EnumTag(Tag::BlockMode, PhantomData);
    pub const DIGEST: EnumTag<Digest> = EnumTag(Tag::Digest, PhantomData);
    pub const MAC_LENGTH: IntTag = IntTag(Tag::MacLength);
    pub const PADDING: EnumTag<PaddingMode> = EnumTag(Tag::Padding, PhantomData);
    pub const RETURN_UNAUTHED: BoolTag = BoolTag(Tag::ReturnUnauthed);
    pub const CALLER_NONCE: BoolTag = BoolTag(Tag::CallerNonce);
    pub const RESCOPING_ADD: EnumRepTag<Tag> = EnumRepTag(Tag::RescopingAdd, PhantomData);
    pub const RESCOPING_DEL: EnumRepTag<Tag> = EnumRepTag(Tag::RescopingDel, PhantomData);
    pub const BLOB_USAGE_REQUIREMENTS: EnumTag<KeyBlobUsageRequirements> =
        EnumTag(Tag::BlobUsageRequirements, PhantomData);
    pub const RSA_PUBLIC_EXPONENT: LongTag = LongTag(Tag::RsaPublicExponent);
    pub const DSA_GENERATOR: BignumTag = BignumTag(Tag::DsaGenerator);
    pub const DSA_P: BignumTag = BignumTag(Tag::DsaP);
    pub const DSA_Q: BignumTag = BignumTag(Tag::DsaQ);
    pub const ACTIVE_DATETIME: DateTag = DateTag(Tag::ActiveDatetime);
    pub const ORIGINATION_EXPIRE_DATETIME: DateTag = DateTag(Tag::OriginationExpireDatetime);
    pub const USAGE_EXPIRE_DATETIME: DateTag = DateTag(Tag::UsageExpireDatetime);
    pub const MIN_SECONDS_BETWEEN_OPS: IntTag = IntTag(Tag::MinSecondsBetweenOps);
    pub const SINGLE_USE_PER_BOOT: BoolTag = BoolTag(Tag::SingleUsePerBoot);
    pub const ALL_USERS: BoolTag = BoolTag(Tag::AllUsers);
    pub const USER_ID: IntTag = IntTag(Tag::UserId);
    pub const NO_AUTH_REQUIRED: BoolTag = BoolTag(Tag::NoAuthRequired);
    pub const USER_AUTH_ID: IntRepTag = IntRepTag(Tag::UserAuthId);
    pub const AUTH_TIMEOUT: IntTag = IntTag(Tag::AuthTimeout);
    pub const RESCOPE_AUTH_TIMEOUT: IntTag = IntTag(Tag::RescopeAuthTimeout);
    pub const ALL_APPLICATIONS: BoolTag = BoolTag(Tag::AllApplications);
    pub const APPLICATION_ID: BytesTag = BytesTag(Tag::ApplicationId);
    pub const APPLICATION_DATA: BytesTag = BytesTag(Tag::ApplicationData);
    pub const CREATION_DATETIME: DateTag = DateTag(Tag::CreationDatetime);
    pub const ORIGIN: EnumTag<KeyOrigin> = EnumTag(Tag::Origin, PhantomData);
    pub const ROLLBACK_RESISTANT: BoolTag = BoolTag(Tag::RollbackResistant);
    pub const ROOT_OF_TRUST: BytesTag = BytesTag(Tag::RootOfTrust);
    pub const ADDITIONAL_DATA: BytesTag = BytesTag(Tag::AdditionalData);
    pub const CHUNK_LENGTH: IntTag = IntTag(Tag::ChunkLength);
}
