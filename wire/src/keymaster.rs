//! Enumerations and error codes carried by Keymaster authorization tags and messages.
//!
//! - Enums are encoded as exhaustive Rust enums backed by `u32` (or `i32` for [`ErrorCode`]),
//!   using Rust naming conventions (CamelCase values).
//! - Values match the numeric values used on the wire.

use crate::try_from_n;
use enumn::N;

/// Key size in bits.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeySizeInBits(pub u32);

/// RSA exponent.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RsaExponent(pub u64);

/// Default RSA public exponent (F4).
pub const DEFAULT_RSA_EXPONENT: RsaExponent = RsaExponent(65537);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum Algorithm {
    Rsa = 1,
    Dsa = 2,
    Ecdsa = 3,
    Ecies = 4,
    Aes = 32,
    TripleDes = 33,
    Hmac = 128,
}
try_from_n!(Algorithm);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum BlockMode {
    Ecb = 1,
    Cbc = 2,
    CbcCts = 3,
    Ctr = 4,
    Ofb = 5,
    Cfb = 6,
    Xts = 7,
    Ocb = 32,
    Gcm = 33,
    Ccm = 34,
    Cmac = 128,
    Poly1305 = 129,
}
try_from_n!(BlockMode);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum PaddingMode {
    None = 0,
    RsaOaep = 1,
    RsaPss = 2,
    RsaPkcs115Encrypt = 3,
    RsaPkcs115Sign = 4,
    AnsiX923 = 32,
    Iso10126 = 33,
    Zero = 64,
    Pkcs7 = 65,
    Iso78164 = 66,
}
try_from_n!(PaddingMode);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum Digest {
    None = 0,
    Md5 = 1,
    Sha1 = 2,
    Sha224 = 3,
    Sha256 = 4,
    Sha384 = 5,
    Sha512 = 6,
    Sha3_256 = 7,
    Sha3_384 = 8,
    Sha3_512 = 9,
}
try_from_n!(Digest);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum KeyOrigin {
    Hardware = 0,
    Software = 1,
    Imported = 2,
}
try_from_n!(KeyOrigin);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum KeyPurpose {
    Encrypt = 0,
    Decrypt = 1,
    Sign = 2,
    Verify = 3,
}
try_from_n!(KeyPurpose);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum KeyFormat {
    X509 = 0,
    Pkcs8 = 1,
    Pkcs12 = 2,
    Raw = 3,
}
try_from_n!(KeyFormat);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum KeyBlobUsageRequirements {
    Standalone = 0,
    RequiresFileSystem = 1,
}
try_from_n!(KeyBlobUsageRequirements);

/// Elliptic curves usable for ECDSA keys, identified by their field size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(u32)]
pub enum EcCurve {
    P192 = 192,
    P224 = 224,
    P256 = 256,
    P384 = 384,
    P521 = 521,
}
try_from_n!(EcCurve);

impl EcCurve {
    /// Curve for an ECDSA key of the given size, if any.
    pub fn from_key_size(size: KeySizeInBits) -> Option<Self> {
        Self::n(size.0)
    }

    pub fn key_size(&self) -> KeySizeInBits {
        KeySizeInBits(*self as u32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, N)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    RootOfTrustAlreadySet = -1,
    UnsupportedPurpose = -2,
    IncompatiblePurpose = -3,
    UnsupportedAlgorithm = -4,
    IncompatibleAlgorithm = -5,
    UnsupportedKeySize = -6,
    UnsupportedBlockMode = -7,
    IncompatibleBlockMode = -8,
    UnsupportedTagLength = -9,
    UnsupportedPaddingMode = -10,
    IncompatiblePaddingMode = -11,
    UnsupportedDigest = -12,
    IncompatibleDigest = -13,
    InvalidExpirationTime = -14,
    InvalidUserId = -15,
    InvalidAuthorizationTimeout = -16,
    UnsupportedKeyFormat = -17,
    IncompatibleKeyFormat = -18,
    UnsupportedKeyEncryptionAlgorithm = -19,
    UnsupportedKeyVerificationAlgorithm = -20,
    InvalidInputLength = -21,
    KeyExportOptionsInvalid = -22,
    DelegationNotAllowed = -23,
    KeyNotYetValid = -24,
    KeyExpired = -25,
    KeyUserNotAuthenticated = -26,
    OutputParameterNull = -27,
    InvalidOperationHandle = -28,
    InsufficientBufferSpace = -29,
    VerificationFailed = -30,
    TooManyOperations = -31,
    UnexpectedNullPointer = -32,
    InvalidKeyBlob = -33,
    ImportedKeyNotEncrypted = -34,
    ImportedKeyDecryptionFailed = -35,
    ImportedKeyNotSigned = -36,
    ImportedKeyVerificationFailed = -37,
    InvalidArgument = -38,
    UnsupportedTag = -39,
    InvalidTag = -40,
    MemoryAllocationFailed = -41,
    InvalidRescoping = -42,
    InvalidDsaParams = -43,
    ImportParameterMismatch = -44,
    SecureHwAccessDenied = -45,
    OperationCancelled = -46,
    ConcurrentAccessConflict = -47,
    SecureHwBusy = -48,
    SecureHwCommunicationFailed = -49,
    UnsupportedEcField = -50,
    Unimplemented = -100,
    VersionMismatch = -101,
    UnknownError = -1000,
}
try_from_n!(ErrorCode, i32);
