//! Keymaster request/response messages and their binary encodings.
//!
//! Each message is serialized as the concatenation of its fields, in declaration order:
//!
//! - `u32`/`u64`/enum fields as little-endian integers.
//! - `Vec<u8>` fields as a `u32` length followed by the bytes.
//! - [`AuthorizationSet`] fields in the format described in [`crate::authorization_set`].
//!
//! Responses are wrapped in an envelope holding a `u32` error code, followed by the response
//! payload only if the error code is `ErrorCode::Ok`.  The envelope is modelled as a
//! `Result<Payload, ErrorCode>`.
//!
//! When all requests arrive over a single channel, each request is preceded by a `u32` command
//! code identifying which request follows (see [`KeymasterOperation`]).

use crate::authorization_set::{AuthorizationSet, Status};
use crate::keymaster::{Algorithm, BlockMode, Digest, ErrorCode, KeyFormat, KeyPurpose, PaddingMode};
use crate::try_from_n;
use alloc::vec::Vec;
use enumn::N;
use kmr_derive::LegacySerialize;
use zeroize::ZeroizeOnDrop;

/// Commands come first in a request, encoded on a `u32`.
pub const CMD_SIZE: usize = 4;
/// Responses start with an error code encoded on a `u32`.
pub const ERROR_CODE_SIZE: usize = 4;

/// Errors encountered when [de-]serializing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    DataTruncated,
    ExcessData(usize),
    AllocationFailed,
    UnknownCommand(u32),
    InvalidEnumValue(u32),
    MalformedAuthorizationSet,
}

/// Trait that serializes a message (or message field) to/from its binary form.
pub trait InnerSerialize: Sized {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error>;
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error>;
}

impl InnerSerialize for u32 {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        if data.len() < 4 {
            return Err(Error::DataTruncated);
        }
        let int_data: [u8; 4] = data[..4].try_into().map_err(|_e| Error::DataTruncated)?;
        Ok((<u32>::from_le_bytes(int_data), &data[4..]))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(4).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl InnerSerialize for u64 {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        if data.len() < 8 {
            return Err(Error::DataTruncated);
        }
        let int_data: [u8; 8] = data[..8].try_into().map_err(|_e| Error::DataTruncated)?;
        Ok((<u64>::from_le_bytes(int_data), &data[8..]))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(8).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl InnerSerialize for u8 {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        if data.is_empty() {
            return Err(Error::DataTruncated);
        }
        Ok((data[0], &data[1..]))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(1).map_err(|_e| Error::AllocationFailed)?;
        buf.push(*self);
        Ok(())
    }
}

impl InnerSerialize for Vec<u8> {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (len, rest) = <u32>::deserialize(data)?;
        let len = len as usize;
        if rest.len() < len {
            return Err(Error::DataTruncated);
        }
        let mut buf = Vec::new();
        buf.try_reserve(len).map_err(|_e| Error::AllocationFailed)?;
        buf.extend_from_slice(&rest[..len]);
        Ok((buf, &rest[len..]))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.try_reserve(4 + self.len()).map_err(|_e| Error::AllocationFailed)?;
        let len = self.len() as u32;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl InnerSerialize for AuthorizationSet {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let mut set = AuthorizationSet::new();
        let mut rest = data;
        if !set.deserialize_from(&mut rest) {
            return Err(match set.is_valid() {
                Status::AllocationFailure => Error::AllocationFailed,
                _ => Error::MalformedAuthorizationSet,
            });
        }
        Ok((set, rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        AuthorizationSet::serialize_into(self, buf).map_err(|_e| Error::AllocationFailed)
    }
}

macro_rules! inner_serialize_enum {
    { $( $ename:ident ),* $(,)? } => {
        $(
            impl InnerSerialize for $ename {
                fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
                    let (v, rest) = <u32>::deserialize(data)?;
                    Ok((Self::try_from(v).map_err(|_e| Error::InvalidEnumValue(v))?, rest))
                }
                fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
                    (*self as u32).serialize_into(buf)
                }
            }
        )*
    };
}

inner_serialize_enum!(Algorithm, BlockMode, Digest, KeyFormat, KeyPurpose, PaddingMode);

impl InnerSerialize for ErrorCode {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (v, rest) = <u32>::deserialize(data)?;
        Ok((Self::try_from(v as i32).map_err(|_e| Error::InvalidEnumValue(v))?, rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        (*self as i32 as u32).serialize_into(buf)
    }
}

/// The response envelope: an error code, followed by the payload only on success.
impl<T: InnerSerialize> InnerSerialize for Result<T, ErrorCode> {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (code, rest) = <ErrorCode>::deserialize(data)?;
        if code != ErrorCode::Ok {
            return Ok((Err(code), rest));
        }
        let (rsp, rest) = <T>::deserialize(rest)?;
        Ok((Ok(rsp), rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        match self {
            Ok(rsp) => {
                ErrorCode::Ok.serialize_into(buf)?;
                rsp.serialize_into(buf)
            }
            // An error response must never carry the `Ok` code.
            Err(ErrorCode::Ok) => ErrorCode::UnknownError.serialize_into(buf),
            Err(code) => code.serialize_into(buf),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateKeyRequest {
    pub key_description: AuthorizationSet,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GenerateKeyResponse {
    pub key_blob: Vec<u8>,
    pub enforced: AuthorizationSet,
    pub unenforced: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GetKeyCharacteristicsRequest {
    pub key_blob: Vec<u8>,
    pub additional_params: AuthorizationSet,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct GetKeyCharacteristicsResponse {
    pub enforced: AuthorizationSet,
    pub unenforced: AuthorizationSet,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct BeginOperationRequest {
    pub purpose: KeyPurpose,
    pub key_blob: Vec<u8>,
    pub additional_params: AuthorizationSet,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct BeginOperationResponse {
    pub op_handle: u64,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct UpdateOperationRequest {
    pub op_handle: u64,
    pub input: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct UpdateOperationResponse {
    pub output: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct FinishOperationRequest {
    pub op_handle: u64,
    pub signature: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct FinishOperationResponse {
    pub output: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct AbortOperationRequest {
    pub op_handle: u64,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct AbortOperationResponse {}

#[derive(Clone, PartialEq, Eq, LegacySerialize, ZeroizeOnDrop)]
pub struct ImportKeyRequest {
    #[zeroize(skip)]
    pub key_description: AuthorizationSet,
    #[zeroize(skip)]
    pub key_format: KeyFormat,
    pub key_data: Vec<u8>,
}
pub type ImportKeyResponse = GenerateKeyResponse;

impl core::fmt::Debug for ImportKeyRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ImportKeyRequest")
            .field("key_description", &self.key_description)
            .field("key_format", &self.key_format)
            .field("key_data", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct ExportKeyRequest {
    pub additional_params: AuthorizationSet,
    pub key_format: KeyFormat,
    pub key_blob: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct ExportKeyResponse {
    pub key_data: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, LegacySerialize, ZeroizeOnDrop)]
pub struct AddEntropyRequest {
    pub random_data: Vec<u8>,
}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct AddEntropyResponse {}

impl core::fmt::Debug for AddEntropyRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddEntropyRequest").field("len", &self.random_data.len()).finish()
    }
}

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct RescopeRequest {
    pub key_blob: Vec<u8>,
    pub additional_params: AuthorizationSet,
    pub new_authorizations: AuthorizationSet,
}
pub type RescopeResponse = GenerateKeyResponse;

#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct SupportedAlgorithmsRequest {}
#[derive(Clone, PartialEq, Eq, Debug, LegacySerialize)]
pub struct SupportedByAlgorithmRequest {
    pub algorithm: Algorithm,
}

/// List of supported values, serialized as a `u32` count followed by the values.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SupportedResponse<T> {
    pub results: Vec<T>,
}

impl<T: InnerSerialize> InnerSerialize for SupportedResponse<T> {
    fn deserialize(data: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (count, mut rest) = <u32>::deserialize(data)?;
        let count = count as usize;
        // Each value occupies at least 4 bytes, which bounds the allocation.
        if count.checked_mul(4).map_or(true, |min| min > rest.len()) {
            return Err(Error::DataTruncated);
        }
        let mut results = Vec::new();
        results.try_reserve(count).map_err(|_e| Error::AllocationFailed)?;
        for _ in 0..count {
            let (value, remaining) = <T>::deserialize(rest)?;
            results.push(value);
            rest = remaining;
        }
        Ok((Self { results }, rest))
    }
    fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        (self.results.len() as u32).serialize_into(buf)?;
        for value in &self.results {
            value.serialize_into(buf)?;
        }
        Ok(())
    }
}

/// Identification of request/response messages.
pub trait KeymasterMessageId {
    type Code;
    fn code(&self) -> Self::Code;
}

macro_rules! declare_req_rsp_enums {
    {
        $cenum:ident => ($reqenum:ident, $rspenum:ident)
        {
            $( $cname:ident = $cvalue:literal => ($reqtyp:ty, $rsptyp:ty) , )*
        }
    } => {
        #[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, N)]
        #[repr(u32)]
        pub enum $cenum {
            $( $cname = $cvalue, )*
        }
        try_from_n!($cenum);
        #[derive(Debug, PartialEq, Eq)]
        pub enum $reqenum {
            $( $cname($reqtyp), )*
        }
        #[derive(Debug, PartialEq, Eq)]
        pub enum $rspenum {
            $( $cname($rsptyp), )*
        }
        impl KeymasterMessageId for $reqenum {
            type Code = $cenum;
            fn code(&self) -> $cenum {
                match self {
                    $( Self::$cname(_) => $cenum::$cname, )*
                }
            }
        }
        impl $reqenum {
            /// Decode a request from its command code and payload, which must be consumed
            /// entirely.
            pub fn from_code_and_data(cmd: u32, data: &[u8]) -> Result<Self, Error> {
                let (req, rest) = match cmd {
                    $(
                        $cvalue => {
                            let (req, rest) = <$reqtyp>::deserialize(data)?;
                            ($reqenum::$cname(req), rest)
                        }
                    )*
                    _ => return Err(Error::UnknownCommand(cmd)),
                };
                if !rest.is_empty() {
                    return Err(Error::ExcessData(rest.len()));
                }
                Ok(req)
            }

            /// Encode the request preceded by its command code.
            pub fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
                (self.code() as u32).serialize_into(buf)?;
                match self {
                    $( Self::$cname(req) => req.serialize_into(buf), )*
                }
            }
        }
        impl KeymasterMessageId for $rspenum {
            type Code = $cenum;
            fn code(&self) -> $cenum {
                match self {
                    $( Self::$cname(_) => $cenum::$cname, )*
                }
            }
        }
        impl $rspenum {
            /// Encode the response payload, without envelope.
            pub fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
                match self {
                    $( Self::$cname(rsp) => rsp.serialize_into(buf), )*
                }
            }

            /// Decode the payload of a response to the given command.
            pub fn from_code_and_data(code: $cenum, data: &[u8]) -> Result<(Self, &[u8]), Error> {
                match code {
                    $(
                        $cenum::$cname => {
                            let (rsp, rest) = <$rsptyp>::deserialize(data)?;
                            Ok(($rspenum::$cname(rsp), rest))
                        }
                    )*
                }
            }
        }
    };
}

// Keymaster requests, as:
// - an enum value with an explicit numeric command code
// - a request enum which has an operation code associated to each variant
// - a response enum which has the same operation code associated to each variant.
declare_req_rsp_enums! { KeymasterOperation => (PerformOpReq, PerformOpRsp) {
    GenerateKey = 0 =>                  (GenerateKeyRequest, GenerateKeyResponse),
    BeginOperation = 1 =>               (BeginOperationRequest, BeginOperationResponse),
    UpdateOperation = 2 =>              (UpdateOperationRequest, UpdateOperationResponse),
    FinishOperation = 3 =>              (FinishOperationRequest, FinishOperationResponse),
    AbortOperation = 4 =>               (AbortOperationRequest, AbortOperationResponse),
    ImportKey = 5 =>                    (ImportKeyRequest, ImportKeyResponse),
    ExportKey = 6 =>                    (ExportKeyRequest, ExportKeyResponse),
    GetKeyCharacteristics = 7 =>        (GetKeyCharacteristicsRequest, GetKeyCharacteristicsResponse),
    AddRngEntropy = 8 =>                (AddEntropyRequest, AddEntropyResponse),
    Rescope = 9 =>                      (RescopeRequest, RescopeResponse),
    SupportedAlgorithms = 10 =>         (SupportedAlgorithmsRequest, SupportedResponse<Algorithm>),
    SupportedBlockModes = 11 =>         (SupportedByAlgorithmRequest, SupportedResponse<BlockMode>),
    SupportedPaddingModes = 12 =>       (SupportedByAlgorithmRequest, SupportedResponse<PaddingMode>),
    SupportedDigests = 13 =>            (SupportedByAlgorithmRequest, SupportedResponse<Digest>),
    SupportedImportFormats = 14 =>      (SupportedByAlgorithmRequest, SupportedResponse<KeyFormat>),
    SupportedExportFormats = 15 =>      (SupportedByAlgorithmRequest, SupportedResponse<KeyFormat>),
} }

/// Deserialize a request message preceded by its command code.
pub fn deserialize_req(data: &[u8]) -> Result<PerformOpReq, Error> {
    let (cmd, data) = <u32>::deserialize(data)?;
    PerformOpReq::from_code_and_data(cmd, data)
}

/// Serialize a request message preceded by its command code.
pub fn serialize_req(req: &PerformOpReq) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    req.serialize_into(&mut buf)?;
    Ok(buf)
}

/// Serialize a response in its error-code envelope.
pub fn serialize_rsp(rsp: &Result<PerformOpRsp, ErrorCode>) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    buf.try_reserve(ERROR_CODE_SIZE).map_err(|_e| Error::AllocationFailed)?;
    match rsp {
        Ok(rsp) => {
            ErrorCode::Ok.serialize_into(&mut buf)?;
            rsp.serialize_into(&mut buf)?;
        }
        Err(ErrorCode::Ok) => ErrorCode::UnknownError.serialize_into(&mut buf)?,
        Err(code) => code.serialize_into(&mut buf)?,
    }
    Ok(buf)
}

/// Deserialize a response envelope for the given command.  A non-`Ok` error code is returned as
/// `Ok(Err(code))`, and nothing after it is read.
pub fn deserialize_rsp(
    code: KeymasterOperation,
    data: &[u8],
) -> Result<Result<PerformOpRsp, ErrorCode>, Error> {
    let (rc, rest) = <ErrorCode>::deserialize(data)?;
    if rc != ErrorCode::Ok {
        return Ok(Err(rc));
    }
    let (rsp, rest) = PerformOpRsp::from_code_and_data(code, rest)?;
    if !rest.is_empty() {
        return Err(Error::ExcessData(rest.len()));
    }
    Ok(Ok(rsp))
}
