//! Keymaster engine implementation: key generation and import, key blob handling, and the table
//! of in-progress signing/verification operations, behind a single serialized-request entry point.

extern crate alloc;

use alloc::{boxed::Box, vec::Vec};
use kmr_common::{
    crypto,
    keyblob::{self, KeyBlob},
    km_err, tag, vec_try, Error,
};
use kmr_wire::{
    legacy::{
        self, AbortOperationResponse, AddEntropyResponse, BeginOperationResponse,
        ExportKeyResponse, FinishOperationResponse, GetKeyCharacteristicsResponse,
        KeymasterOperation, PerformOpReq, PerformOpRsp, RescopeResponse, SupportedResponse,
        UpdateOperationResponse,
    },
    tags, Algorithm, AuthorizationSet, BlockMode, Digest, ErrorCode, KeyFormat, KeySizeInBits,
    PaddingMode,
};
use log::{debug, error};
use std::sync::{Mutex, MutexGuard};

pub mod device;
mod keys;
mod operation;

pub use operation::OpHandle;


/// Number of operations that may be in progress at once, unless configured otherwise.
pub const DEFAULT_OPERATION_TABLE_SIZE: usize = 16;

/// Engine configuration, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of operations that may be in progress at once.
    pub operation_table_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { operation_table_size: DEFAULT_OPERATION_TABLE_SIZE }
    }
}

/// Keymaster device implementation.  All methods take `&self`, so a single instance can be
/// shared between threads.
pub struct KeymasterTa {
    /// Random number generator, used for key blob nonces and operation handles.
    rng: Mutex<Box<dyn crypto::Rng>>,

    /// Trait objects that hold this device's implementations of the abstract cryptographic
    /// functionality traits.
    clock: Box<dyn crypto::WallClock>,
    aes: Box<dyn crypto::Aes>,
    hmac: Box<dyn crypto::Hmac>,
    rsa: Box<dyn crypto::Rsa>,
    dsa: Box<dyn crypto::Dsa>,
    ec: Box<dyn crypto::Ec>,

    /// Trait objects that hold this device's implementations of per-device functionality.
    dev: device::Implementation,

    /// The operation table.
    operations: operation::OperationTable,
}

/// A key blob that has passed integrity checks, together with the properties needed to use it.
pub(crate) struct LoadedKey {
    pub algorithm: Algorithm,
    pub key_size: KeySizeInBits,
    pub blob: KeyBlob,
}

impl KeymasterTa {
    /// Create a new [`KeymasterTa`] instance.
    pub fn new(config: Config, imp: crypto::Implementation, dev: device::Implementation) -> Self {
        let crypto::Implementation { rng, clock, aes, hmac, rsa, dsa, ec } = imp;
        Self {
            rng: Mutex::new(rng),
            clock,
            aes,
            hmac,
            rsa,
            dsa,
            ec,
            dev,
            operations: operation::OperationTable::new(config.operation_table_size),
        }
    }

    fn rng(&self) -> Result<MutexGuard<'_, Box<dyn crypto::Rng>>, Error> {
        self.rng.lock().map_err(|_e| km_err!(UnknownError, "RNG lock poisoned"))
    }

    /// Number of operations currently in progress.
    pub fn live_operations(&self) -> Result<usize, Error> {
        self.operations.live_count()
    }

    /// Process a single serialized request, returning a serialized response.
    pub fn process(&self, req_data: &[u8]) -> Vec<u8> {
        let rsp = match legacy::deserialize_req(req_data) {
            Ok(req) => {
                debug!("-> TA: received request {:?}", req);
                self.process_req(req)
            }
            Err(e) => {
                error!("failed to decode request: {:?}", e);
                Err(ErrorCode::UnknownError)
            }
        };
        debug!("<- TA: send response {:?}", rsp);
        match legacy::serialize_rsp(&rsp) {
            Ok(rsp_data) => rsp_data,
            Err(e) => {
                error!("failed to encode response: {:?}", e);
                invalid_rsp_data().to_vec()
            }
        }
    }

    /// Process a single request, returning the response or the error code that replaces it.
    ///
    /// Select the appropriate method based on the request type, and use the
    /// request fields as parameters to the method.  In the opposite direction,
    /// build a response message from the values returned by the method.
    fn process_req(&self, req: PerformOpReq) -> Result<PerformOpRsp, ErrorCode> {
        match req {
            PerformOpReq::GenerateKey(req) => match self.generate_key(&req.key_description) {
                Ok(ret) => Ok(PerformOpRsp::GenerateKey(ret)),
                Err(e) => op_error_rsp(KeymasterOperation::GenerateKey, e),
            },
            PerformOpReq::BeginOperation(req) => {
                match self.begin_operation(req.purpose, &req.key_blob, &req.additional_params) {
                    Ok(op_handle) => Ok(PerformOpRsp::BeginOperation(BeginOperationResponse {
                        op_handle: op_handle.0,
                    })),
                    Err(e) => op_error_rsp(KeymasterOperation::BeginOperation, e),
                }
            }
            PerformOpReq::UpdateOperation(req) => {
                match self.update_operation(OpHandle(req.op_handle), &req.input) {
                    Ok(output) => {
                        Ok(PerformOpRsp::UpdateOperation(UpdateOperationResponse { output }))
                    }
                    Err(e) => op_error_rsp(KeymasterOperation::UpdateOperation, e),
                }
            }
            PerformOpReq::FinishOperation(req) => {
                match self.finish_operation(OpHandle(req.op_handle), &req.signature) {
                    Ok(output) => {
                        Ok(PerformOpRsp::FinishOperation(FinishOperationResponse { output }))
                    }
                    Err(e) => op_error_rsp(KeymasterOperation::FinishOperation, e),
                }
            }
            PerformOpReq::AbortOperation(req) => {
                match self.abort_operation(OpHandle(req.op_handle)) {
                    Ok(()) => Ok(PerformOpRsp::AbortOperation(AbortOperationResponse {})),
                    Err(e) => op_error_rsp(KeymasterOperation::AbortOperation, e),
                }
            }
            PerformOpReq::ImportKey(req) => {
                match self.import_key(&req.key_description, req.key_format, &req.key_data) {
                    Ok(ret) => Ok(PerformOpRsp::ImportKey(ret)),
                    Err(e) => op_error_rsp(KeymasterOperation::ImportKey, e),
                }
            }
            PerformOpReq::ExportKey(req) => {
                match self.export_key(req.key_format, &req.key_blob, &req.additional_params) {
                    Ok(key_data) => Ok(PerformOpRsp::ExportKey(ExportKeyResponse { key_data })),
                    Err(e) => op_error_rsp(KeymasterOperation::ExportKey, e),
                }
            }
            PerformOpReq::GetKeyCharacteristics(req) => {
                match self.get_key_characteristics(&req.key_blob, &req.additional_params) {
                    Ok(ret) => Ok(PerformOpRsp::GetKeyCharacteristics(ret)),
                    Err(e) => op_error_rsp(KeymasterOperation::GetKeyCharacteristics, e),
                }
            }
            PerformOpReq::AddRngEntropy(req) => match self.add_rng_entropy(&req.random_data) {
                Ok(()) => Ok(PerformOpRsp::AddRngEntropy(AddEntropyResponse {})),
                Err(e) => op_error_rsp(KeymasterOperation::AddRngEntropy, e),
            },
            PerformOpReq::Rescope(req) => match self.rescope(
                &req.key_blob,
                &req.additional_params,
                &req.new_authorizations,
            ) {
                Ok(ret) => Ok(PerformOpRsp::Rescope(ret)),
                Err(e) => op_error_rsp(KeymasterOperation::Rescope, e),
            },
            PerformOpReq::SupportedAlgorithms(_req) => match self.supported_algorithms() {
                Ok(results) => Ok(PerformOpRsp::SupportedAlgorithms(SupportedResponse { results })),
                Err(e) => op_error_rsp(KeymasterOperation::SupportedAlgorithms, e),
            },
            PerformOpReq::SupportedBlockModes(req) => {
                match self.supported_block_modes(req.algorithm) {
                    Ok(results) => {
                        Ok(PerformOpRsp::SupportedBlockModes(SupportedResponse { results }))
                    }
                    Err(e) => op_error_rsp(KeymasterOperation::SupportedBlockModes, e),
                }
            }
            PerformOpReq::SupportedPaddingModes(req) => {
                match self.supported_padding_modes(req.algorithm) {
                    Ok(results) => {
                        Ok(PerformOpRsp::SupportedPaddingModes(SupportedResponse { results }))
                    }
                    Err(e) => op_error_rsp(KeymasterOperation::SupportedPaddingModes, e),
                }
            }
            PerformOpReq::SupportedDigests(req) => match self.supported_digests(req.algorithm) {
                Ok(results) => Ok(PerformOpRsp::SupportedDigests(SupportedResponse { results })),
                Err(e) => op_error_rsp(KeymasterOperation::SupportedDigests, e),
            },
            PerformOpReq::SupportedImportFormats(req) => {
                match self.supported_import_formats(req.algorithm) {
                    Ok(results) => {
                        Ok(PerformOpRsp::SupportedImportFormats(SupportedResponse { results }))
                    }
                    Err(e) => op_error_rsp(KeymasterOperation::SupportedImportFormats, e),
                }
            }
            PerformOpReq::SupportedExportFormats(req) => {
                match self.supported_export_formats(req.algorithm) {
                    Ok(results) => {
                        Ok(PerformOpRsp::SupportedExportFormats(SupportedResponse { results }))
                    }
                    Err(e) => op_error_rsp(KeymasterOperation::SupportedExportFormats, e),
                }
            }
        }
    }

    pub fn supported_algorithms(&self) -> Result<Vec<Algorithm>, Error> {
        vec_try![Algorithm::Rsa, Algorithm::Dsa, Algorithm::Ecdsa]
    }

    pub fn supported_block_modes(&self, algorithm: Algorithm) -> Result<Vec<BlockMode>, Error> {
        check_supported(algorithm)?;
        Ok(Vec::new())
    }

    pub fn supported_padding_modes(
        &self,
        algorithm: Algorithm,
    ) -> Result<Vec<PaddingMode>, Error> {
        check_supported(algorithm)?;
        vec_try![PaddingMode::None]
    }

    pub fn supported_digests(&self, algorithm: Algorithm) -> Result<Vec<Digest>, Error> {
        check_supported(algorithm)?;
        vec_try![Digest::None]
    }

    pub fn supported_import_formats(&self, algorithm: Algorithm) -> Result<Vec<KeyFormat>, Error> {
        check_supported(algorithm)?;
        vec_try![KeyFormat::Pkcs8]
    }

    pub fn supported_export_formats(&self, algorithm: Algorithm) -> Result<Vec<KeyFormat>, Error> {
        check_supported(algorithm)?;
        vec_try![KeyFormat::X509]
    }

    pub fn add_rng_entropy(&self, _data: &[u8]) -> Result<(), Error> {
        Err(km_err!(Unimplemented, "adding RNG entropy not supported"))
    }

    pub fn rescope(
        &self,
        _key_blob: &[u8],
        _additional_params: &AuthorizationSet,
        _new_authorizations: &AuthorizationSet,
    ) -> Result<RescopeResponse, Error> {
        Err(km_err!(Unimplemented, "rescoping not supported"))
    }

    /// Return the characteristics stored in a key blob.
    pub fn get_key_characteristics(
        &self,
        key_blob: &[u8],
        additional_params: &AuthorizationSet,
    ) -> Result<GetKeyCharacteristicsResponse, Error> {
        let KeyBlob { enforced, unenforced, .. } =
            self.load_key_blob(key_blob, additional_params)?;
        Ok(GetKeyCharacteristicsResponse { enforced, unenforced })
    }

    /// Export the public part of a key, as a DER-encoded X.509 `SubjectPublicKeyInfo`.
    pub fn export_key(
        &self,
        key_format: KeyFormat,
        key_blob: &[u8],
        additional_params: &AuthorizationSet,
    ) -> Result<Vec<u8>, Error> {
        let key = self.load_key(key_blob, additional_params)?;
        if key_format != KeyFormat::X509 {
            return Err(km_err!(UnsupportedKeyFormat, "cannot export in {:?} format", key_format));
        }
        let material = &key.blob.key_material;
        match key.algorithm {
            Algorithm::Rsa => self.rsa.subject_public_key_info(material),
            Algorithm::Dsa => self.dsa.subject_public_key_info(material),
            Algorithm::Ecdsa => self.ec.subject_public_key_info(material),
            alg => Err(km_err!(UnsupportedAlgorithm, "cannot export {:?} keys", alg)),
        }
    }

    /// Parse a key blob and decrypt its key material, using the hidden parameters derived from
    /// `params`.
    fn load_key_blob(&self, key_blob: &[u8], params: &AuthorizationSet) -> Result<KeyBlob, Error> {
        let hidden = keyblob::hidden(params, self.dev.policy.root_of_trust())?;
        let root_kek = self.dev.keys.root_kek()?;
        KeyBlob::deserialize(&*self.aes, &*self.hmac, &root_kek, key_blob, &hidden)
    }

    /// Load a key blob, and find the algorithm and size of the key it holds.
    pub(crate) fn load_key(
        &self,
        key_blob: &[u8],
        params: &AuthorizationSet,
    ) -> Result<LoadedKey, Error> {
        let blob = self.load_key_blob(key_blob, params)?;
        let algorithm = tag::get_characteristic(&blob.enforced, &blob.unenforced, tags::ALGORITHM)
            .ok_or_else(|| km_err!(UnsupportedAlgorithm, "key blob has no algorithm"))?;
        let key_size = tag::get_characteristic(&blob.enforced, &blob.unenforced, tags::KEY_SIZE)
            .map(KeySizeInBits)
            .ok_or_else(|| km_err!(UnsupportedKeySize, "key blob has no key size"))?;
        Ok(LoadedKey { algorithm, key_size, blob })
    }
}

/// Check that an algorithm is one that the engine handles.
fn check_supported(algorithm: Algorithm) -> Result<(), Error> {
    match algorithm {
        Algorithm::Rsa | Algorithm::Dsa | Algorithm::Ecdsa => Ok(()),
        _ => Err(km_err!(UnsupportedAlgorithm, "algorithm {:?} not supported", algorithm)),
    }
}

/// Log the failure of a request, returning the error code that replaces its response.
fn op_error_rsp(op: KeymasterOperation, err: Error) -> Result<PerformOpRsp, ErrorCode> {
    error!("failing {:?} request with error {:?}", op, err);
    Err(err.into())
}

/// Hand-encoded response envelope for [`ErrorCode::UnknownError`], for use when response
/// encoding itself fails.
fn invalid_rsp_data() -> [u8; 4] {
    // -1000 as a little-endian i32
    [0x18, 0xfc, 0xff, 0xff]
}
