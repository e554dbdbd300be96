//! Engine functionality related to in-progress crypto operations.

use crate::KeymasterTa;
use alloc::{boxed::Box, vec::Vec};
use kmr_common::{
    crypto::{AccumulatingOperation, Rng, VerifyingOperation},
    km_err, tag, Error,
};
use kmr_wire::{tags, Algorithm, AuthorizationSet, Digest, KeyPurpose, PaddingMode};
use log::{debug, warn};
use std::sync::{Mutex, MutexGuard};

/// Number of random values tried before giving up on finding an unused operation handle.
const MAX_HANDLE_ATTEMPTS: usize = 8;

/// Union holder for in-progress cryptographic operations, each of which is an instance
/// of the relevant trait.
pub(crate) enum CryptoOperation {
    Sign(Box<dyn AccumulatingOperation>),
    Verify(Box<dyn VerifyingOperation>),
}

/// Current state of an operation.
pub(crate) struct Operation {
    /// Random handle used to identify the operation.
    pub handle: OpHandle,

    pub crypto_op: CryptoOperation,

    /// Accumulated input size.
    pub input_size: usize,
}

impl Operation {
    /// Check whether `len` additional bytes of data can be accommodated by the `Operation`.
    fn check_size(&mut self, len: usize) -> Result<(), Error> {
        self.input_size = self.input_size.saturating_add(len);
        let max_size = match &self.crypto_op {
            CryptoOperation::Sign(op) => op.max_input_size(),
            CryptoOperation::Verify(_) => None,
        };
        if let Some(max_size) = max_size {
            if self.input_size > max_size {
                return Err(km_err!(
                    InvalidInputLength,
                    "too much input accumulated for operation ({} > {})",
                    self.input_size,
                    max_size
                ));
            }
        }
        Ok(())
    }
}

/// Newtype for operation handles.  Zero is never a valid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpHandle(pub u64);

/// Fixed-size table of in-progress operations.
pub(crate) struct OperationTable {
    slots: Mutex<Vec<Option<Operation>>>,
}

impl OperationTable {
    pub(crate) fn new(size: usize) -> Self {
        // `vec![None; n]` needs `Operation: Clone`.
        Self { slots: Mutex::new((0..size).map(|_| None).collect()) }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Option<Operation>>>, Error> {
        self.slots.lock().map_err(|_e| km_err!(UnknownError, "operation table lock poisoned"))
    }

    /// Number of operations currently in progress.
    pub(crate) fn live_count(&self) -> Result<usize, Error> {
        Ok(self.lock()?.iter().filter(|slot| slot.is_some()).count())
    }

    /// Store a new operation in a free slot, under a freshly allocated handle.
    pub(crate) fn insert(
        &self,
        rng: &mut dyn Rng,
        crypto_op: CryptoOperation,
    ) -> Result<OpHandle, Error> {
        let mut slots = self.lock()?;
        let op_idx = new_operation_index(&slots)?;
        let handle = new_op_handle(&slots, rng)?;
        slots[op_idx] = Some(Operation { handle, crypto_op, input_size: 0 });
        Ok(handle)
    }

    /// Execute the provided lambda over the identified [`Operation`], destroying the operation if
    /// the lambda fails.
    pub(crate) fn with_operation<F, T>(&self, op_handle: OpHandle, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Operation) -> Result<T, Error>,
    {
        let mut slots = self.lock()?;
        let op_idx = op_index(&slots, op_handle)?;
        let slot = &mut slots[op_idx];
        let result = match slot {
            Some(op) => f(op),
            None => Err(not_found(op_handle)),
        };
        if result.is_err() {
            // A failure destroys the operation.
            *slot = None;
        }
        result
    }

    /// Return the identified [`Operation`], removing it from the table.
    pub(crate) fn take(&self, op_handle: OpHandle) -> Result<Operation, Error> {
        let mut slots = self.lock()?;
        let op_idx = op_index(&slots, op_handle)?;
        slots[op_idx].take().ok_or_else(|| not_found(op_handle))
    }
}

fn not_found(op_handle: OpHandle) -> Error {
    km_err!(InvalidOperationHandle, "operation handle {:?} not found", op_handle)
}

/// Return the index of a free slot in the operations table.
fn new_operation_index(slots: &[Option<Operation>]) -> Result<usize, Error> {
    slots.iter().position(Option::is_none).ok_or_else(|| {
        km_err!(TooManyOperations, "current op count {} >= limit", slots.len())
    })
}

/// Return a new operation handle value that is neither zero nor currently in use in the
/// operations table.
fn new_op_handle(slots: &[Option<Operation>], rng: &mut dyn Rng) -> Result<OpHandle, Error> {
    for _ in 0..MAX_HANDLE_ATTEMPTS {
        let op_handle = OpHandle(rng.next_u64()?);
        if op_handle.0 != 0 && op_index(slots, op_handle).is_err() {
            return Ok(op_handle);
        }
        // Zero or already in use, go around again.
        warn!("discarding unusable operation handle {:?}", op_handle);
    }
    Err(km_err!(UnknownError, "failed to find an unused operation handle"))
}

/// Return the index into the operations table of an operation identified by `op_handle`.
fn op_index(slots: &[Option<Operation>], op_handle: OpHandle) -> Result<usize, Error> {
    if op_handle.0 == 0 {
        return Err(not_found(op_handle));
    }
    slots
        .iter()
        .position(|op| match op {
            Some(op) => op.handle == op_handle,
            None => false,
        })
        .ok_or_else(|| not_found(op_handle))
}

impl KeymasterTa {
    /// Start a signing or verification operation with the given key, returning the handle that
    /// identifies it in later calls.
    pub fn begin_operation(
        &self,
        purpose: KeyPurpose,
        key_blob: &[u8],
        additional_params: &AuthorizationSet,
    ) -> Result<OpHandle, Error> {
        let key = self.load_key(key_blob, additional_params)?;
        let (enforced, unenforced) = (&key.blob.enforced, &key.blob.unenforced);

        let digest = tag::get_characteristic(enforced, unenforced, tags::DIGEST);
        if digest != Some(Digest::None) {
            return Err(km_err!(UnsupportedDigest, "digest {:?} not supported", digest));
        }
        let padding = tag::get_characteristic(enforced, unenforced, tags::PADDING);
        if padding != Some(PaddingMode::None) {
            return Err(km_err!(UnsupportedPaddingMode, "padding {:?} not supported", padding));
        }

        let material = &key.blob.key_material;
        let crypto_op = match purpose {
            KeyPurpose::Sign => CryptoOperation::Sign(match key.algorithm {
                Algorithm::Rsa => self.rsa.begin_sign(material)?,
                Algorithm::Dsa => self.dsa.begin_sign(material)?,
                Algorithm::Ecdsa => self.ec.begin_sign(material)?,
                alg => return Err(km_err!(UnsupportedAlgorithm, "cannot sign with {:?} keys", alg)),
            }),
            KeyPurpose::Verify => CryptoOperation::Verify(match key.algorithm {
                Algorithm::Rsa => self.rsa.begin_verify(material)?,
                Algorithm::Dsa => self.dsa.begin_verify(material)?,
                Algorithm::Ecdsa => self.ec.begin_verify(material)?,
                alg => {
                    return Err(km_err!(UnsupportedAlgorithm, "cannot verify with {:?} keys", alg))
                }
            }),
            _ => return Err(km_err!(Unimplemented, "purpose {:?} not implemented", purpose)),
        };

        let mut rng = self.rng()?;
        let op_handle = self.operations.insert(&mut **rng, crypto_op)?;
        debug!(
            "began {:?} operation {:?} with {}-bit {:?} key",
            purpose, op_handle, key.key_size.0, key.algorithm
        );
        Ok(op_handle)
    }

    /// Feed more input into an operation.  No output is produced until the operation finishes.
    pub fn update_operation(&self, op_handle: OpHandle, input: &[u8]) -> Result<Vec<u8>, Error> {
        self.operations.with_operation(op_handle, |op| {
            op.check_size(input.len())?;
            match &mut op.crypto_op {
                CryptoOperation::Sign(op) => op.update(input)?,
                CryptoOperation::Verify(op) => op.update(input)?,
            }
            Ok(Vec::new())
        })
    }

    /// Complete an operation.  A signing operation returns the signature; a verification
    /// operation checks `signature` and returns no output.  The handle is consumed whatever
    /// the outcome.
    pub fn finish_operation(
        &self,
        op_handle: OpHandle,
        signature: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let op = self.operations.take(op_handle)?;
        match op.crypto_op {
            CryptoOperation::Sign(op) => op.finish(),
            CryptoOperation::Verify(op) => {
                op.finish(signature)?;
                Ok(Vec::new())
            }
        }
    }

    /// Abandon an operation.
    pub fn abort_operation(&self, op_handle: OpHandle) -> Result<(), Error> {
        let _op = self.operations.take(op_handle)?;
        Ok(())
    }
}
