//! Traits representing access to device-specific information and functionality.

use alloc::boxed::Box;
use kmr_common::{crypto, keyblob, Error};
use kmr_wire::{KeyOrigin, Tag};

/// Combined collection of trait implementations that must be provided.
pub struct Implementation {
    /// Policy deciding which key characteristics the device enforces.
    pub policy: Box<dyn SecurityPolicy>,

    /// Retrieval of the device's secret key material.
    pub keys: Box<dyn RetrieveKeyMaterial>,
}

/// Description of what the environment running the engine is able to guarantee about keys.
pub trait SecurityPolicy: Send + Sync {
    /// Indicate whether the device enforces the restriction expressed by `tag`.  Characteristics
    /// for tags that are not enforced are still recorded, but as unenforced.
    fn is_enforced(&self, tag: Tag) -> bool;

    /// Origin reported for keys generated on this device.
    fn origin(&self) -> KeyOrigin;

    /// Root of trust value bound into every key blob.
    fn root_of_trust(&self) -> &[u8];
}

/// Retrieval of secret key material held by the device.
pub trait RetrieveKeyMaterial: Send + Sync {
    /// Retrieve the root key from which each key blob's key encryption key is derived.
    fn root_kek(&self) -> Result<crypto::hmac::Key, Error>;
}

/// Policy for a pure software implementation, which enforces nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwarePolicy;

impl SecurityPolicy for SoftwarePolicy {
    fn is_enforced(&self, _tag: Tag) -> bool {
        false
    }

    fn origin(&self) -> KeyOrigin {
        KeyOrigin::Software
    }

    fn root_of_trust(&self) -> &[u8] {
        b"SW"
    }
}

/// Key material for a pure software implementation, which has nowhere secret to keep a root key.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareKeys;

impl RetrieveKeyMaterial for SoftwareKeys {
    fn root_kek(&self) -> Result<crypto::hmac::Key, Error> {
        crypto::hmac::Key::new_from(keyblob::SOFTWARE_ROOT_KEK)
    }
}

impl Default for Implementation {
    fn default() -> Self {
        Self { policy: Box::new(SoftwarePolicy), keys: Box::new(SoftwareKeys) }
    }
}
