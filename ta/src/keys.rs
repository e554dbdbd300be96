//! Engine functionality related to key generation and import.

use crate::KeymasterTa;
use kmr_common::{
    crypto::{dsa, KeyMaterial},
    keyblob::{self, KeyBlob},
    km_err, tag, Error,
};
use kmr_wire::{
    authorization,
    legacy::{GenerateKeyResponse, ImportKeyResponse},
    tags, Algorithm, AuthorizationSet, EcCurve, ErrorCode, KeyFormat, KeyOrigin, KeySizeInBits,
    Param, RsaExponent, DEFAULT_RSA_EXPONENT,
};
use log::{debug, warn};

const RSA_DEFAULT_KEY_SIZE: KeySizeInBits = KeySizeInBits(2048);
const DSA_DEFAULT_KEY_SIZE: KeySizeInBits = KeySizeInBits(2048);
const EC_DEFAULT_KEY_SIZE: KeySizeInBits = KeySizeInBits(192);

/// Algorithms tried, in order, for an imported key whose description does not name one.
const IMPORT_CANDIDATES: &[Algorithm] = &[Algorithm::Rsa, Algorithm::Dsa, Algorithm::Ecdsa];

/// Return the key size from a key description, adding `default` to it if absent.
fn key_size_or_default(
    desc: &mut AuthorizationSet,
    default: KeySizeInBits,
) -> Result<KeySizeInBits, Error> {
    let existing = desc.get_tag_value(tags::KEY_SIZE);
    match existing {
        Some(size) => Ok(KeySizeInBits(size)),
        None => {
            tag::push_param(desc, authorization(tags::KEY_SIZE, default.0))?;
            Ok(default)
        }
    }
}

impl KeymasterTa {
    /// Generate a new key as described by `key_description`.
    pub fn generate_key(
        &self,
        key_description: &AuthorizationSet,
    ) -> Result<GenerateKeyResponse, Error> {
        let algorithm = tag::get_algorithm(key_description)?;
        let mut desc = key_description.clone();
        let key_material = match algorithm {
            Algorithm::Rsa => {
                let existing = desc.get_tag_value(tags::RSA_PUBLIC_EXPONENT);
                let exponent = match existing {
                    Some(e) => RsaExponent(e),
                    None => {
                        tag::push_param(
                            &mut desc,
                            authorization(tags::RSA_PUBLIC_EXPONENT, DEFAULT_RSA_EXPONENT.0),
                        )?;
                        DEFAULT_RSA_EXPONENT
                    }
                };
                let key_size = key_size_or_default(&mut desc, RSA_DEFAULT_KEY_SIZE)?;
                self.rsa.generate_key(key_size, exponent)?
            }
            Algorithm::Dsa => {
                let key_size = key_size_or_default(&mut desc, DSA_DEFAULT_KEY_SIZE)?;
                let params = dsa::Params::from_params(&desc)?;
                let (key_material, params) = self.dsa.generate_key(key_size, params.as_ref())?;
                params.check_or_add(&mut desc)?;
                key_material
            }
            Algorithm::Ecdsa => {
                let key_size = key_size_or_default(&mut desc, EC_DEFAULT_KEY_SIZE)?;
                let curve = EcCurve::from_key_size(key_size).ok_or_else(|| {
                    km_err!(UnsupportedKeySize, "no curve for {}-bit ECDSA key", key_size.0)
                })?;
                self.ec.generate_key(curve)?
            }
            _ => {
                return Err(km_err!(UnsupportedAlgorithm, "cannot generate {:?} keys", algorithm))
            }
        };
        self.finish_keyblob_creation(&desc, self.dev.policy.origin(), key_material)
    }

    /// Import a PKCS#8-encoded private key.  Parameters that can be derived from the key material
    /// are checked against the description, or added to it if absent.
    pub fn import_key(
        &self,
        key_description: &AuthorizationSet,
        key_format: KeyFormat,
        key_data: &[u8],
    ) -> Result<ImportKeyResponse, Error> {
        if key_format != KeyFormat::Pkcs8 {
            return Err(km_err!(UnsupportedKeyFormat, "cannot import {:?} keys", key_format));
        }
        let mut desc = key_description.clone();
        let algorithm = desc.get_tag_value(tags::ALGORITHM);
        let key_material = match algorithm {
            Some(algorithm) => {
                self.import_as(algorithm, &mut desc, key_data).map_err(|e| match e {
                    Error::Hal(ErrorCode::IncompatibleAlgorithm, msg) => {
                        Error::Hal(ErrorCode::ImportParameterMismatch, msg)
                    }
                    e => e,
                })?
            }
            None => self.import_any(&mut desc, key_data)?,
        };
        self.finish_keyblob_creation(&desc, KeyOrigin::Imported, key_material)
    }

    /// Import key material of unspecified type, trying each supported algorithm in turn.
    fn import_any(
        &self,
        desc: &mut AuthorizationSet,
        key_data: &[u8],
    ) -> Result<KeyMaterial, Error> {
        for algorithm in IMPORT_CANDIDATES {
            match self.import_as(*algorithm, desc, key_data) {
                Err(Error::Hal(ErrorCode::IncompatibleAlgorithm, msg)) => {
                    debug!("key is not {:?}: {}", algorithm, msg);
                }
                result => return result,
            }
        }
        Err(km_err!(UnsupportedAlgorithm, "PKCS#8 key of unsupported type"))
    }

    /// Import key material as a key of the given algorithm.
    fn import_as(
        &self,
        algorithm: Algorithm,
        desc: &mut AuthorizationSet,
        key_data: &[u8],
    ) -> Result<KeyMaterial, Error> {
        let key_material = match algorithm {
            Algorithm::Rsa => {
                let (key_material, key_size, exponent) = self.rsa.import_pkcs8_key(key_data)?;
                tag::check_or_add(desc, authorization(tags::RSA_PUBLIC_EXPONENT, exponent.0))?;
                tag::check_or_add(desc, authorization(tags::KEY_SIZE, key_size.0))?;
                key_material
            }
            Algorithm::Dsa => {
                let (key_material, params) = self.dsa.import_pkcs8_key(key_data)?;
                tag::check_or_add(desc, authorization(tags::KEY_SIZE, params.key_size().0))?;
                params.check_or_add(desc)?;
                key_material
            }
            Algorithm::Ecdsa => {
                let (key_material, curve) = self.ec.import_pkcs8_key(key_data)?;
                tag::check_or_add(desc, authorization(tags::KEY_SIZE, curve.key_size().0))?;
                key_material
            }
            _ => return Err(km_err!(UnsupportedAlgorithm, "cannot import {:?} keys", algorithm)),
        };
        tag::check_or_add(desc, authorization(tags::ALGORITHM, algorithm))?;
        Ok(key_material)
    }

    /// Build the key characteristics for a new key, and wrap them up with the key material into
    /// an authenticated key blob.
    fn finish_keyblob_creation(
        &self,
        desc: &AuthorizationSet,
        origin: KeyOrigin,
        key_material: KeyMaterial,
    ) -> Result<GenerateKeyResponse, Error> {
        let (enforced, unenforced) = self.set_authorizations(desc, origin)?;
        let hidden = keyblob::hidden(desc, self.dev.policy.root_of_trust())?;
        let root_kek = self.dev.keys.root_kek()?;
        let keyblob = KeyBlob { key_material, enforced, unenforced };
        let key_blob = {
            let mut rng = self.rng()?;
            keyblob.serialize(&*self.aes, &*self.hmac, &mut **rng, &root_kek, &hidden)?
        };
        let KeyBlob { enforced, unenforced, .. } = keyblob;
        Ok(GenerateKeyResponse { key_blob, enforced, unenforced })
    }

    /// Split a key description into enforced and unenforced characteristics, according to the
    /// device's policy, and add the engine-generated characteristics.
    pub(crate) fn set_authorizations(
        &self,
        desc: &AuthorizationSet,
        origin: KeyOrigin,
    ) -> Result<(AuthorizationSet, AuthorizationSet), Error> {
        let mut enforced = AuthorizationSet::new();
        let mut unenforced = AuthorizationSet::new();
        for param in desc.iter() {
            let tag = param.tag();
            if tag::AUTO_ADDED_CHARACTERISTICS.contains(&tag) {
                warn!("caller tried to specify {:?}", tag);
                return Err(km_err!(InvalidTag, "{:?} cannot be specified by the caller", tag));
            }
            if tag::UNSUPPORTED_TAGS.contains(&tag) {
                return Err(km_err!(UnsupportedTag, "{:?} not supported", tag));
            }
            if tag::HIDDEN_TAGS.contains(&tag) {
                continue;
            }
            self.add_authorization(&mut enforced, &mut unenforced, param)?;
        }

        let now = self.clock.now();
        self.add_authorization(
            &mut enforced,
            &mut unenforced,
            authorization(tags::CREATION_DATETIME, now.0),
        )?;
        self.add_authorization(
            &mut enforced,
            &mut unenforced,
            authorization(tags::ORIGIN, origin),
        )?;
        Ok((enforced, unenforced))
    }

    fn add_authorization(
        &self,
        enforced: &mut AuthorizationSet,
        unenforced: &mut AuthorizationSet,
        param: Param,
    ) -> Result<(), Error> {
        if self.dev.policy.is_enforced(param.tag()) {
            tag::push_param(enforced, param)
        } else {
            tag::push_param(unenforced, param)
        }
    }
}
