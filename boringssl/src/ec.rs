use crate::{openssl_err, ossl};
use alloc::boxed::Box;
use alloc::vec::Vec;
use kmr_common::{crypto, crypto::KeyMaterial, km_err, Error, FallibleAllocExt};
use kmr_wire::EcCurve;
use log::warn;
use openssl::nid::Nid;
use openssl::pkey::Private;

/// [`crypto::Ec`] implementation based on OpenSSL.
#[derive(Default)]
pub struct BoringEc;

impl crypto::Ec for BoringEc {
    fn generate_key(&self, curve: EcCurve) -> Result<KeyMaterial, Error> {
        let group = curve_to_group(curve)?;
        let ec_key = ossl!(openssl::ec::EcKey::<Private>::generate(group.as_ref()))?;
        Ok(KeyMaterial(ossl!(ec_key.private_key_to_der())?))
    }

    fn import_pkcs8_key(&self, data: &[u8]) -> Result<(KeyMaterial, EcCurve), Error> {
        let pkey = ossl!(openssl::pkey::PKey::private_key_from_pkcs8(data))?;
        if pkey.id() != openssl::pkey::Id::EC {
            return Err(km_err!(IncompatibleAlgorithm, "PKCS#8 key is {:?}, not EC", pkey.id()));
        }
        let ec_key = ossl!(pkey.ec_key())?;
        let curve = match ec_key.group().curve_name() {
            Some(Nid::X9_62_PRIME192V1) => EcCurve::P192,
            Some(Nid::SECP224R1) => EcCurve::P224,
            Some(Nid::X9_62_PRIME256V1) => EcCurve::P256,
            Some(Nid::SECP384R1) => EcCurve::P384,
            Some(Nid::SECP521R1) => EcCurve::P521,
            nid => return Err(km_err!(UnsupportedEcField, "unsupported curve {:?}", nid)),
        };
        Ok((KeyMaterial(ossl!(ec_key.private_key_to_der())?), curve))
    }

    fn subject_public_key_info(&self, key: &KeyMaterial) -> Result<Vec<u8>, Error> {
        let ec_key = load_key(key)?;
        let pkey = ossl!(openssl::pkey::PKey::from_ec_key(ec_key))?;
        ossl!(pkey.public_key_to_der())
    }

    fn begin_sign(
        &self,
        key: &KeyMaterial,
    ) -> Result<Box<dyn crypto::AccumulatingOperation>, Error> {
        let ec_key = load_key(key)?;
        Ok(Box::new(BoringEcUndigestSignOperation { ec_key, pending_input: Vec::new() }))
    }

    fn begin_verify(
        &self,
        key: &KeyMaterial,
    ) -> Result<Box<dyn crypto::VerifyingOperation>, Error> {
        let ec_key = load_key(key)?;
        Ok(Box::new(BoringEcUndigestVerifyOperation { ec_key, pending_input: Vec::new() }))
    }
}

fn load_key(key: &KeyMaterial) -> Result<openssl::ec::EcKey<Private>, Error> {
    openssl::ec::EcKey::private_key_from_der(&key.0)
        .map_err(|e| km_err!(InvalidKeyBlob, "failed to parse EC key material: {:?}", e))
}

/// [`crypto::AccumulatingOperation`] based on OpenSSL, for ECDSA signatures over undigested data.
pub struct BoringEcUndigestSignOperation {
    ec_key: openssl::ec::EcKey<Private>,
    pending_input: Vec<u8>,
}

impl crypto::AccumulatingOperation for BoringEcUndigestSignOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.pending_input.try_extend_from_slice(data)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, Error> {
        // Use low-level ECDSA functionality, which treats the input as an already-computed
        // digest and truncates it to the size of the group order.
        let sig = ossl!(openssl::ecdsa::EcdsaSig::sign(&self.pending_input, &self.ec_key))?;
        ossl!(sig.to_der())
    }
}

/// [`crypto::VerifyingOperation`] based on OpenSSL, for ECDSA signatures over undigested data.
pub struct BoringEcUndigestVerifyOperation {
    ec_key: openssl::ec::EcKey<Private>,
    pending_input: Vec<u8>,
}

impl crypto::VerifyingOperation for BoringEcUndigestVerifyOperation {
    fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        self.pending_input.try_extend_from_slice(data)?;
        Ok(())
    }

    fn finish(self: Box<Self>, signature: &[u8]) -> Result<(), Error> {
        let sig = openssl::ecdsa::EcdsaSig::from_der(signature).map_err(|e| {
            warn!("failed to parse ECDSA signature: {:?}", e);
            km_err!(VerificationFailed, "malformed ECDSA signature")
        })?;
        if ossl!(sig.verify(&self.pending_input, &self.ec_key))? {
            Ok(())
        } else {
            Err(km_err!(VerificationFailed, "ECDSA signature does not match data"))
        }
    }
}

fn curve_to_group(curve: EcCurve) -> Result<openssl::ec::EcGroup, Error> {
    openssl::ec::EcGroup::from_curve_name(match curve {
        EcCurve::P192 => Nid::X9_62_PRIME192V1,
        EcCurve::P224 => Nid::SECP224R1,
        EcCurve::P256 => Nid::X9_62_PRIME256V1,
        EcCurve::P384 => Nid::SECP384R1,
        EcCurve::P521 => Nid::SECP521R1,
    })
    .map_err(openssl_err!("failed to determine EcGroup for {:?}", curve))
}
