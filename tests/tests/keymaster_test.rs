// Integration test.

// Explicitly include alloc because macros from `kmr_common` assume it.
extern crate alloc;

use kmr_common::{expect_err, Error};
use kmr_crypto_boring::implementation;
use kmr_ta::{device, Config, KeymasterTa, OpHandle};
use kmr_tests::setup_logging;
use kmr_wire::{
    authorization, legacy, legacy::KeymasterOperation, tags, Algorithm, AuthorizationSet, Digest,
    ErrorCode, KeyFormat, KeyOrigin, KeyPurpose, PaddingMode, Param, Tag,
};
use openssl::{ec::EcGroup, nid::Nid, pkey::PKey};
use std::sync::Arc;

fn engine() -> KeymasterTa {
    setup_logging();
    KeymasterTa::new(Config::default(), implementation(), device::Implementation::default())
}

fn code_of<T: core::fmt::Debug>(result: Result<T, Error>) -> ErrorCode {
    match result {
        Err(Error::Hal(code, _)) => code,
        other => panic!("unexpected result {:?}", other),
    }
}

fn unpadded_undigested() -> [Param<'static>; 4] {
    [
        authorization(tags::PURPOSE, KeyPurpose::Sign),
        authorization(tags::PURPOSE, KeyPurpose::Verify),
        authorization(tags::DIGEST, Digest::None),
        authorization(tags::PADDING, PaddingMode::None),
    ]
}

fn rsa_pkcs8(bits: u32) -> Vec<u8> {
    let rsa = openssl::rsa::Rsa::generate(bits).unwrap();
    PKey::from_rsa(rsa).unwrap().private_key_to_pkcs8().unwrap()
}

fn dsa_pkcs8() -> Vec<u8> {
    let dsa = openssl::dsa::Dsa::generate(1024).unwrap();
    PKey::from_dsa(dsa).unwrap().private_key_to_pkcs8().unwrap()
}

fn ec_pkcs8() -> Vec<u8> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let ec_key = openssl::ec::EcKey::generate(&group).unwrap();
    PKey::from_ec_key(ec_key).unwrap().private_key_to_pkcs8().unwrap()
}

/// Import a fresh P-256 key that can be used for signing and verification.
fn import_ec(ta: &KeymasterTa, key_data: &[u8]) -> Vec<u8> {
    let desc = AuthorizationSet::from_params(&unpadded_undigested());
    ta.import_key(&desc, KeyFormat::Pkcs8, key_data).unwrap().key_blob
}

/// Sign `data` with the key, and check the signature both ways through the engine.
fn sign_and_verify(ta: &KeymasterTa, key_blob: &[u8], params: &AuthorizationSet, data: &[u8]) {
    let op = ta.begin_operation(KeyPurpose::Sign, key_blob, params).unwrap();
    assert!(ta.update_operation(op, data).unwrap().is_empty());
    let signature = ta.finish_operation(op, &[]).unwrap();
    assert!(!signature.is_empty());

    let op = ta.begin_operation(KeyPurpose::Verify, key_blob, params).unwrap();
    ta.update_operation(op, data).unwrap();
    assert!(ta.finish_operation(op, &signature).unwrap().is_empty());

    let mut bad_signature = signature.clone();
    let last = bad_signature.len() - 1;
    bad_signature[last] ^= 0x01;
    let op = ta.begin_operation(KeyPurpose::Verify, key_blob, params).unwrap();
    ta.update_operation(op, data).unwrap();
    let result = ta.finish_operation(op, &bad_signature);
    assert_eq!(code_of(result), ErrorCode::VerificationFailed);
}

#[test]
fn test_import_detects_key_type() {
    let ta = engine();
    let none = AuthorizationSet::new();
    let tests = [
        (rsa_pkcs8(1024), Algorithm::Rsa, 1024),
        (dsa_pkcs8(), Algorithm::Dsa, 1024),
        (ec_pkcs8(), Algorithm::Ecdsa, 256),
    ];
    for (key_data, want_alg, want_size) in tests {
        let desc = AuthorizationSet::from_params(&unpadded_undigested());
        let rsp = ta.import_key(&desc, KeyFormat::Pkcs8, &key_data).unwrap();
        assert!(rsp.enforced.is_empty());
        let unenforced = &rsp.unenforced;
        assert_eq!(unenforced.get_tag_value(tags::ALGORITHM), Some(want_alg));
        assert_eq!(unenforced.get_tag_value(tags::KEY_SIZE), Some(want_size));
        assert_eq!(unenforced.get_tag_value(tags::ORIGIN), Some(KeyOrigin::Imported));
        assert!(unenforced.contains_tag(Tag::CreationDatetime));

        let chars = ta.get_key_characteristics(&rsp.key_blob, &none).unwrap();
        assert_eq!(chars.unenforced, rsp.unenforced);

        if want_alg == Algorithm::Rsa {
            assert_eq!(unenforced.get_tag_value(tags::RSA_PUBLIC_EXPONENT), Some(65537));
            // Raw RSA signs exactly one modulus worth of data.
            let mut data = vec![0x5a; 128];
            data[0] = 0;
            sign_and_verify(&ta, &rsp.key_blob, &none, &data);
        } else {
            sign_and_verify(&ta, &rsp.key_blob, &none, b"some data to be signed");
        }
    }
}

#[test]
fn test_import_with_algorithm() {
    let ta = engine();
    let mut params = unpadded_undigested().to_vec();
    params.push(authorization(tags::ALGORITHM, Algorithm::Ecdsa));
    params.push(authorization(tags::KEY_SIZE, 256));
    let desc = AuthorizationSet::from_params(&params);
    let rsp = ta.import_key(&desc, KeyFormat::Pkcs8, &ec_pkcs8()).unwrap();
    assert_eq!(rsp.unenforced.get_tag_value(tags::ALGORITHM), Some(Algorithm::Ecdsa));
    // Values already in the description are not duplicated.
    assert_eq!(rsp.unenforced.iter().filter(|p| p.tag() == Tag::KeySize).count(), 1);
}

#[test]
fn test_import_mismatch() {
    let ta = engine();
    let rsa_key = rsa_pkcs8(1024);
    let tests = [
        (vec![authorization(tags::ALGORITHM, Algorithm::Ecdsa)], rsa_key.clone()),
        (vec![authorization(tags::ALGORITHM, Algorithm::Dsa)], ec_pkcs8()),
        (vec![authorization(tags::KEY_SIZE, 2048)], rsa_key.clone()),
        (vec![authorization(tags::RSA_PUBLIC_EXPONENT, 3)], rsa_key.clone()),
        (vec![authorization(tags::KEY_SIZE, 384)], ec_pkcs8()),
    ];
    for (params, key_data) in tests {
        let desc = AuthorizationSet::from_params(&params);
        let result = ta.import_key(&desc, KeyFormat::Pkcs8, &key_data);
        assert_eq!(code_of(result), ErrorCode::ImportParameterMismatch, "for {:?}", desc);
    }

    let desc = AuthorizationSet::new();
    let result = ta.import_key(&desc, KeyFormat::X509, &rsa_key);
    assert_eq!(code_of(result), ErrorCode::UnsupportedKeyFormat);
    let result = ta.import_key(&desc, KeyFormat::Pkcs8, b"not a PKCS#8 key");
    assert_eq!(code_of(result), ErrorCode::UnknownError);
}

#[test]
fn test_export_matches_imported_key() {
    let ta = engine();
    let none = AuthorizationSet::new();
    for key_data in [rsa_pkcs8(1024), dsa_pkcs8(), ec_pkcs8()] {
        let rsp = ta.import_key(&none, KeyFormat::Pkcs8, &key_data).unwrap();
        let exported = ta.export_key(KeyFormat::X509, &rsp.key_blob, &none).unwrap();

        let original = PKey::private_key_from_pkcs8(&key_data).unwrap();
        let public = PKey::public_key_from_der(&exported).unwrap();
        assert_eq!(public.id(), original.id());
        assert!(public.public_eq(&original));

        let result = ta.export_key(KeyFormat::Pkcs8, &rsp.key_blob, &none);
        assert_eq!(code_of(result), ErrorCode::UnsupportedKeyFormat);
    }
}

#[test]
fn test_generate_rsa() {
    let ta = engine();
    let mut params = unpadded_undigested().to_vec();
    params.push(authorization(tags::ALGORITHM, Algorithm::Rsa));
    params.push(authorization(tags::KEY_SIZE, 512));
    params.push(authorization(tags::APPLICATION_ID, &b"client"[..]));
    let desc = AuthorizationSet::from_params(&params);
    let rsp = ta.generate_key(&desc).unwrap();

    assert!(rsp.enforced.is_empty());
    let unenforced = &rsp.unenforced;
    assert_eq!(unenforced.get_tag_value(tags::ALGORITHM), Some(Algorithm::Rsa));
    assert_eq!(unenforced.get_tag_value(tags::KEY_SIZE), Some(512));
    // The default public exponent is recorded.
    assert_eq!(unenforced.get_tag_value(tags::RSA_PUBLIC_EXPONENT), Some(65537));
    assert_eq!(unenforced.get_tag_value(tags::ORIGIN), Some(KeyOrigin::Software));
    assert!(unenforced.contains_tag(Tag::CreationDatetime));
    assert!(!unenforced.contains_tag(Tag::ApplicationId));

    let app_id = AuthorizationSet::from_params(&[params[6]]);
    let chars = ta.get_key_characteristics(&rsp.key_blob, &app_id).unwrap();
    assert_eq!(chars.unenforced, rsp.unenforced);

    let mut data = vec![0x5a; 64];
    data[0] = 0;
    sign_and_verify(&ta, &rsp.key_blob, &app_id, &data);

    let exported = ta.export_key(KeyFormat::X509, &rsp.key_blob, &app_id).unwrap();
    let rsa = PKey::public_key_from_der(&exported).unwrap().rsa().unwrap();
    assert_eq!(rsa.n().num_bits(), 512);
    assert_eq!(rsa.e().to_vec(), vec![0x01, 0x00, 0x01]);
}

#[test]
fn test_generate_dsa() {
    let ta = engine();
    let none = AuthorizationSet::new();
    let mut params = unpadded_undigested().to_vec();
    params.push(authorization(tags::ALGORITHM, Algorithm::Dsa));
    params.push(authorization(tags::KEY_SIZE, 1024));
    let rsp = ta.generate_key(&AuthorizationSet::from_params(&params)).unwrap();

    assert!(rsp.enforced.is_empty());
    let unenforced = &rsp.unenforced;
    assert_eq!(unenforced.get_tag_value(tags::ALGORITHM), Some(Algorithm::Dsa));
    assert_eq!(unenforced.get_tag_value(tags::ORIGIN), Some(KeyOrigin::Software));
    let p = unenforced.get_tag_value(tags::DSA_P).unwrap().to_vec();
    let q = unenforced.get_tag_value(tags::DSA_Q).unwrap().to_vec();
    let g = unenforced.get_tag_value(tags::DSA_GENERATOR).unwrap().to_vec();
    assert_eq!(p.len(), 128);
    sign_and_verify(&ta, &rsp.key_blob, &none, b"some data to be signed");

    // A second key generated in the same domain keeps the supplied parameters.
    params.push(authorization(tags::DSA_P, &p[..]));
    params.push(authorization(tags::DSA_Q, &q[..]));
    params.push(authorization(tags::DSA_GENERATOR, &g[..]));
    let rsp2 = ta.generate_key(&AuthorizationSet::from_params(&params)).unwrap();
    let unenforced2 = &rsp2.unenforced;
    assert_eq!(unenforced2.get_tag_value(tags::DSA_P), Some(&p[..]));
    assert_eq!(unenforced2.iter().filter(|param| param.tag() == Tag::DsaP).count(), 1);
    sign_and_verify(&ta, &rsp2.key_blob, &none, b"some data to be signed");

    let exported = ta.export_key(KeyFormat::X509, &rsp2.key_blob, &none).unwrap();
    let dsa = PKey::public_key_from_der(&exported).unwrap().dsa().unwrap();
    assert_eq!(dsa.p().to_vec(), p);
}

#[test]
fn test_ec_signature_verifies_externally() {
    let ta = engine();
    let none = AuthorizationSet::new();
    let key_data = ec_pkcs8();
    let key_blob = import_ec(&ta, &key_data);

    let data = b"thirty-two bytes of data to sign";
    let op = ta.begin_operation(KeyPurpose::Sign, &key_blob, &none).unwrap();
    ta.update_operation(op, &data[..10]).unwrap();
    ta.update_operation(op, &data[10..]).unwrap();
    let signature = ta.finish_operation(op, &[]).unwrap();

    let ec_key = PKey::private_key_from_pkcs8(&key_data).unwrap().ec_key().unwrap();
    let sig = openssl::ecdsa::EcdsaSig::from_der(&signature).unwrap();
    assert!(sig.verify(data, &ec_key).unwrap());
}

#[test]
fn test_application_id_binding() {
    let ta = engine();
    let mut params = unpadded_undigested().to_vec();
    params.push(authorization(tags::APPLICATION_ID, &b"client"[..]));
    let desc = AuthorizationSet::from_params(&params);
    let rsp = ta.import_key(&desc, KeyFormat::Pkcs8, &ec_pkcs8()).unwrap();
    assert!(!rsp.unenforced.contains_tag(Tag::ApplicationId));

    let right = AuthorizationSet::from_params(&[params[4]]);
    let wrong =
        AuthorizationSet::from_params(&[authorization(tags::APPLICATION_ID, &b"other"[..])]);
    let none = AuthorizationSet::new();

    assert!(ta.get_key_characteristics(&rsp.key_blob, &right).is_ok());
    for other in [&wrong, &none] {
        let result = ta.get_key_characteristics(&rsp.key_blob, other);
        assert_eq!(code_of(result), ErrorCode::InvalidKeyBlob);
        let result = ta.export_key(KeyFormat::X509, &rsp.key_blob, other);
        assert_eq!(code_of(result), ErrorCode::InvalidKeyBlob);
        let result = ta.begin_operation(KeyPurpose::Sign, &rsp.key_blob, other);
        assert_eq!(code_of(result), ErrorCode::InvalidKeyBlob);
    }
    sign_and_verify(&ta, &rsp.key_blob, &right, b"data");
}

#[test]
fn test_corrupted_key_blob() {
    let ta = engine();
    let none = AuthorizationSet::new();
    let rsp = ta.import_key(&none, KeyFormat::Pkcs8, &ec_pkcs8()).unwrap();
    let mut key_blob = rsp.key_blob.clone();
    key_blob[7] ^= 0x80;
    let result = ta.get_key_characteristics(&key_blob, &none);
    expect_err!(result, "invalid key blob");
    let result = ta.get_key_characteristics(&rsp.key_blob[..20], &none);
    assert_eq!(code_of(result), ErrorCode::InvalidKeyBlob);
}

/// Send a request through the message interface, and decode the response.
fn call(ta: &KeymasterTa, req: legacy::PerformOpReq) -> Result<legacy::PerformOpRsp, ErrorCode> {
    let code = legacy::KeymasterMessageId::code(&req);
    let rsp_data = ta.process(&legacy::serialize_req(&req).unwrap());
    legacy::deserialize_rsp(code, &rsp_data).unwrap()
}

#[test]
fn test_message_flow() {
    let ta = engine();
    let mut params = unpadded_undigested().to_vec();
    params.push(authorization(tags::ALGORITHM, Algorithm::Ecdsa));
    params.push(authorization(tags::KEY_SIZE, 224));
    let req = legacy::PerformOpReq::GenerateKey(legacy::GenerateKeyRequest {
        key_description: AuthorizationSet::from_params(&params),
    });
    let key_blob = match call(&ta, req) {
        Ok(legacy::PerformOpRsp::GenerateKey(rsp)) => {
            assert_eq!(rsp.unenforced.get_tag_value(tags::ORIGIN), Some(KeyOrigin::Software));
            rsp.key_blob
        }
        other => panic!("unexpected response {:?}", other),
    };

    let req = legacy::PerformOpReq::BeginOperation(legacy::BeginOperationRequest {
        purpose: KeyPurpose::Sign,
        key_blob: key_blob.clone(),
        additional_params: AuthorizationSet::new(),
    });
    let op_handle = match call(&ta, req) {
        Ok(legacy::PerformOpRsp::BeginOperation(rsp)) => rsp.op_handle,
        other => panic!("unexpected response {:?}", other),
    };
    assert_ne!(op_handle, 0);

    let req = legacy::PerformOpReq::UpdateOperation(legacy::UpdateOperationRequest {
        op_handle,
        input: b"message".to_vec(),
    });
    match call(&ta, req) {
        Ok(legacy::PerformOpRsp::UpdateOperation(rsp)) => assert!(rsp.output.is_empty()),
        other => panic!("unexpected response {:?}", other),
    }

    let req = legacy::PerformOpReq::FinishOperation(legacy::FinishOperationRequest {
        op_handle,
        signature: Vec::new(),
    });
    let signature = match call(&ta, req) {
        Ok(legacy::PerformOpRsp::FinishOperation(rsp)) => rsp.output,
        other => panic!("unexpected response {:?}", other),
    };
    assert!(!signature.is_empty());

    // The handle is gone once the operation finishes.
    let req = legacy::PerformOpReq::AbortOperation(legacy::AbortOperationRequest { op_handle });
    assert_eq!(call(&ta, req), Err(ErrorCode::InvalidOperationHandle));

    let req = legacy::PerformOpReq::ExportKey(legacy::ExportKeyRequest {
        additional_params: AuthorizationSet::new(),
        key_format: KeyFormat::X509,
        key_blob,
    });
    match call(&ta, req) {
        Ok(legacy::PerformOpRsp::ExportKey(rsp)) => {
            let public = PKey::public_key_from_der(&rsp.key_data).unwrap();
            assert_eq!(public.bits(), 224);
        }
        other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn test_message_codes() {
    let ta = engine();
    let req = legacy::PerformOpReq::AbortOperation(legacy::AbortOperationRequest { op_handle: 1 });
    assert_eq!(legacy::KeymasterMessageId::code(&req), KeymasterOperation::AbortOperation);
    let rsp_data = ta.process(&legacy::serialize_req(&req).unwrap());
    assert_eq!(
        hex::encode(rsp_data),
        "e4ffffff" // INVALID_OPERATION_HANDLE
    );
}

#[test]
fn test_concurrent_operations() {
    let ta = Arc::new(engine());
    let key_blob = Arc::new(import_ec(&ta, &ec_pkcs8()));

    let threads: Vec<_> = (0..4)
        .map(|idx| {
            let ta = ta.clone();
            let key_blob = key_blob.clone();
            std::thread::spawn(move || {
                let none = AuthorizationSet::new();
                for round in 0..8 {
                    let data = format!("thread {} round {}", idx, round);
                    sign_and_verify(&ta, &key_blob, &none, data.as_bytes());
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(ta.live_operations().unwrap(), 0);
}

#[test]
fn test_abandoned_operations_fill_table() {
    setup_logging();
    let ta = KeymasterTa::new(
        Config { operation_table_size: 3 },
        implementation(),
        device::Implementation::default(),
    );
    let none = AuthorizationSet::new();
    let key_blob = import_ec(&ta, &ec_pkcs8());

    let handles: Vec<OpHandle> = (0..3)
        .map(|_| ta.begin_operation(KeyPurpose::Sign, &key_blob, &none).unwrap())
        .collect();
    let result = ta.begin_operation(KeyPurpose::Sign, &key_blob, &none);
    assert_eq!(code_of(result), ErrorCode::TooManyOperations);

    ta.abort_operation(handles[1]).unwrap();
    let op = ta.begin_operation(KeyPurpose::Sign, &key_blob, &none).unwrap();
    assert!(!handles.contains(&op));
    assert_eq!(ta.live_operations().unwrap(), 3);
}
