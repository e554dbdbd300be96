// Integration test.

// Explicitly include alloc because macros from `kmr_common` assume it.
extern crate alloc;

use kmr_common::{
    crypto::{self, KeyMaterial},
    expect_err, keyblob,
    keyblob::KeyBlob,
};
use kmr_crypto_boring::{aes::BoringAes, hmac::BoringHmac, rng::BoringRng};
use kmr_wire::{authorization, tags, Algorithm, AuthorizationSet};

fn root_kek() -> crypto::hmac::Key {
    crypto::hmac::Key::new_from(keyblob::SOFTWARE_ROOT_KEK).unwrap()
}

fn serialize(blob: &KeyBlob, hidden: &AuthorizationSet) -> Vec<u8> {
    blob.serialize(&BoringAes, &BoringHmac, &mut BoringRng, &root_kek(), hidden).unwrap()
}

fn deserialize(data: &[u8], hidden: &AuthorizationSet) -> Result<KeyBlob, kmr_common::Error> {
    KeyBlob::deserialize(&BoringAes, &BoringHmac, &root_kek(), data, hidden)
}

fn sample_blob() -> KeyBlob {
    KeyBlob {
        key_material: KeyMaterial(b"not really a key".to_vec()),
        enforced: AuthorizationSet::from_params(&[authorization(tags::ALGORITHM, Algorithm::Rsa)]),
        unenforced: AuthorizationSet::from_params(&[
            authorization(tags::KEY_SIZE, 512),
            authorization(tags::CREATION_DATETIME, 1_700_000_000_000),
        ]),
    }
}

#[test]
fn test_serialize_encrypted_keyblob() {
    let hidden = keyblob::hidden(&AuthorizationSet::new(), b"SW").unwrap();
    let blob = KeyBlob {
        key_material: KeyMaterial(vec![0xbb, 0xbb]),
        enforced: AuthorizationSet::new(),
        unenforced: AuthorizationSet::new(),
    };
    let data = serialize(&blob, &hidden);
    assert_eq!(data[0], 0x00, "version");
    assert_eq!(hex::encode(&data[13..17]), "12000000", "key material plus tag length");
    assert_eq!(
        hex::encode(&data[35..]),
        concat!(
            concat!(
                "00000000", // no indirect data
                "00000000", // no params
                "00000000", // zero size of params
            ),
            concat!(
                "00000000", // no indirect data
                "00000000", // no params
                "00000000", // zero size of params
            ),
        )
    );
    assert_eq!(deserialize(&data, &hidden).unwrap(), blob);
}

#[test]
fn test_key_material_not_in_clear() {
    let hidden = keyblob::hidden(&AuthorizationSet::new(), b"SW").unwrap();
    let blob = sample_blob();
    let data = serialize(&blob, &hidden);
    let needle = &blob.key_material.0[..];
    assert!(!data.windows(needle.len()).any(|w| w == needle));

    // Each serialization uses a fresh nonce, so produces different output.
    let again = serialize(&blob, &hidden);
    assert_ne!(data[1..13], again[1..13]);
    assert_ne!(data, again);
    assert_eq!(deserialize(&again, &hidden).unwrap(), blob);
}

#[test]
fn test_keyblob_roundtrip_with_characteristics() {
    let desc = AuthorizationSet::from_params(&[
        authorization(tags::APPLICATION_ID, &b"app_id"[..]),
        authorization(tags::APPLICATION_DATA, &b"app_data"[..]),
    ]);
    let hidden = keyblob::hidden(&desc, b"SW").unwrap();
    let blob = sample_blob();
    let data = serialize(&blob, &hidden);
    let got = deserialize(&data, &hidden).unwrap();
    assert_eq!(got, blob);

    // Any difference in the hidden parameters invalidates the blob.
    let wrong_hiddens = [
        keyblob::hidden(&AuthorizationSet::new(), b"SW").unwrap(),
        keyblob::hidden(&desc, b"HW").unwrap(),
        keyblob::hidden(
            &AuthorizationSet::from_params(&[
                authorization(tags::APPLICATION_ID, &b"app_id"[..]),
                authorization(tags::APPLICATION_DATA, &b"other"[..]),
            ]),
            b"SW",
        )
        .unwrap(),
    ];
    for wrong in &wrong_hiddens {
        let result = deserialize(&data, wrong);
        expect_err!(result, "invalid key blob");
    }

    // As does any single-bit change to the blob contents.
    for idx in 0..data.len() {
        let mut tampered = data.clone();
        tampered[idx] ^= 0x01;
        let result = deserialize(&tampered, &hidden);
        assert!(result.is_err(), "tampered byte {} accepted", idx);
    }

    // Or a different root key.
    let other_root = crypto::hmac::Key::new_from(&[0x42; 32]).unwrap();
    let result = KeyBlob::deserialize(&BoringAes, &BoringHmac, &other_root, &data, &hidden);
    expect_err!(result, "invalid key blob");
}

#[test]
fn test_deserialize_encrypted_keyblob_fail() {
    let hidden = keyblob::hidden(&AuthorizationSet::new(), b"SW").unwrap();
    let data = serialize(&sample_blob(), &hidden);

    let mut bad_version = data.clone();
    bad_version[0] = 0x02;
    let result = deserialize(&bad_version, &hidden);
    expect_err!(result, "unexpected blob version 2");

    let mut extra = data.clone();
    extra.push(0x00);
    let result = deserialize(&extra, &hidden);
    expect_err!(result, "extra data (len 1)");

    let mut too_long = data.clone();
    too_long[13..17].copy_from_slice(&0x400u32.to_le_bytes());
    let result = deserialize(&too_long, &hidden);
    expect_err!(result, "failed to find 1024 bytes");

    // Moving bytes between the ciphertext and the characteristics breaks authentication even
    // when the result still parses.
    let mut shifted = data.clone();
    let len = u32::from_le_bytes(shifted[13..17].try_into().unwrap());
    shifted[13..17].copy_from_slice(&(len - 1).to_le_bytes());
    assert!(deserialize(&shifted, &hidden).is_err());
}

#[test]
fn test_deserialize_encrypted_keyblob_truncated() {
    let hidden = keyblob::hidden(&AuthorizationSet::new(), b"SW").unwrap();
    let data = serialize(&sample_blob(), &hidden);
    assert!(deserialize(&data, &hidden).is_ok());

    for len in 0..data.len() - 1 {
        // Any truncation of this data is invalid.
        assert!(
            deserialize(&data[..len], &hidden).is_err(),
            "deserialize of data[..{}] subset (len={}) unexpectedly succeeded",
            len,
            data.len()
        );
    }
}
