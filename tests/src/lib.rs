//! Test methods to confirm basic functionality of trait implementations.

use kmr_common::crypto::{
    aes, hmac, AccumulatingOperation, Aes, Dsa, Ec, Hmac, Rng, Rsa, VerifyingOperation, WallClock,
};
use kmr_common::Error;
use kmr_wire::{Digest, EcCurve, ErrorCode, KeySizeInBits, DEFAULT_RSA_EXPONENT};

/// Install a logger suitable for use in tests; repeated calls are harmless.
pub fn setup_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test basic [`Rng`] functionality.
pub fn test_rng<R: Rng>(rng: &mut R) {
    let u1 = rng.next_u64().unwrap();
    let u2 = rng.next_u64().unwrap();
    assert_ne!(u1, u2);

    let mut b1 = [0u8; 16];
    let mut b2 = [0u8; 16];
    rng.fill_bytes(&mut b1).unwrap();
    rng.fill_bytes(&mut b2).unwrap();
    assert_ne!(b1, b2);

    rng.fill_bytes(&mut []).unwrap();
}

/// Test AES-256-GCM encryption and decryption, including a known-answer check.
pub fn test_aes_gcm<A: Aes>(aes: A) {
    // GCM test case 14: zero key, zero nonce, one zero block.
    let key = aes::Key([0; aes::KEY_SIZE]);
    let nonce = [0u8; aes::GCM_NONCE_SIZE];
    let got = aes.gcm_encrypt(&key, &nonce, &[], &[0; 16]).unwrap();
    assert_eq!(
        hex::encode(&got),
        concat!(
            "cea7403d4d606b6e074ec5d3baf39d18", // ciphertext
            "d0d1c8a799996bf0265b98b5d48ab919", // tag
        )
    );
    assert_eq!(aes.gcm_decrypt(&key, &nonce, &[], &got).unwrap(), vec![0; 16]);

    let key = aes::Key([0x42; aes::KEY_SIZE]);
    let nonce = [7u8; aes::GCM_NONCE_SIZE];
    let aad = b"associated data";
    let msg = b"The quick brown fox jumps over the lazy dog";
    let ct = aes.gcm_encrypt(&key, &nonce, aad, msg).unwrap();
    assert_eq!(ct.len(), msg.len() + aes::GCM_TAG_SIZE);
    assert_eq!(aes.gcm_decrypt(&key, &nonce, aad, &ct).unwrap(), msg.to_vec());

    // Any change to the inputs is detected.
    let mut corrupt = ct.clone();
    corrupt[3] ^= 0x01;
    let other_key = aes::Key([0x43; aes::KEY_SIZE]);
    let failures = [
        aes.gcm_decrypt(&key, &nonce, aad, &corrupt),
        aes.gcm_decrypt(&key, &nonce, b"other data", &ct),
        aes.gcm_decrypt(&key, &[8u8; aes::GCM_NONCE_SIZE], aad, &ct),
        aes.gcm_decrypt(&other_key, &nonce, aad, &ct),
        aes.gcm_decrypt(&key, &nonce, aad, &ct[..ct.len() - 1]),
        aes.gcm_decrypt(&key, &nonce, aad, &ct[..4]),
    ];
    for result in failures {
        assert_eq!(code_of(result), ErrorCode::VerificationFailed);
    }
}

/// Test basic [`WallClock`] functionality.
pub fn test_wall_clock<C: WallClock>(clock: C) {
    // 2020-01-01T00:00:00Z
    const EARLIEST: u64 = 1_577_836_800_000;
    let t1 = clock.now();
    let t2 = clock.now();
    assert!(t1.0 > EARLIEST, "clock reports {:?}", t1);
    assert!(t2 >= t1);
}

/// Test basic [`Hmac`] functionality.
pub fn test_hmac<H: Hmac>(hmac: H) {
    struct TestCase {
        digest: Digest,
        key: &'static [u8],
        data: &'static [u8],
        expected_mac: &'static str,
    }

    const HMAC_TESTS: &[TestCase] = &[
        TestCase {
            digest: Digest::Sha256,
            data: b"Hello",
            key: b"\x00\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c\x0d\x0e\x0f",
            expected_mac: "e0ff02553d9a619661026c7aa1ddf59b7b44eac06a9908ff9e19961d481935d4",
        },
        // empty data
        TestCase {
            digest: Digest::Sha256,
            data: &[],
            key: b"\x00\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c\x0d\x0e\x0f",
            expected_mac: "07eff8b326b7798c9ccfcbdbe579489ac785a7995a04618b1a2813c26744777d",
        },
        // RFC 4231 section 4.2
        TestCase {
            digest: Digest::Sha256,
            key: &[0x0b; 20],
            data: b"Hi There",
            expected_mac: concat!(
                "b0344c61d8db38535ca8afceaf0bf12b",
                "881dc200c9833da726e9376c2e32cff7",
            ),
        },
        // RFC 4231 section 4.3
        TestCase {
            digest: Digest::Sha256,
            key: b"Jefe",
            data: b"what do ya want for nothing?",
            expected_mac: concat!(
                "5bdcc146bf60754e6a042426089575c7",
                "5a003f089d2739839dec58b964ec3843",
            ),
        },
        // RFC 4231 section 4.4
        TestCase {
            digest: Digest::Sha512,
            key: &[0xaa; 20],
            data: &[0xdd; 50],
            expected_mac: concat!(
                "fa73b0089d56a284efb0f0756c890be9",
                "b1b5dbdd8ee81a3655f83e33b2279d39",
                "bf3e848279a722c806b485a47e67c807",
                "b946a337bee8942674278859e13292fb"
            ),
        },
    ];

    for (i, test) in HMAC_TESTS.iter().enumerate() {
        let mut op = hmac.begin(hmac::Key(test.key.to_vec()), test.digest).unwrap();
        // Feed the data in two pieces to check accumulation.
        let (first, second) = test.data.split_at(test.data.len() / 2);
        op.update(first).unwrap();
        op.update(second).unwrap();
        let mac = op.finish().unwrap();
        assert_eq!(hex::encode(&mac), test.expected_mac, "incorrect mac in test case {}", i);
    }

    let chunks: &[&[u8]] = &[b"what do ya ", b"want for nothing?"];
    let mac = hmac::hmac_sha256(&hmac, b"Jefe", chunks).unwrap();
    assert_eq!(hex::encode(mac), HMAC_TESTS[3].expected_mac);
}

fn code_of<T>(result: Result<T, Error>) -> ErrorCode {
    match result {
        Ok(_) => ErrorCode::Ok,
        Err(e) => e.into(),
    }
}

fn sign(mut op: Box<dyn AccumulatingOperation>, data: &[u8]) -> Result<Vec<u8>, Error> {
    op.update(data)?;
    op.finish()
}

fn verify(
    mut op: Box<dyn VerifyingOperation>,
    data: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    op.update(data)?;
    op.finish(signature)
}

/// Test RSA generation, raw signing and verification, using a small (512-bit) key.
pub fn test_rsa_sign_verify<R: Rsa>(rsa: R) {
    let key = rsa.generate_key(KeySizeInBits(512), DEFAULT_RSA_EXPONENT).unwrap();
    let spki = rsa.subject_public_key_info(&key).unwrap();
    assert_eq!(spki[0], 0x30, "SubjectPublicKeyInfo should be a DER SEQUENCE");

    // Raw RSA input must be exactly modulus-sized, and numerically less than the modulus.
    let mut data = vec![0x5a; 64];
    data[0] = 0;
    let signature = sign(rsa.begin_sign(&key).unwrap(), &data).unwrap();
    assert_eq!(signature.len(), 64);
    verify(rsa.begin_verify(&key).unwrap(), &data, &signature).unwrap();

    let mut corrupt = signature.clone();
    corrupt[63] ^= 0x01;
    assert_eq!(
        code_of(verify(rsa.begin_verify(&key).unwrap(), &data, &corrupt)),
        ErrorCode::VerificationFailed
    );
    assert_eq!(
        code_of(verify(rsa.begin_verify(&key).unwrap(), &data, &signature[..63])),
        ErrorCode::VerificationFailed
    );
    assert_eq!(
        code_of(verify(rsa.begin_verify(&key).unwrap(), &data[..63], &signature)),
        ErrorCode::VerificationFailed
    );

    // Short input is rejected at finish time.
    assert_eq!(
        code_of(sign(rsa.begin_sign(&key).unwrap(), &data[..63])),
        ErrorCode::UnknownError
    );

    // Input split across updates signs the same as a single update.
    let mut op = rsa.begin_sign(&key).unwrap();
    op.update(&data[..10]).unwrap();
    op.update(&data[10..]).unwrap();
    assert_eq!(op.finish().unwrap(), signature);
}

/// Test DSA generation (with and without supplied domain parameters), signing and verification.
pub fn test_dsa_sign_verify<D: Dsa>(dsa: D) {
    let (key, params) = dsa.generate_key(KeySizeInBits(1024), None).unwrap();
    assert_eq!(params.key_size(), KeySizeInBits(1024));
    let spki = dsa.subject_public_key_info(&key).unwrap();
    assert_eq!(spki[0], 0x30);

    let data = b"The quick brown fox";
    let signature = sign(dsa.begin_sign(&key).unwrap(), data).unwrap();
    verify(dsa.begin_verify(&key).unwrap(), data, &signature).unwrap();
    assert_eq!(
        code_of(verify(dsa.begin_verify(&key).unwrap(), b"The quick brown cat", &signature)),
        ErrorCode::VerificationFailed
    );
    assert_eq!(
        code_of(verify(dsa.begin_verify(&key).unwrap(), data, b"not a signature")),
        ErrorCode::VerificationFailed
    );

    // A second key in the same domain.
    let (key2, params2) = dsa.generate_key(KeySizeInBits(1024), Some(&params)).unwrap();
    assert_eq!(params, params2);
    assert_ne!(key, key2);
    assert_eq!(
        code_of(verify(dsa.begin_verify(&key2).unwrap(), data, &signature)),
        ErrorCode::VerificationFailed
    );
}

/// Test ECDSA generation, signing and verification on every supported curve.
pub fn test_ec_sign_verify<E: Ec>(ec: E) {
    let data = b"The quick brown fox";
    for curve in [EcCurve::P192, EcCurve::P224, EcCurve::P256, EcCurve::P384, EcCurve::P521] {
        let key = ec.generate_key(curve).unwrap();
        let spki = ec.subject_public_key_info(&key).unwrap();
        assert_eq!(spki[0], 0x30, "bad SPKI for {:?}", curve);

        let signature = sign(ec.begin_sign(&key).unwrap(), data).unwrap();
        verify(ec.begin_verify(&key).unwrap(), data, &signature).unwrap();
        assert_eq!(
            code_of(verify(ec.begin_verify(&key).unwrap(), b"The quick brown cat", &signature)),
            ErrorCode::VerificationFailed,
            "tampered data verified for {:?}",
            curve
        );
        assert_eq!(
            code_of(verify(ec.begin_verify(&key).unwrap(), data, b"not a signature")),
            ErrorCode::VerificationFailed
        );
    }
}
