//! End-to-end decode pipeline tests: QR text through Base45, zlib, COSE and
//! CWT into a verified certificate.

use std::sync::Arc;

use ciborium::Value;
use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use serde_json::json;

use certkit_core::cert::DgcEntryKind;
use certkit_core::error::CertError;
use certkit_core::qr::QrCoder;
use certkit_core::testing::{cbor_value, qr_string, signed_qr};
use certkit_core::trust::TrustStore;
use certkit_core::validator::CertValidator;

const KID: &[u8] = &[0x10, 0x32, 0x54, 0x76, 0x98, 0xba, 0xdc, 0xfe];
// Well past any test run date.
const FUTURE_EXPIRY: i64 = 4_102_444_800;

fn dgc() -> Value {
    cbor_value(&json!({
        "ver": "1.3.0",
        "nam": {"fn": "Mustermann", "gn": "Erika", "fnt": "MUSTERMANN", "gnt": "ERIKA"},
        "dob": "1964-08-12",
        "v": [{
            "tg": "840539006", "vp": "1119349007", "mp": "EU/1/20/1528",
            "ma": "ORG-100030215", "dn": 2, "sd": 2, "dt": "2021-05-29",
            "co": "DE", "is": "Robert Koch-Institut",
            "ci": "URN:UVCI:01DE/IZ12345A/5CWLU12RNOB9RXSEOP6FG8#W"
        }]
    }))
}

fn coder_for(key: &SigningKey) -> QrCoder {
    let store = TrustStore::new(&[certkit_core::testing::trusted_cert("DE", KID, key)])
        .expect("trust store");
    QrCoder::new(Arc::new(CertValidator::new(Arc::new(store))))
}

#[test]
fn decodes_a_validly_signed_token() {
    let key = SigningKey::random(&mut OsRng);
    let qr = signed_qr("DE", Some(1_640_000_000), FUTURE_EXPIRY, &dgc(), KID, &key);

    let certificate = coder_for(&key).decode_cov_cert(&qr).expect("valid token");
    assert_eq!(certificate.issuer, "DE");
    assert_eq!(certificate.name.full_name(), "Erika Mustermann");
    assert_eq!(certificate.birth_date, "1964-08-12");
    let entry = certificate.dgc_entry().expect("entry");
    assert_eq!(entry.kind(), DgcEntryKind::Vaccination);
    assert_eq!(certificate.vaccinations[0].dose_number, 2);
}

#[test]
fn decoding_twice_yields_equal_results() {
    let key = SigningKey::random(&mut OsRng);
    let qr = signed_qr("DE", None, FUTURE_EXPIRY, &dgc(), KID, &key);
    let coder = coder_for(&key);

    let first = coder.decode_cov_cert(&qr).expect("valid");
    let second = coder.decode_cov_cert(&qr).expect("valid");
    assert_eq!(first, second);
}

#[test]
fn tampering_the_signed_payload_breaks_the_signature() {
    let key = SigningKey::random(&mut OsRng);
    let qr = signed_qr("DE", None, FUTURE_EXPIRY, &dgc(), KID, &key);
    let coder = coder_for(&key);

    // Unwrap the envelope, flip one byte of the signed CWT payload and
    // re-encode the token.
    let raw = coder.decode_raw_cose(&qr).expect("raw cose");
    let mut envelope: Value = ciborium::de::from_reader(raw.as_slice()).expect("cbor");
    {
        let Value::Tag(18, inner) = &mut envelope else {
            panic!("expected tagged envelope");
        };
        let Value::Array(items) = inner.as_mut() else {
            panic!("expected cose array");
        };
        let Value::Bytes(payload) = &mut items[2] else {
            panic!("expected payload bstr");
        };
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
    }
    let mut tampered = Vec::new();
    ciborium::ser::into_writer(&envelope, &mut tampered).expect("serialize");

    assert!(matches!(
        coder.decode_cov_cert(&qr_string(&tampered)),
        Err(CertError::Signature { .. })
    ));
}

#[test]
fn unknown_signer_is_a_signature_error() {
    let key = SigningKey::random(&mut OsRng);
    let stranger = SigningKey::random(&mut OsRng);
    let qr = signed_qr("DE", None, FUTURE_EXPIRY, &dgc(), KID, &stranger);

    assert!(matches!(
        coder_for(&key).decode_cov_cert(&qr),
        Err(CertError::Signature { .. })
    ));
}

#[test]
fn expired_token_is_not_a_decode_error() {
    let key = SigningKey::random(&mut OsRng);
    let expired = signed_qr("DE", Some(1_600_000_000), 1_610_000_000, &dgc(), KID, &key);
    let coder = coder_for(&key);

    assert!(matches!(
        coder.decode_cov_cert(&expired),
        Err(CertError::ExpiredCertificate)
    ));

    // The same class of input with a broken envelope is a decode error.
    let mut garbled = expired;
    garbled.truncate(garbled.len() / 2);
    assert!(matches!(
        coder.decode_cov_cert(&garbled),
        Err(CertError::Decode { .. })
    ));
}

#[test]
fn blacklisted_issuing_entity_is_rejected() {
    let key = SigningKey::random(&mut OsRng);
    let blacklisted = cbor_value(&json!({
        "ver": "1.3.0",
        "nam": {"fnt": "MUSTERMANN"},
        "dob": "1964-08-12",
        "v": [{
            "tg": "840539006", "vp": "1119349007", "mp": "EU/1/20/1528",
            "ma": "ORG-100030215", "dn": 2, "sd": 2, "dt": "2021-05-29",
            "co": "DE", "is": "RKI", "ci": "URN:UVCI:01DE/foobar/safs@"
        }]
    }));
    let qr = signed_qr("DE", None, FUTURE_EXPIRY, &blacklisted, KID, &key);

    assert!(matches!(
        coder_for(&key).decode_cov_cert(&qr),
        Err(CertError::BlacklistedEntity)
    ));
}
