//! Support code for constructing validly signed tokens, trust entries and
//! signed trust-list documents. Intended for tests and tooling; production
//! code never issues certificates.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ciborium::Value;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::EncodePublicKey;
use serde::Serialize;

use crate::trust::{KeyIdentifier, TrustedCert};
use crate::{base45, zlib};

const ALG_ES256: i64 = -7;

fn to_cbor(value: &Value) -> Vec<u8> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes).expect("serialize to vec");
    bytes
}

/// Converts any serde-serializable value into a CBOR [`Value`].
///
/// # Panics
///
/// Panics when `value` cannot be represented as CBOR.
pub fn cbor_value<T: Serialize>(value: &T) -> Value {
    Value::serialized(value).expect("serializable value")
}

/// Builds the CWT claim payload for a certificate.
#[must_use]
pub fn cwt_payload(issuer: &str, issued_at: Option<i64>, expires_at: i64, dgc: &Value) -> Vec<u8> {
    let mut claims = vec![(
        Value::Integer(1.into()),
        Value::Text(issuer.to_string()),
    )];
    if let Some(issued_at) = issued_at {
        claims.push((Value::Integer(6.into()), Value::Integer(issued_at.into())));
    }
    claims.push((Value::Integer(4.into()), Value::Integer(expires_at.into())));
    claims.push((
        Value::Integer((-260).into()),
        Value::Map(vec![(Value::Integer(1.into()), dgc.clone())]),
    ));
    to_cbor(&Value::Map(claims))
}

/// Wraps `payload` in a signed `COSE_Sign1` envelope.
#[must_use]
pub fn sign_cose(payload: &[u8], kid: &[u8], key: &SigningKey) -> Vec<u8> {
    let protected = to_cbor(&Value::Map(vec![
        (Value::Integer(1.into()), Value::Integer(ALG_ES256.into())),
        (Value::Integer(4.into()), Value::Bytes(kid.to_vec())),
    ]));
    let sig_structure = to_cbor(&Value::Array(vec![
        Value::Text("Signature1".to_string()),
        Value::Bytes(protected.clone()),
        Value::Bytes(Vec::new()),
        Value::Bytes(payload.to_vec()),
    ]));
    let signature: Signature = key.sign(&sig_structure);

    let envelope = Value::Tag(
        18,
        Box::new(Value::Array(vec![
            Value::Bytes(protected),
            Value::Map(Vec::new()),
            Value::Bytes(payload.to_vec()),
            Value::Bytes(signature.to_bytes().to_vec()),
        ])),
    );
    to_cbor(&envelope)
}

/// Encodes a COSE envelope as a scannable QR string (`HC1:` + Base45(zlib)).
#[must_use]
pub fn qr_string(cose: &[u8]) -> String {
    format!("HC1:{}", base45::encode(&zlib::compress(cose)))
}

/// Builds a complete QR string for the given claims, signed with `key`.
#[must_use]
pub fn signed_qr(
    issuer: &str,
    issued_at: Option<i64>,
    expires_at: i64,
    dgc: &Value,
    kid: &[u8],
    key: &SigningKey,
) -> String {
    let payload = cwt_payload(issuer, issued_at, expires_at, dgc);
    qr_string(&sign_cose(&payload, kid, key))
}

/// Builds a [`TrustedCert`] for the public half of `key`.
///
/// # Panics
///
/// Panics when the key cannot be DER-encoded.
#[must_use]
pub fn trusted_cert(country: &str, kid: &[u8], key: &SigningKey) -> TrustedCert {
    let raw_data = VerifyingKey::from(key)
        .to_public_key_der()
        .expect("encode public key")
        .as_bytes()
        .to_vec();
    TrustedCert {
        country: country.to_string(),
        kid: KeyIdentifier::from(kid),
        raw_data,
    }
}

/// Signs a trust-list JSON body the way the distribution backend does:
/// first line base64 signature, remainder the body itself.
#[must_use]
pub fn signed_trust_list(body: &str, anchor: &SigningKey) -> String {
    let signature: Signature = anchor.sign(body.as_bytes());
    format!("{}\n{body}", BASE64.encode(signature.to_bytes()))
}
