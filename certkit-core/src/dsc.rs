//! Trust-list (DSC) distribution: signed-document decoding, fetching and
//! the persisted repository feeding the [`TrustStore`].

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;

use crate::error::CertError;
use crate::http_request::Request;
use crate::storage::{CborStore, KeyValueStore, UpdateStore};
use crate::trust::{DscList, TrustStore};

/// Verifies and decodes the signed trust-list document.
///
/// The document is the base64 signature in its first line and the JSON list
/// in the remainder; the signature is ECDSA P-256 / SHA-256 over the raw
/// remainder bytes, checked against the pinned build-time public key.
/// Trust-on-first-use is not permitted.
pub struct DscListDecoder {
    trust_anchor: VerifyingKey,
}

impl DscListDecoder {
    /// Creates a decoder for the given pinned public key
    /// (DER `SubjectPublicKeyInfo`).
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Signature`] when the pinned key is not a valid
    /// P-256 public key.
    pub fn new(trust_anchor_der: &[u8]) -> Result<Self, CertError> {
        let trust_anchor = VerifyingKey::from_public_key_der(trust_anchor_der)
            .map_err(|_| CertError::signature("invalid trust anchor key"))?;
        Ok(Self { trust_anchor })
    }

    /// Verifies the document signature and decodes the contained list.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Decode`] on a malformed document and
    /// [`CertError::Signature`] when the signature does not verify.
    pub fn decode_dsc_list(&self, data: &str) -> Result<DscList, CertError> {
        let (signature, body) = data
            .split_once('\n')
            .ok_or_else(|| CertError::decode("missing trust list signature"))?;
        let signature = BASE64
            .decode(signature.trim())
            .map_err(|_| CertError::decode("invalid trust list signature encoding"))?;
        let signature = Signature::from_slice(&signature)
            .map_err(|_| CertError::signature("malformed trust list signature"))?;
        self.trust_anchor
            .verify(body.as_bytes(), &signature)
            .map_err(|_| CertError::signature("invalid trust list signature"))?;
        serde_json::from_str(body)
            .map_err(|err| CertError::decode(format!("invalid trust list body: {err}")))
    }
}

/// Fetches the signed trust-list document from the trust service.
pub struct DscListService {
    request: Arc<Request>,
    base_url: String,
}

impl DscListService {
    /// Creates a service against `base_url` (scheme + host).
    pub fn new(request: Arc<Request>, base_url: impl Into<String>) -> Self {
        Self {
            request,
            base_url: base_url.into(),
        }
    }

    /// Downloads the raw signed document.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Network`] on transport failure.
    pub async fn fetch_trust_list(&self) -> Result<String, CertError> {
        self.request
            .get_text(&format!("{}/trustList/DSC", self.base_url))
            .await
    }
}

/// Persists the accepted trust list and pushes it into the [`TrustStore`].
pub struct DscRepository {
    snapshot: CborStore<DscList>,
    updates: Arc<UpdateStore>,
    trust_store: Arc<TrustStore>,
}

impl DscRepository {
    /// Creates the repository on top of the given persistence backend.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        updates: Arc<UpdateStore>,
        trust_store: Arc<TrustStore>,
    ) -> Self {
        Self {
            snapshot: CborStore::new(store, "dsc_list"),
            updates,
            trust_store,
        }
    }

    /// Loads the persisted list, falling back to the bundled snapshot on
    /// first start, and installs it into the trust store.
    ///
    /// # Errors
    ///
    /// Returns an error when neither list can be installed.
    pub fn initialize(&self, bundled: &DscList) -> Result<(), CertError> {
        let list = self.snapshot.get()?.unwrap_or_else(|| bundled.clone());
        self.trust_store.replace(&list.to_trusted_certs()?)
    }

    /// Atomically replaces the trusted list with an already verified one and
    /// marks the sync timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error when the list cannot be indexed or persisted; the
    /// previous list stays in effect in that case.
    pub fn replace(&self, list: &DscList) -> Result<(), CertError> {
        self.trust_store.replace(&list.to_trusted_certs()?)?;
        self.snapshot.put(list)?;
        self.updates.mark(UpdateStore::DSC_LIST)?;
        Ok(())
    }

    /// The currently persisted list, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be read.
    pub fn current(&self) -> Result<Option<DscList>, CertError> {
        Ok(self.snapshot.get()?)
    }
}
