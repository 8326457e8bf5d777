//! Blacklist check for certificate issuing entities.

use sha2::{Digest, Sha512};

use crate::error::CertError;

/// SHA-512 hex digests of blacklisted issuing entities.
const ENTITY_BLACKLIST: &[&str] = &[
    "75f6df21f51b4998740bf3e1cdaff1c76230360e1baf5ac0a2b9a383a1f9fa34dd77b6aa55a28cc5843d75b7c4a89bdbfc9a9177da244861c4068e76847dd150",
];

/// Checks the issuing entity of `uvci` against the blacklist.
///
/// The entity is the first `<country>/<segment>` part of the identifier,
/// where country is two letters and the segment is terminated by another
/// slash. Identifiers without an extractable entity are skipped, not failed.
///
/// # Errors
///
/// Returns [`CertError::BlacklistedEntity`] when the entity's SHA-512 digest
/// matches a blacklisted one.
pub fn validate_entity(uvci: &str) -> Result<(), CertError> {
    if let Some(entity) = extract_entity(uvci) {
        let digest = hex::encode(Sha512::digest(entity.as_bytes()));
        if ENTITY_BLACKLIST.contains(&digest.as_str()) {
            return Err(CertError::BlacklistedEntity);
        }
    }
    Ok(())
}

fn extract_entity(uvci: &str) -> Option<&str> {
    let bytes = uvci.as_bytes();
    let mut start = 0;
    while start + 3 < bytes.len() {
        if bytes[start].is_ascii_alphabetic()
            && bytes[start + 1].is_ascii_alphabetic()
            && bytes[start + 2] == b'/'
        {
            // Non-empty segment terminated by the next slash. Slash offsets
            // are byte-exact; '/' is ASCII, so the slice boundaries are valid.
            let segment = &bytes[start + 3..];
            if let Some(end) = segment
                .iter()
                .skip(1)
                .position(|&b| b == b'/')
                .map(|pos| pos + 1)
            {
                return Some(&uvci[start..start + 3 + end]);
            }
        }
        start += 1;
    }
    None
}
