//! Zlib decompression of the Base45-decoded QR payload.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::CertError;

/// Upper bound on the inflated token size. Real tokens are well below 100 KiB;
/// anything larger is a decompression bomb, not a certificate.
const MAX_DECOMPRESSED_SIZE: u64 = 4 * 1024 * 1024;

/// Inflates a zlib-compressed byte stream.
///
/// # Errors
///
/// Returns [`CertError::Decode`] on truncated or corrupt streams and on
/// payloads exceeding the decompression cap.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CertError> {
    let mut out = Vec::new();
    let mut decoder = ZlibDecoder::new(data).take(MAX_DECOMPRESSED_SIZE + 1);
    decoder
        .read_to_end(&mut out)
        .map_err(|_| CertError::decode("invalid compression"))?;
    if out.len() as u64 > MAX_DECOMPRESSED_SIZE {
        return Err(CertError::decode("decompressed payload too large"));
    }
    Ok(out)
}

/// Deflates bytes with zlib. Used to construct tokens in tests and tools.
#[must_use]
pub fn compress(data: &[u8]) -> Vec<u8> {
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail.
    encoder.write_all(data).expect("write to vec");
    encoder.finish().expect("finish to vec")
}
