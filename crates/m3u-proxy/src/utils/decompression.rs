//! Magic-byte compression detection for fetched playlist/guide bodies.
//!
//! `Content-Encoding`-negotiated gzip/deflate/brotli is already handled
//! transparently by reqwest (`Cargo.toml`'s `gzip`/`deflate`/`brotli`
//! features); this module covers the case a server serves a pre-compressed
//! file (`.xml.gz`, a bzip2/xz-archived guide, ...) without setting that
//! header, so the bytes would otherwise be handed to the parser as-is.

#[cfg(any(feature = "compression-gzip", feature = "compression-bzip2", feature = "compression-xz"))]
use std::io::Read;

use bytes::Bytes;

#[cfg(feature = "compression-gzip")]
use flate2::read::GzDecoder;

#[cfg(feature = "compression-bzip2")]
use bzip2::read::BzDecoder;

#[cfg(feature = "compression-xz")]
use xz2::read::XzDecoder;

use crate::errors::{AppError, AppResult};

/// Compression formats recognised by magic-byte sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    #[cfg(feature = "compression-gzip")]
    Gzip,
    #[cfg(feature = "compression-bzip2")]
    Bzip2,
    #[cfg(feature = "compression-xz")]
    Xz,
    Uncompressed,
}

/// Magic-byte detection and decompression for a fully-buffered response body.
pub struct DecompressionService;

impl DecompressionService {
    /// Detect compression format from the leading magic bytes.
    #[must_use]
    pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
        if let Some(kind) = infer::get(data) {
            return match kind.mime_type() {
                #[cfg(feature = "compression-gzip")]
                "application/gzip" => CompressionFormat::Gzip,
                #[cfg(feature = "compression-bzip2")]
                "application/x-bzip2" => CompressionFormat::Bzip2,
                #[cfg(feature = "compression-xz")]
                "application/x-xz" => CompressionFormat::Xz,
                _ => CompressionFormat::Uncompressed,
            };
        }
        CompressionFormat::Uncompressed
    }

    /// Decompress `data` if its magic bytes identify a supported format,
    /// otherwise return it unchanged.
    ///
    /// # Errors
    /// Returns an error if the detected format's decoder fails partway
    /// through the body (truncated download, corrupt archive).
    pub fn decompress(data: Bytes) -> AppResult<Vec<u8>> {
        match Self::detect_compression_format(&data) {
            #[cfg(feature = "compression-gzip")]
            CompressionFormat::Gzip => Self::decompress_gzip(&data),
            #[cfg(feature = "compression-bzip2")]
            CompressionFormat::Bzip2 => Self::decompress_bzip2(&data),
            #[cfg(feature = "compression-xz")]
            CompressionFormat::Xz => Self::decompress_xz(&data),
            CompressionFormat::Uncompressed => Ok(data.to_vec()),
        }
    }

    #[cfg(feature = "compression-gzip")]
    fn decompress_gzip(data: &[u8]) -> AppResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|e| AppError::transient("decompression", format!("gzip: {e}")))?;
        Ok(out)
    }

    #[cfg(feature = "compression-bzip2")]
    fn decompress_bzip2(data: &[u8]) -> AppResult<Vec<u8>> {
        let mut decoder = BzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|e| AppError::transient("decompression", format!("bzip2: {e}")))?;
        Ok(out)
    }

    #[cfg(feature = "compression-xz")]
    fn decompress_xz(data: &[u8]) -> AppResult<Vec<u8>> {
        let mut decoder = XzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(|e| AppError::transient("decompression", format!("xz: {e}")))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncompressed_data_passes_through() {
        let data = b"#EXTM3U\n";
        assert_eq!(DecompressionService::detect_compression_format(data), CompressionFormat::Uncompressed);
        assert_eq!(DecompressionService::decompress(Bytes::from_static(data)).unwrap(), data);
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn detects_and_decompresses_gzip() {
        use std::io::Write;
        let original = b"#EXTM3U\n#EXTINF:-1,Ch\nhttp://x\n";
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(DecompressionService::detect_compression_format(&compressed), CompressionFormat::Gzip);
        let decompressed = DecompressionService::decompress(Bytes::from(compressed)).unwrap();
        assert_eq!(decompressed, original);
    }
}
