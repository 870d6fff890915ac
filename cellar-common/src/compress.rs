// Copyright 2025 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

/// Compression format version that prefixes the uncompressed length as a fixed 4-byte little-endian integer.
pub const COMPRESS_FORMAT_VERSION_FIXED32: u32 = 1;
/// Compression format version that prefixes the uncompressed length as a varint32.
pub const COMPRESS_FORMAT_VERSION_VARINT32: u32 = 2;

/// Errors raised by the codecs, attached as the source of an [`ErrorKind::Codec`] error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The format version is not recognized.
    #[error("unsupported compress format version: {0}")]
    UnsupportedFormatVersion(u32),
    /// The uncompressed length header is missing or malformed.
    #[error("truncated uncompressed length header")]
    TruncatedHeader,
    /// The decompressed output does not match the recorded length.
    #[error("decompressed size mismatch, expected: {expected}, get: {get}")]
    SizeMismatch {
        /// Length recorded in the header.
        expected: usize,
        /// Length actually produced.
        get: usize,
    },
    /// The input is too large to be described by the length header.
    #[error("value too large to compress: {0} bytes")]
    TooLarge(usize),
    /// Error raised by the underlying codec library.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        let kind = match e {
            CodecError::UnsupportedFormatVersion(_) => ErrorKind::Config,
            _ => ErrorKind::Codec,
        };
        Error::new(kind, "codec error").with_source(e)
    }
}

/// The compression algorithm of the cache value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Compression {
    /// No compression.
    None,
    /// LZ4 block compression.
    #[default]
    Lz4,
    /// Zstd compression.
    Zstd,
}

impl Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Compression {
    /// Name of the compression algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NoCompression",
            Self::Lz4 => "LZ4",
            Self::Zstd => "ZSTD",
        }
    }

    /// Convert the compression algorithm into its tag.
    pub fn to_u8(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }

    /// Convert a tag into the compression algorithm.
    pub fn try_from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::Lz4),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Returns `true` if the algorithm leaves the data untouched.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Compress `data` with the given format version.
    ///
    /// [`Compression::None`] returns a copy of `data`.
    pub fn compress(&self, data: &[u8], format_version: u32) -> Result<Vec<u8>> {
        check_format_version(format_version)?;

        let payload = match self {
            Self::None => return Ok(data.to_vec()),
            Self::Lz4 => lz4::block::compress(data, None, false).map_err(CodecError::from)?,
            Self::Zstd => zstd::bulk::compress(data, 0).map_err(CodecError::from)?,
        };

        let len = u32::try_from(data.len()).map_err(|_| CodecError::TooLarge(data.len()))?;
        let mut buf = Vec::with_capacity(payload.len() + 5);
        match format_version {
            COMPRESS_FORMAT_VERSION_FIXED32 => buf.extend_from_slice(&len.to_le_bytes()),
            _ => encode_varint32(&mut buf, len),
        }
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decompress `data` produced by [`Compression::compress`] with the same format version.
    pub fn decompress(&self, data: &[u8], format_version: u32) -> Result<Vec<u8>> {
        check_format_version(format_version)?;

        if self.is_none() {
            return Ok(data.to_vec());
        }

        let (len, header) = match format_version {
            COMPRESS_FORMAT_VERSION_FIXED32 => {
                let bytes: [u8; 4] = data
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or(CodecError::TruncatedHeader)?;
                (u32::from_le_bytes(bytes) as usize, 4)
            }
            _ => decode_varint32(data)
                .map(|(len, header)| (len as usize, header))
                .ok_or(CodecError::TruncatedHeader)?,
        };
        let payload = &data[header..];

        let buf = match self {
            Self::None => unreachable!(),
            Self::Lz4 => {
                let size = i32::try_from(len).map_err(|_| CodecError::TooLarge(len))?;
                lz4::block::decompress(payload, Some(size)).map_err(CodecError::from)?
            }
            Self::Zstd => zstd::bulk::decompress(payload, len).map_err(CodecError::from)?,
        };

        if buf.len() != len {
            return Err(CodecError::SizeMismatch {
                expected: len,
                get: buf.len(),
            }
            .into());
        }
        Ok(buf)
    }
}

fn check_format_version(format_version: u32) -> std::result::Result<(), CodecError> {
    match format_version {
        COMPRESS_FORMAT_VERSION_FIXED32 | COMPRESS_FORMAT_VERSION_VARINT32 => Ok(()),
        v => Err(CodecError::UnsupportedFormatVersion(v)),
    }
}

fn encode_varint32(buf: &mut Vec<u8>, mut v: u32) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

/// Returns the decoded value and the count of bytes it occupies.
fn decode_varint32(buf: &[u8]) -> Option<(u32, usize)> {
    let mut v = 0u32;
    for (i, byte) in buf.iter().take(5).enumerate() {
        v |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((v, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use rand::{rng, Rng};

    use super::*;

    fn compressible(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 7) as u8).collect()
    }

    #[test]
    fn test_varint32() {
        for v in [0, 1, 127, 128, 300, 16384, u32::MAX] {
            let mut buf = vec![];
            encode_varint32(&mut buf, v);
            assert_eq!(decode_varint32(&buf), Some((v, buf.len())));
        }
        assert_eq!(decode_varint32(&[0x80, 0x80]), None);
        assert_eq!(decode_varint32(&[]), None);
    }

    #[test]
    fn test_codecs() {
        let data = compressible(64 * 1024);
        for compression in [Compression::None, Compression::Lz4, Compression::Zstd] {
            for version in [COMPRESS_FORMAT_VERSION_FIXED32, COMPRESS_FORMAT_VERSION_VARINT32] {
                let compressed = compression.compress(&data, version).unwrap();
                if !compression.is_none() {
                    assert!(compressed.len() < data.len());
                }
                let decompressed = compression.decompress(&compressed, version).unwrap();
                assert_eq!(decompressed, data);
            }
        }
    }

    #[test]
    fn test_random_data_does_not_shrink() {
        let mut data = vec![0u8; 4096];
        rng().fill(&mut data[..]);
        let compressed = Compression::Lz4.compress(&data, COMPRESS_FORMAT_VERSION_VARINT32).unwrap();
        assert!(compressed.len() >= data.len());
    }

    #[test]
    fn test_unsupported_format_version() {
        let err = Compression::Lz4.compress(b"hello", 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(matches!(
            err.downcast_ref::<CodecError>(),
            Some(CodecError::UnsupportedFormatVersion(3))
        ));
    }

    #[test]
    fn test_corrupted_input() {
        let data = compressible(4096);
        let mut compressed = Compression::Zstd.compress(&data, COMPRESS_FORMAT_VERSION_VARINT32).unwrap();
        compressed.truncate(compressed.len() / 2);
        let err = Compression::Zstd
            .decompress(&compressed, COMPRESS_FORMAT_VERSION_VARINT32)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Codec);

        let err = Compression::Lz4.decompress(&[], COMPRESS_FORMAT_VERSION_FIXED32).unwrap_err();
        assert!(matches!(err.downcast_ref::<CodecError>(), Some(CodecError::TruncatedHeader)));
    }
}
