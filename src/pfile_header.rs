use crate::err::{DeserializationError, DeserializationResult};
use crate::utils::bytes;

use log::debug;

pub const PFILE_HEADER_SIZE: usize = 32;

/// The only minor version tag this decoder understands.
pub const SUPPORTED_MINOR_VERSION: [u8; 6] = *b"v00.00";

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PFileHeader {
    /// e.g. `v01.00`; informational only.
    pub major_version: [u8; 6],
    pub minor_version: [u8; 6],
    pub scramble_key: u32,
    pub unknown1: u32,
    pub unknown2: u32,
    pub compressed_size: u32,
    pub decompressed_size: u32,
}

impl PFileHeader {
    pub fn from_bytes(data: &[u8]) -> DeserializationResult<PFileHeader> {
        let _ = bytes::slice_r(data, 0, PFILE_HEADER_SIZE, "p-file header")?;

        let major_version = bytes::read_array_r::<6>(data, 0, "major version")?;
        let minor_version = bytes::read_array_r::<6>(data, 6, "minor version")?;
        let scramble_key = bytes::read_u32_be_r(data, 12, "scramble key")?;
        let unknown1 = bytes::read_u32_be_r(data, 16, "unknown1")?;
        let unknown2 = bytes::read_u32_be_r(data, 20, "unknown2")?;
        let compressed_size = bytes::read_u32_be_r(data, 24, "compressed size")?;
        let decompressed_size = bytes::read_u32_be_r(data, 28, "decompressed size")?;

        Ok(PFileHeader {
            major_version,
            minor_version,
            scramble_key,
            unknown1,
            unknown2,
            compressed_size,
            decompressed_size,
        })
    }

    /// Checks the header against the payload that actually follows it in the file.
    ///
    /// `payload_len` is the full remainder after the header, not clipped to `compressed_size`.
    pub fn validate(
        &self,
        payload_len: usize,
        enforce_minor_version: bool,
    ) -> DeserializationResult<()> {
        if self.compressed_size == 0 {
            return Err(DeserializationError::ZeroLength {
                what: "compressed length",
            });
        }

        if self.decompressed_size == 0 {
            return Err(DeserializationError::ZeroLength {
                what: "decompressed length",
            });
        }

        if self.minor_version != SUPPORTED_MINOR_VERSION {
            if enforce_minor_version {
                return Err(DeserializationError::InvalidMinorVersion {
                    found: self.minor_version,
                });
            }
            debug!(
                "Ignoring unsupported minor version `{}`",
                String::from_utf8_lossy(&self.minor_version)
            );
        }

        if usize::try_from(self.compressed_size).ok() != Some(payload_len) {
            return Err(DeserializationError::CompressedLengthMismatch {
                declared: self.compressed_size,
                actual: payload_len,
            });
        }

        Ok(())
    }

    /// Selects the keystream starting offset.
    pub fn scramble_number(&self) -> u8 {
        crate::descramble::scramble_number(self.scramble_key)
    }
}
