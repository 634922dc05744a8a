use crate::err::{PFileError, Result};
use crate::pfile_header::{PFILE_HEADER_SIZE, PFileHeader};

use log::debug;
use std::fs;
use std::io;
use std::path::Path;

/// A p-file split into its header and the (still scrambled) payload.
///
/// The payload is every byte after the header, even when the file carries more bytes than the
/// header declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PFile {
    pub header: PFileHeader,
    pub payload: Vec<u8>,
}

impl PFile {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let data = fs::read(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => PFileError::NotFound {
                path: path.to_path_buf(),
            },
            _ => PFileError::FailedToOpenFile {
                path: path.to_path_buf(),
                source,
            },
        })?;

        debug!("Read {} bytes from {}", data.len(), path.display());
        Self::from_buffer(data)
    }

    pub fn from_buffer(mut data: Vec<u8>) -> Result<Self> {
        let header = PFileHeader::from_bytes(&data).map_err(PFileError::InvalidHeader)?;
        debug!("P-file header: {:?}", header);

        let payload = data.split_off(PFILE_HEADER_SIZE);

        Ok(PFile { header, payload })
    }

    pub fn validate(&self, enforce_minor_version: bool) -> Result<()> {
        self.header
            .validate(self.payload.len(), enforce_minor_version)
            .map_err(PFileError::InvalidHeader)
    }
}
