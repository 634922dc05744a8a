use crate::err::{DeserializationError, PFileError, Result};
use crate::utils::bytes;

use flate2::{Decompress, FlushDecompress, Status};
use log::{debug, trace};

/// Number of name-table groups stored at the start of the decompressed block.
pub const GROUP_COUNT: usize = 7;
pub const GROUP_COUNTS_SIZE: usize = GROUP_COUNT * 4;

const MIN_GROWTH: usize = 4096;

/// The decompressed payload: group counts followed by the name-and-code region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    pub counts: [u32; GROUP_COUNT],
    data: Vec<u8>,
}

impl DecodedBlock {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < GROUP_COUNTS_SIZE {
            return Err(PFileError::Decode(
                DeserializationError::DecodedBlockTooShort { len: data.len() },
            ));
        }

        let counts = bytes::read_u32_array_be_r::<GROUP_COUNT>(&data, 0, "group counts")
            .map_err(PFileError::Decode)?;

        Ok(DecodedBlock { counts, data })
    }

    /// Name table strings followed by the opcode stream.
    pub fn region(&self) -> &[u8] {
        &self.data[GROUP_COUNTS_SIZE..]
    }

    /// Length of the whole decompressed buffer, counts included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Decompresses a descrambled payload (a zlib stream).
///
/// `expected_len` is the header's declared decompressed size; producing fewer bytes is an error,
/// producing more is accepted. `capacity_limit` caps the up-front allocation derived from it.
pub fn inflate(descrambled: &[u8], expected_len: u32, capacity_limit: usize) -> Result<DecodedBlock> {
    let capacity = usize::try_from(expected_len)
        .unwrap_or(usize::MAX)
        .min(capacity_limit)
        .max(MIN_GROWTH);

    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(capacity);

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(MIN_GROWTH));
        }

        let consumed = usize::try_from(inflater.total_in()).unwrap_or(descrambled.len());
        let input = descrambled.get(consumed..).unwrap_or_default();

        let status = inflater
            .decompress_vec(input, &mut out, FlushDecompress::None)
            .map_err(|e| PFileError::Decompression {
                message: e.to_string(),
            })?;

        match status {
            Status::StreamEnd => break,
            Status::Ok => {}
            Status::BufError => {
                // No progress with room left in the output means the input ran dry.
                if out.len() < out.capacity() {
                    return Err(PFileError::Decompression {
                        message: format!(
                            "stream ended after {} of {} bytes without an end marker",
                            inflater.total_in(),
                            descrambled.len()
                        ),
                    });
                }
            }
        }
    }

    trace!(
        "Inflated {} -> {} bytes ({} trailing bytes ignored)",
        inflater.total_in(),
        out.len(),
        descrambled.len() as u64 - inflater.total_in().min(descrambled.len() as u64)
    );

    if out.len() < expected_len as usize {
        return Err(PFileError::SizeMismatch {
            expected: expected_len,
            actual: out.len(),
        });
    }

    let block = DecodedBlock::from_bytes(out)?;
    debug!("Group counts: {:?}", block.counts);

    Ok(block)
}
