use crate::err::{DeserializationError, DeserializationResult};
use crate::inflate::GROUP_COUNT;

use log::{debug, trace};
use std::ops::Index;

/// Ordered identifier strings referenced by two-byte opcodes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NameTable {
    names: Vec<String>,
    /// Offset into the name-and-code region where the opcode stream begins.
    code_start: usize,
}

impl NameTable {
    /// Reads `sum(counts)` NUL-terminated strings from the start of `region`, group by group.
    ///
    /// Invalid UTF-8 is replaced, never fatal. A missing terminator is an error.
    pub fn build(counts: &[u32; GROUP_COUNT], region: &[u8]) -> DeserializationResult<Self> {
        let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
        // Every entry needs at least its terminator, so this never over-allocates past the region.
        let capacity = usize::try_from(total).unwrap_or(usize::MAX).min(region.len());
        let mut names = Vec::with_capacity(capacity);
        let mut pos = 0;

        for (group, &count) in counts.iter().enumerate() {
            for index in 0..count {
                let rest = &region[pos..];
                let len = rest.iter().position(|&b| b == 0).ok_or(
                    DeserializationError::TruncatedNameTable {
                        group,
                        index,
                        offset: pos,
                    },
                )?;

                let name = String::from_utf8_lossy(&rest[..len]).into_owned();
                trace!("name[{}] (group {}) = {:?}", names.len(), group, name);
                names.push(name);
                pos += len + 1;
            }
        }

        debug!(
            "Name table has {} entries, opcode stream starts at {}",
            names.len(),
            pos
        );

        Ok(NameTable {
            names,
            code_start: pos,
        })
    }

    pub fn code_start(&self) -> usize {
        self.code_start
    }

    pub fn get(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Index<usize> for NameTable {
    type Output = str;

    fn index(&self, id: usize) -> &str {
        &self.names[id]
    }
}
